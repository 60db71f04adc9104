//! The registered evaluator functions, one module per family.

mod alias;
mod arithmetic;
mod combine;
mod divide;
mod keep_last;
mod moving;
mod time_shift;

use super::FunctionRegistry;

/// Builds the registry the server installs at startup.
pub fn default_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    alias::register(&mut registry);
    arithmetic::register(&mut registry);
    combine::register(&mut registry);
    divide::register(&mut registry);
    keep_last::register(&mut registry);
    moving::register(&mut registry);
    time_shift::register(&mut registry);
    registry
}
