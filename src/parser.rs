//! Graphite target expression parser.
//!
//! Turns a query string like `sum(servers.*.cpu, 'alias') | scale(2)` into a
//! tree of name / constant / string / function-call nodes. The pipe operator
//! desugars during parsing: `x | f(a)` becomes `f(x, a)`. Function nodes keep
//! the verbatim argument substring so the canonical textual form can be
//! reconstructed for series naming.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::interval;

pub type Result<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("missing expression")]
    MissingExpr,

    #[error("missing argument")]
    MissingArgument,

    #[error("missing comma")]
    MissingComma,

    #[error("missing closing quote")]
    MissingQuote,

    #[error("missing closing brace")]
    MissingBrace,

    #[error("missing closing bracket")]
    MissingBracket,

    #[error("nested brackets are not supported")]
    NestedBrackets,

    #[error("braces are not allowed inside brackets")]
    BraceInBrackets,

    #[error("commas are not allowed inside brackets")]
    CommaInBrackets,

    #[error("spaces are not allowed inside braces")]
    SpacesInBraces,

    #[error("spaces are not allowed inside brackets")]
    SpacesInBrackets,

    #[error("unexpected character")]
    UnexpectedCharacter,

    #[error("bad argument type")]
    BadType,

    #[error("invalid numeric constant")]
    Number(#[from] std::num::ParseFloatError),

    #[error("cannot pipe into a non-function expression")]
    PipeTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrLiteral {
    pub value: String,
    /// Set only when the node came from a bare `true` / `false` atom; the
    /// boolean accessors read it, quoted strings never qualify.
    pub atom: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncCall {
    pub name: String,
    pub args: Vec<Expr>,
    pub named_args: BTreeMap<String, Expr>,
    pub raw_args: String,
}

/// One node of a parsed target expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(String),
    Const(f64),
    Str(StrLiteral),
    Func(FuncCall),
}

impl Expr {
    pub fn is_name(&self) -> bool {
        matches!(self, Expr::Name(_))
    }

    pub fn is_func(&self) -> bool {
        matches!(self, Expr::Func(_))
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Expr::Const(_))
    }

    pub fn is_str(&self) -> bool {
        matches!(self, Expr::Str(_))
    }

    /// Metric pattern for names, function name for calls, the atom text for
    /// bare booleans, empty otherwise.
    pub fn target(&self) -> &str {
        match self {
            Expr::Name(name) => name,
            Expr::Func(call) => &call.name,
            Expr::Str(lit) => lit.atom.as_deref().unwrap_or(""),
            Expr::Const(_) => "",
        }
    }

    pub fn args(&self) -> &[Expr] {
        match self {
            Expr::Func(call) => &call.args,
            _ => &[],
        }
    }

    pub fn raw_args(&self) -> &str {
        match self {
            Expr::Func(call) => &call.raw_args,
            _ => "",
        }
    }

    pub fn get_named_arg(&self, name: &str) -> Option<&Expr> {
        match self {
            Expr::Func(call) => call.named_args.get(name),
            _ => None,
        }
    }

    fn pos_arg(&self, n: usize) -> Option<&Expr> {
        self.args().get(n)
    }

    fn as_float(&self) -> Result<f64> {
        match self {
            Expr::Const(v) => Ok(*v),
            _ => Err(ParseError::BadType),
        }
    }

    fn as_string(&self) -> Result<String> {
        match self {
            Expr::Str(lit) => Ok(lit.value.clone()),
            _ => Err(ParseError::BadType),
        }
    }

    fn as_bool(&self) -> Result<bool> {
        match self {
            Expr::Str(StrLiteral {
                atom: Some(atom), ..
            }) if atom.eq_ignore_ascii_case("true") => Ok(true),
            Expr::Str(StrLiteral {
                atom: Some(atom), ..
            }) if atom.eq_ignore_ascii_case("false") => Ok(false),
            _ => Err(ParseError::BadType),
        }
    }

    pub fn get_float_arg(&self, n: usize) -> Result<f64> {
        self.pos_arg(n).ok_or(ParseError::MissingArgument)?.as_float()
    }

    pub fn get_float_arg_default(&self, n: usize, d: f64) -> Result<f64> {
        self.pos_arg(n).map_or(Ok(d), Expr::as_float)
    }

    pub fn get_float_named_or_pos_default(&self, k: &str, n: usize, d: f64) -> Result<f64> {
        match self.get_named_arg(k) {
            Some(arg) => arg.as_float(),
            None => self.get_float_arg_default(n, d),
        }
    }

    pub fn get_int_arg(&self, n: usize) -> Result<i64> {
        Ok(self.get_float_arg(n)? as i64)
    }

    pub fn get_int_arg_default(&self, n: usize, d: i64) -> Result<i64> {
        self.pos_arg(n).map_or(Ok(d), |a| Ok(a.as_float()? as i64))
    }

    pub fn get_int_named_or_pos_default(&self, k: &str, n: usize, d: i64) -> Result<i64> {
        match self.get_named_arg(k) {
            Some(arg) => Ok(arg.as_float()? as i64),
            None => self.get_int_arg_default(n, d),
        }
    }

    /// Every positional argument from `n` onward, as integers.
    pub fn get_int_args(&self, n: usize) -> Result<Vec<i64>> {
        if self.args().len() <= n {
            return Err(ParseError::MissingArgument);
        }
        (n..self.args().len()).map(|i| self.get_int_arg(i)).collect()
    }

    pub fn get_string_arg(&self, n: usize) -> Result<String> {
        self.pos_arg(n).ok_or(ParseError::MissingArgument)?.as_string()
    }

    pub fn get_string_arg_default(&self, n: usize, d: &str) -> Result<String> {
        self.pos_arg(n).map_or_else(|| Ok(d.to_string()), Expr::as_string)
    }

    pub fn get_string_named_or_pos_default(&self, k: &str, n: usize, d: &str) -> Result<String> {
        match self.get_named_arg(k) {
            Some(arg) => arg.as_string(),
            None => self.get_string_arg_default(n, d),
        }
    }

    pub fn get_bool_arg(&self, n: usize) -> Result<bool> {
        self.pos_arg(n).ok_or(ParseError::MissingArgument)?.as_bool()
    }

    pub fn get_bool_arg_default(&self, n: usize, d: bool) -> Result<bool> {
        self.pos_arg(n).map_or(Ok(d), Expr::as_bool)
    }

    pub fn get_bool_named_or_pos_default(&self, k: &str, n: usize, d: bool) -> Result<bool> {
        match self.get_named_arg(k) {
            Some(arg) => arg.as_bool(),
            None => self.get_bool_arg_default(n, d),
        }
    }

    /// Positional argument `n` as an interval string resolved to seconds.
    /// `default_sign` applies when the string carries no explicit sign.
    pub fn get_interval_arg(&self, n: usize, default_sign: i32) -> Result<i32> {
        let arg = self.pos_arg(n).ok_or(ParseError::MissingArgument)?;
        let raw = arg.as_string()?;
        interval::parse(&raw, default_sign).map_err(|_| ParseError::BadType)
    }

    fn insert_first_arg(&mut self, piped: Expr) -> Result<()> {
        match self {
            Expr::Func(call) => {
                if call.raw_args.is_empty() {
                    call.raw_args = piped.to_string();
                } else {
                    call.raw_args = format!("{},{}", piped, call.raw_args);
                }
                call.args.insert(0, piped);
                Ok(())
            }
            _ => Err(ParseError::PipeTarget),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Name(name) => f.write_str(name),
            Expr::Const(v) => write!(f, "{v}"),
            Expr::Str(lit) => {
                let escaped = lit.value.replace('\\', "\\\\").replace('\'', "\\'");
                write!(f, "'{escaped}'")
            }
            Expr::Func(call) => write!(f, "{}({})", call.name, call.raw_args),
        }
    }
}

/// Parses one expression off the front of `input`, returning the node and the
/// unconsumed remainder. Callers that require the whole string must check the
/// remainder is empty.
pub fn parse(input: &str) -> Result<(Expr, &str)> {
    let (exp, rest) = parse_without_pipe(input)?;
    parse_pipes(exp, rest)
}

fn parse_without_pipe(input: &str) -> Result<(Expr, &str)> {
    let e = input.trim_start();
    if e.is_empty() {
        return Err(ParseError::MissingExpr);
    }

    let first = e.as_bytes()[0];

    // A leading sign or digit is a constant unless the numeric run is glued
    // to a letter, which makes it a metric name like `-1foo`.
    if first.is_ascii_digit() || first == b'-' || first == b'+' {
        let run = e.len()
            - e.trim_start_matches(|c: char| {
                c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | 'e' | 'E')
            })
            .len();
        let tail = &e[run..];
        if !tail.chars().next().is_some_and(char::is_alphabetic) {
            let value: f64 = e[..run].parse()?;
            return Ok((Expr::Const(value), tail));
        }
    }

    if first == b'\'' || first == b'"' {
        let (value, tail) = parse_string(e)?;
        return Ok((
            Expr::Str(StrLiteral {
                value: value.to_string(),
                atom: None,
            }),
            tail,
        ));
    }

    let (name, rest) = parse_name(e)?;

    if name.eq_ignore_ascii_case("true") || name.eq_ignore_ascii_case("false") {
        return Ok((
            Expr::Str(StrLiteral {
                value: name.to_string(),
                atom: Some(name.to_string()),
            }),
            rest,
        ));
    }
    if name.is_empty() {
        return Err(ParseError::MissingArgument);
    }

    let rest_trimmed = rest.trim_start();
    if rest_trimmed.starts_with('(') {
        let (raw_args, args, named_args, tail) = parse_arg_list(rest_trimmed)?;
        return Ok((
            Expr::Func(FuncCall {
                name: name.to_string(),
                args,
                named_args,
                raw_args,
            }),
            tail,
        ));
    }

    Ok((Expr::Name(name.to_string()), rest))
}

fn parse_pipes(mut exp: Expr, input: &str) -> Result<(Expr, &str)> {
    let mut e = input.trim_start();
    while let Some(after) = e.strip_prefix('|') {
        let (mut callee, rest) = parse_without_pipe(after)?;
        callee.insert_first_arg(exp)?;
        exp = callee;
        e = rest.trim_start();
    }
    Ok((exp, e))
}

/// Plain metric-name characters per the Graphite render protocol; the glob
/// constructs `{}` and `[]` are handled separately by `parse_name`.
fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'.' | b'_' | b'-' | b'*' | b'?' | b':' | b'^' | b'$' | b'<' | b'>' | b'&' | b'#'
        )
}

fn parse_name(s: &str) -> Result<(&str, &str)> {
    let mut braces = 0u32;
    let mut brackets = 0u32;
    let bytes = s.as_bytes();
    let mut i = 0;

    'scan: while i < s.len() {
        let b = bytes[i];
        if !b.is_ascii() {
            // Unicode letters are legal name characters; anything else ends
            // the name.
            let ch = s[i..].chars().next().expect("index is at a char boundary");
            if ch.is_alphabetic() {
                i += ch.len_utf8();
                continue;
            }
            break;
        }
        if is_name_char(b) {
            i += 1;
            continue;
        }
        match b {
            // There is no way to escape braces or brackets in a Graphite
            // query, so misplaced ones are query bugs, not literals.
            b'{' => {
                if brackets > 0 {
                    return Err(ParseError::BraceInBrackets);
                }
                braces += 1;
            }
            b'}' => {
                if brackets > 0 {
                    return Err(ParseError::BraceInBrackets);
                }
                if braces == 0 {
                    return Err(ParseError::MissingBrace);
                }
                braces -= 1;
            }
            b'[' => {
                if brackets > 0 {
                    return Err(ParseError::NestedBrackets);
                }
                brackets += 1;
            }
            b']' => {
                if brackets == 0 {
                    return Err(ParseError::MissingBracket);
                }
                brackets -= 1;
            }
            b',' => {
                if brackets > 0 {
                    return Err(ParseError::CommaInBrackets);
                }
                if braces == 0 {
                    break 'scan;
                }
            }
            b' ' | b'\t' | b'\n' => {
                if braces > 0 {
                    return Err(ParseError::SpacesInBraces);
                }
                if brackets > 0 {
                    return Err(ParseError::SpacesInBrackets);
                }
                break 'scan;
            }
            _ => break 'scan,
        }
        i += 1;
    }

    if braces > 0 {
        return Err(ParseError::MissingBrace);
    }
    if brackets > 0 {
        return Err(ParseError::MissingBracket);
    }

    Ok((&s[..i], &s[i..]))
}

fn parse_string(s: &str) -> Result<(&str, &str)> {
    let quote = s.as_bytes()[0];
    let body = &s[1..];
    match body.as_bytes().iter().position(|&b| b == quote) {
        Some(end) => Ok((&body[..end], &body[end + 1..])),
        None => Err(ParseError::MissingQuote),
    }
}

fn parse_arg_list(s: &str) -> Result<(String, Vec<Expr>, BTreeMap<String, Expr>, &str)> {
    debug_assert!(s.starts_with('('));
    let mut e = &s[1..];

    let trimmed = e.trim_start();
    if let Some(rest) = trimmed.strip_prefix(')') {
        return Ok((String::new(), Vec::new(), BTreeMap::new(), rest));
    }

    let mut raw_args = String::new();
    let mut args = Vec::new();
    let mut named_args = BTreeMap::new();

    loop {
        let arg_text = e;
        let (arg, rest) = parse(e)?;
        e = rest;

        if e.is_empty() {
            return Err(ParseError::MissingComma);
        }

        if arg.is_name() && e.starts_with('=') {
            // Key-value pair: the right-hand side must be a simple value.
            let (value, rest) = parse(&e[1..])?;
            if rest.is_empty() {
                return Err(ParseError::MissingComma);
            }
            if !value.is_const() && !value.is_name() && !value.is_str() {
                return Err(ParseError::BadType);
            }
            e = rest;
            named_args.insert(arg.target().to_string(), value);
            append_raw(&mut raw_args, &arg_text[..arg_text.len() - e.len()]);
        } else {
            // Nested calls render canonically; everything else keeps its
            // original spelling.
            if arg.is_func() {
                append_raw(&mut raw_args, &arg.to_string());
            } else {
                append_raw(&mut raw_args, &arg_text[..arg_text.len() - e.len()]);
            }
            args.push(arg);
        }

        e = e.trim_start();
        if e.is_empty() {
            return Err(ParseError::UnexpectedCharacter);
        }
        if let Some(rest) = e.strip_prefix(')') {
            return Ok((raw_args, args, named_args, rest));
        }
        match e.strip_prefix(',') {
            Some(rest) => e = rest,
            None => return Err(ParseError::UnexpectedCharacter),
        }
    }
}

fn append_raw(buffer: &mut String, chunk: &str) {
    if !buffer.is_empty() {
        buffer.push(',');
    }
    buffer.push_str(chunk);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &str) -> Expr {
        let (exp, rest) = parse(input).expect("expression should parse");
        assert_eq!(rest, "", "expression should consume the whole input");
        exp
    }

    fn name(s: &str) -> Expr {
        Expr::Name(s.to_string())
    }

    #[test]
    fn parses_bare_name() {
        assert_eq!(parse_all("foo.bar.*"), name("foo.bar.*"));
    }

    #[test]
    fn parses_constants_and_signed_names() {
        assert_eq!(parse_all("2.5"), Expr::Const(2.5));
        assert_eq!(parse_all("-3"), Expr::Const(-3.0));
        assert_eq!(parse_all("1e3"), Expr::Const(1000.0));
        // A numeric run glued to a letter is a name, not a constant.
        assert_eq!(parse_all("-1foo"), name("-1foo"));
    }

    #[test]
    fn parses_function_with_positional_args() {
        let exp = parse_all("sum(a.b,c.d)");
        match &exp {
            Expr::Func(call) => {
                assert_eq!(call.name, "sum");
                assert_eq!(call.args, vec![name("a.b"), name("c.d")]);
                assert_eq!(call.raw_args, "a.b,c.d");
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn parses_mixed_argument_types() {
        let exp = parse_all("scale(metric, 2.5)");
        assert_eq!(exp.args()[0], name("metric"));
        assert_eq!(exp.get_float_arg(1), Ok(2.5));
        assert_eq!(exp.get_string_arg(1), Err(ParseError::BadType));
        assert_eq!(exp.get_float_arg(2), Err(ParseError::MissingArgument));
    }

    #[test]
    fn parses_named_args() {
        let exp = parse_all("summarize(m, '1h', alignToFrom=true, func='max')");
        assert_eq!(exp.args().len(), 2);
        assert_eq!(
            exp.get_bool_named_or_pos_default("alignToFrom", 2, false),
            Ok(true)
        );
        assert_eq!(
            exp.get_string_named_or_pos_default("func", 3, "avg"),
            Ok("max".to_string())
        );
        assert_eq!(exp.get_named_arg("missing"), None);
    }

    #[test]
    fn rejects_function_valued_named_args() {
        assert_eq!(parse("f(a, b=g(c))").unwrap_err(), ParseError::BadType);
    }

    #[test]
    fn parses_empty_arg_list() {
        let exp = parse_all("constantLine()");
        assert!(exp.args().is_empty());
        assert_eq!(exp.raw_args(), "");
    }

    #[test]
    fn bool_atoms_parse_as_strings() {
        let exp = parse_all("True");
        match &exp {
            Expr::Str(lit) => {
                assert_eq!(lit.value, "True");
                assert_eq!(lit.atom.as_deref(), Some("True"));
            }
            other => panic!("expected string atom, got {other:?}"),
        }
        // Quoted booleans are plain strings and do not satisfy the bool accessor.
        let quoted = parse_all("f('true')");
        assert_eq!(quoted.get_bool_arg(0), Err(ParseError::BadType));
    }

    #[test]
    fn pipe_is_equivalent_to_first_argument() {
        let piped = parse_all("a | scale(2)");
        let direct = parse_all("scale(a,2)");
        assert_eq!(piped, direct);
        assert_eq!(piped.raw_args(), "a,2");
    }

    #[test]
    fn pipe_chains_left_to_right() {
        let piped = parse_all("a | abs() | scale(2)");
        let direct = parse_all("scale(abs(a),2)");
        assert_eq!(piped, direct);
    }

    #[test]
    fn pipe_into_non_function_fails() {
        assert_eq!(parse("a | 2").unwrap_err(), ParseError::PipeTarget);
        assert_eq!(parse("a | b.c").unwrap_err(), ParseError::PipeTarget);
    }

    #[test]
    fn glob_constructs_stay_in_names() {
        assert_eq!(parse_all("foo.{bar,baz}.qux"), name("foo.{bar,baz}.qux"));
        assert_eq!(parse_all("foo.[0-9].qux"), name("foo.[0-9].qux"));
    }

    #[test]
    fn name_lexer_error_table() {
        let cases = [
            ("foo.{bar", ParseError::MissingBrace),
            ("foo.}bar", ParseError::MissingBrace),
            ("foo.[ab", ParseError::MissingBracket),
            ("foo.]bar", ParseError::MissingBracket),
            ("foo.[a[b]]", ParseError::NestedBrackets),
            ("foo.[{a}]", ParseError::BraceInBrackets),
            ("foo.[a,b]", ParseError::CommaInBrackets),
            ("foo.{a b}", ParseError::SpacesInBraces),
            ("foo.[a b]", ParseError::SpacesInBrackets),
        ];
        for (input, expected) in cases {
            assert_eq!(parse(input).unwrap_err(), expected, "input: {input}");
        }
    }

    #[test]
    fn argument_list_error_table() {
        assert_eq!(parse("").unwrap_err(), ParseError::MissingExpr);
        assert_eq!(parse("f(a").unwrap_err(), ParseError::MissingComma);
        assert_eq!(parse("f('a").unwrap_err(), ParseError::MissingQuote);
        assert_eq!(parse("f(a ").unwrap_err(), ParseError::UnexpectedCharacter);
        assert_eq!(parse("f(a;b)").unwrap_err(), ParseError::UnexpectedCharacter);
        assert!(matches!(
            parse("1.2.3").unwrap_err(),
            ParseError::Number(_)
        ));
    }

    #[test]
    fn canonical_form_round_trips() {
        let inputs = [
            "foo.bar",
            "sum(a.b,c.d)",
            "scale(metric, 2.5)",
            "aliasByNode(sum(a,b),1)",
            "f(a,b='c')",
            "movingAverage(m,'1h')",
            "a | scale(2)",
        ];
        for input in inputs {
            let exp = parse_all(input);
            let reparsed = parse_all(&exp.to_string());
            assert_eq!(exp, reparsed, "canonical form of {input:?} should reparse equal");
        }
    }

    #[test]
    fn nested_calls_render_canonically_in_raw_args() {
        let exp = parse_all("sum(scale(a , 2), b)");
        assert_eq!(exp.raw_args(), "scale(a , 2), b");
        let piped_inner = parse_all("sum(a|scale(2), b)");
        assert_eq!(piped_inner.raw_args(), "scale(a,2), b");
    }

    #[test]
    fn interval_arguments_resolve_to_seconds() {
        let exp = parse_all("timeShift(m, '1h')");
        assert_eq!(exp.get_interval_arg(1, -1), Ok(-3600));
        assert_eq!(exp.get_interval_arg(1, 1), Ok(3600));
        let bad = parse_all("timeShift(m, 'xyz')");
        assert_eq!(bad.get_interval_arg(1, -1), Err(ParseError::BadType));
    }

    #[test]
    fn int_args_collects_the_tail() {
        let exp = parse_all("aliasByNode(m, 1, 3, 5)");
        assert_eq!(exp.get_int_args(1), Ok(vec![1, 3, 5]));
        assert_eq!(exp.get_int_args(4), Err(ParseError::MissingArgument));
    }

    #[test]
    fn unicode_letters_are_name_chars() {
        assert_eq!(parse_all("sørvers.cpu"), name("sørvers.cpu"));
    }

    #[test]
    fn parse_leaves_trailing_input() {
        let (exp, rest) = parse("a.b&c.d=e").expect("prefix should parse");
        // '=' ends the name; callers reject the leftovers.
        assert_eq!(exp, name("a.b&c.d"));
        assert_eq!(rest, "=e");
    }
}
