//! Routes targets to the subset of backends configured for their top-level
//! domain (the segment before the first dot). Unknown domains fall back to
//! the whole fleet so a stale table degrades to extra fan-out, never to a
//! false not-found.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::backend::Backend;

pub fn top_level_domain(target: &str) -> &str {
    target.split('.').next().unwrap_or(target)
}

#[derive(Clone)]
pub struct TldRouter {
    backends: Vec<Arc<dyn Backend>>,
    routes: Arc<RwLock<HashMap<String, Vec<usize>>>>,
}

impl TldRouter {
    pub fn new(backends: Vec<Arc<dyn Backend>>) -> Self {
        let mut routes: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, backend) in backends.iter().enumerate() {
            for tld in backend.tlds() {
                routes.entry(tld.clone()).or_default().push(index);
            }
        }
        Self {
            backends,
            routes: Arc::new(RwLock::new(routes)),
        }
    }

    pub fn all(&self) -> Vec<Arc<dyn Backend>> {
        self.backends.clone()
    }

    /// Backends whose configured TLDs cover at least one target, deduplicated
    /// by server address; the full fleet when nothing matches.
    pub async fn route(&self, targets: &[String]) -> Vec<Arc<dyn Backend>> {
        let routes = self.routes.read().await;

        let mut seen: HashSet<&str> = HashSet::new();
        let mut selected = Vec::new();
        for target in targets {
            let Some(indices) = routes.get(top_level_domain(target)) else {
                continue;
            };
            for &index in indices {
                let backend = &self.backends[index];
                if seen.insert(backend.server_address()) {
                    selected.push(Arc::clone(backend));
                }
            }
        }

        if selected.is_empty() {
            return self.all();
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FetchError, FindRequest, InfoRequest, RenderRequest};
    use crate::series::{FindMatch, Info, MetricData};
    use async_trait::async_trait;

    struct FakeBackend {
        address: String,
        tlds: Vec<String>,
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn find(&self, _: &FindRequest) -> Result<Vec<FindMatch>, FetchError> {
            Ok(Vec::new())
        }

        async fn render(&self, _: &RenderRequest) -> Result<Vec<MetricData>, FetchError> {
            Ok(Vec::new())
        }

        async fn info(&self, _: &InfoRequest) -> Result<Vec<Info>, FetchError> {
            Ok(Vec::new())
        }

        fn server_address(&self) -> &str {
            &self.address
        }

        fn tlds(&self) -> &[String] {
            &self.tlds
        }
    }

    fn fleet() -> Vec<Arc<dyn Backend>> {
        vec![
            Arc::new(FakeBackend {
                address: "http://a".into(),
                tlds: vec!["prod".into()],
            }),
            Arc::new(FakeBackend {
                address: "http://b".into(),
                tlds: vec!["prod".into(), "stage".into()],
            }),
            Arc::new(FakeBackend {
                address: "http://c".into(),
                tlds: vec![],
            }),
        ]
    }

    #[test]
    fn splits_top_level_domain() {
        assert_eq!(top_level_domain("prod.web.cpu"), "prod");
        assert_eq!(top_level_domain("bare"), "bare");
    }

    #[tokio::test]
    async fn routes_by_configured_tld() {
        let router = TldRouter::new(fleet());
        let selected = router.route(&["prod.web.cpu".to_string()]).await;
        let addresses: Vec<&str> = selected.iter().map(|b| b.server_address()).collect();
        assert_eq!(addresses, vec!["http://a", "http://b"]);
    }

    #[tokio::test]
    async fn deduplicates_across_targets() {
        let router = TldRouter::new(fleet());
        let selected = router
            .route(&["prod.web.cpu".to_string(), "stage.web.cpu".to_string()])
            .await;
        assert_eq!(selected.len(), 2);
    }

    #[tokio::test]
    async fn unknown_tld_falls_back_to_the_fleet() {
        let router = TldRouter::new(fleet());
        let selected = router.route(&["dev.web.cpu".to_string()]).await;
        assert_eq!(selected.len(), 3);
    }
}
