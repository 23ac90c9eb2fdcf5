//! Cached discovery of upstream models.
//!
//! The cache holds an immutable snapshot that is replaced wholesale on
//! refresh. Readers clone the `Arc` and never see a half-built list. The lock
//! guarding it is never held across a fetch.

use crate::credentials::{Credential, CredentialSource};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

const LIVE_GENERATION_METHOD: &str = "bidiGenerateContent";
/// Header carrying the API key on discovery requests.
const API_KEY_HEADER: &str = "x-goog-api-key";
/// Upper bound on a single discovery request, per page.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Credential(#[from] crate::credentials::CredentialError),
    #[error("Model discovery request failed: {0}")]
    Http(reqwest::Error),
}

impl From<reqwest::Error> for CatalogError {
    /// The request URL never reaches the error text.
    fn from(e: reqwest::Error) -> Self {
        CatalogError::Http(e.without_url())
    }
}

/// One model as reported by the discovery endpoint.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing)]
    pub supported_generation_methods: Vec<String>,
    /// True when the model can serve a live session.
    #[serde(default)]
    pub live: bool,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
    next_page_token: Option<String>,
}

/// A point-in-time view of the upstream model list.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    /// Unix seconds.
    pub fetched_at: u64,
    pub models: Vec<ModelInfo>,
}

/// Fetches the raw model list.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelLister: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelInfo>, CatalogError>;
}

/// Lists models over the REST discovery endpoint, following pagination.
pub struct HttpModelLister {
    client: reqwest::Client,
    endpoint: String,
    credentials: Arc<dyn CredentialSource>,
}

impl HttpModelLister {
    pub fn new(
        endpoint: String,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(DISCOVERY_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint,
            credentials,
        })
    }
}

#[async_trait]
impl ModelLister for HttpModelLister {
    async fn list_models(&self) -> Result<Vec<ModelInfo>, CatalogError> {
        let credential = self.credentials.resolve().await?;
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(&self.endpoint);
            request = match &credential {
                Credential::ApiKey(key) => request.header(API_KEY_HEADER, key.expose_secret()),
                Credential::Bearer(token) => request.bearer_auth(token.expose_secret()),
            };
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: ListModelsResponse = request
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            models.extend(page.models);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        for model in &mut models {
            model.live = model
                .supported_generation_methods
                .iter()
                .any(|m| m == LIVE_GENERATION_METHOD);
        }
        Ok(models)
    }
}

#[derive(Default)]
struct CacheState {
    current: Option<(Instant, Arc<CatalogSnapshot>)>,
    refreshing: bool,
}

/// Clears the in-flight flag when a refresh ends, even if its caller is cancelled.
struct RefreshGuard<'a>(&'a Mutex<CacheState>);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        lock(self.0).refreshing = false;
    }
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The process-wide discovery cache.
pub struct ModelCatalog {
    lister: Arc<dyn ModelLister>,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl ModelCatalog {
    pub fn new(lister: Arc<dyn ModelLister>, ttl: Duration) -> Self {
        Self {
            lister,
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Returns the cached snapshot, refreshing it first if it is older than the TTL.
    ///
    /// While one caller refreshes, others get the previous snapshot instead of
    /// waiting. A failed refresh leaves the previous snapshot in place.
    pub async fn snapshot(&self) -> Result<Arc<CatalogSnapshot>, CatalogError> {
        {
            let mut state = lock(&self.state);
            if let Some((at, snapshot)) = state.current.as_ref() {
                if at.elapsed() < self.ttl {
                    debug!("Serving cached model catalog.");
                    return Ok(snapshot.clone());
                }
                if state.refreshing {
                    debug!("Refresh in flight. Serving stale model catalog.");
                    return Ok(snapshot.clone());
                }
            }
            state.refreshing = true;
        }
        let _guard = RefreshGuard(&self.state);

        let models = self.lister.list_models().await?;
        let fetched_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let snapshot = Arc::new(CatalogSnapshot { fetched_at, models });
        info!(count = snapshot.models.len(), "Refreshed model catalog.");
        lock(&self.state).current = Some((Instant::now(), snapshot.clone()));
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn model(name: &str, live: bool) -> ModelInfo {
        ModelInfo {
            name: name.to_string(),
            display_name: None,
            supported_generation_methods: vec![],
            live,
        }
    }

    #[tokio::test]
    async fn test_snapshot_is_cached_within_ttl() {
        let mut lister = MockModelLister::new();
        lister
            .expect_list_models()
            .times(1)
            .returning(|| Ok(vec![model("models/a", true)]));

        let catalog = ModelCatalog::new(Arc::new(lister), Duration::from_secs(300));
        let first = catalog.snapshot().await.unwrap();
        let second = catalog.snapshot().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.models, vec![model("models/a", true)]);
    }

    #[tokio::test]
    async fn test_snapshot_is_replaced_after_ttl() {
        let mut lister = MockModelLister::new();
        let mut seq = mockall::Sequence::new();
        lister
            .expect_list_models()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![model("models/a", false)]));
        lister
            .expect_list_models()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![model("models/b", true)]));

        let catalog = ModelCatalog::new(Arc::new(lister), Duration::ZERO);
        let first = catalog.snapshot().await.unwrap();
        let second = catalog.snapshot().await.unwrap();

        assert_eq!(first.models[0].name, "models/a");
        assert_eq!(second.models[0].name, "models/b");
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_failed_refresh_surfaces_error() {
        let mut lister = MockModelLister::new();
        lister
            .expect_list_models()
            .times(1)
            .returning(|| Err(CatalogError::Credential(crate::credentials::CredentialError::Missing)));

        let catalog = ModelCatalog::new(Arc::new(lister), Duration::from_secs(300));
        assert!(matches!(
            catalog.snapshot().await.unwrap_err(),
            CatalogError::Credential(_)
        ));
    }

    /// Lists `first` immediately, then parks every later call until released.
    struct GatedLister {
        calls: AtomicUsize,
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ModelLister for GatedLister {
        async fn list_models(&self) -> Result<Vec<ModelInfo>, CatalogError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(vec![model("models/first", true)]);
            }
            self.started.notify_one();
            self.release.notified().await;
            Ok(vec![model("models/second", true)])
        }
    }

    #[tokio::test]
    async fn test_slow_refresh_does_not_block_readers() {
        let lister = Arc::new(GatedLister {
            calls: AtomicUsize::new(0),
            started: Notify::new(),
            release: Notify::new(),
        });
        let catalog = Arc::new(ModelCatalog::new(lister.clone(), Duration::ZERO));
        let first = catalog.snapshot().await.unwrap();

        let refreshing = tokio::spawn({
            let catalog = catalog.clone();
            async move { catalog.snapshot().await.unwrap() }
        });
        lister.started.notified().await;

        let during = tokio::time::timeout(Duration::from_secs(1), catalog.snapshot())
            .await
            .expect("reader blocked behind a refresh")
            .unwrap();
        assert!(Arc::ptr_eq(&first, &during));

        lister.release.notify_one();
        let refreshed = refreshing.await.unwrap();
        assert_eq!(refreshed.models[0].name, "models/second");
    }

    #[tokio::test]
    async fn test_cancelled_refresh_does_not_pin_stale_snapshot() {
        let lister = Arc::new(GatedLister {
            calls: AtomicUsize::new(0),
            started: Notify::new(),
            release: Notify::new(),
        });
        let catalog = ModelCatalog::new(lister.clone(), Duration::ZERO);
        catalog.snapshot().await.unwrap();

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), catalog.snapshot()).await;
        assert!(abandoned.is_err());

        // The next caller refreshes again rather than serving stale data forever.
        lister.release.notify_one();
        let refreshed = catalog.snapshot().await.unwrap();
        assert_eq!(refreshed.models[0].name, "models/second");
        assert_eq!(lister.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_http_error_drops_request_url() {
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:9/v1beta/models?key=SECRET")
            .send()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("SECRET"));

        let wrapped = CatalogError::from(err);
        assert!(!wrapped.to_string().contains("SECRET"), "{wrapped}");
    }

    #[test]
    fn test_model_info_wire_shape() {
        let parsed: ListModelsResponse = serde_json::from_str(
            r#"{"models":[{"name":"models/x","displayName":"X","supportedGenerationMethods":["bidiGenerateContent"]}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.models[0].display_name.as_deref(), Some("X"));
        assert_eq!(
            parsed.models[0].supported_generation_methods,
            vec!["bidiGenerateContent".to_string()]
        );
        assert!(parsed.next_page_token.is_none());

        let out = serde_json::to_value(&parsed.models[0]).unwrap();
        assert_eq!(
            out,
            serde_json::json!({"name": "models/x", "displayName": "X", "live": false})
        );
    }
}
