use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::service::{ApiError, ApiResult, RequestInit, ResponseMeta, Service};

/// What a mounted call currently shows.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSnapshot<T> {
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub response: Option<ResponseMeta>,
    pub loading: bool,
}

impl<T> Default for CallSnapshot<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            response: None,
            loading: false,
        }
    }
}

struct CallParams {
    init: RequestInit,
    deps: Vec<Value>,
}

struct CallInner<T> {
    service: Service<T>,
    generation: AtomicU64,
    mounted: AtomicBool,
    params: Mutex<CallParams>,
    state: watch::Sender<CallSnapshot<T>>,
}

impl<T> CallInner<T> {
    fn is_current(&self, generation: u64) -> bool {
        self.mounted.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }
}

/// A mounted data-fetching handle over one [`Service`].
///
/// Requests are issued on mount, on every dependency change and on
/// [`refetch`](Self::refetch). Every request takes a new generation; a
/// completion is committed only while its generation is still the latest and
/// the handle is mounted, so a slow earlier response can never overwrite a
/// newer one.
///
/// The client's session hook still sees a dropped response. Build the
/// request with [`RequestInit::without_session_hook`] when a late session
/// change must not apply.
pub struct ApiCall<T> {
    inner: Arc<CallInner<T>>,
}

impl<T> Clone for ApiCall<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> ApiCall<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create a mounted handle without issuing a request.
    pub fn new(service: Service<T>, init: RequestInit, deps: Vec<Value>) -> Self {
        let (state, _) = watch::channel(CallSnapshot::default());
        Self {
            inner: Arc::new(CallInner {
                service,
                generation: AtomicU64::new(0),
                mounted: AtomicBool::new(true),
                params: Mutex::new(CallParams { init, deps }),
                state,
            }),
        }
    }

    /// Create a handle and issue the first request in the background.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn mount(service: Service<T>, init: RequestInit, deps: Vec<Value>) -> Self {
        let call = Self::new(service, init, deps);
        call.spawn_refetch();
        call
    }

    /// Re-issue the request and wait for it. Returns whether its result was
    /// committed.
    pub async fn refetch(&self) -> bool {
        match self.begin() {
            Some((generation, init)) => complete(self.inner.clone(), generation, init).await,
            None => false,
        }
    }

    /// Re-issue the request in the background.
    ///
    /// `loading` is already set when this returns.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn spawn_refetch(&self) -> Option<JoinHandle<bool>> {
        let (generation, init) = self.begin()?;
        Some(tokio::spawn(complete(self.inner.clone(), generation, init)))
    }

    /// Replace the dependency list, re-issuing only when it changed.
    ///
    /// # Panics
    ///
    /// Panics outside a tokio runtime when the request is re-issued.
    pub fn set_deps(&self, deps: Vec<Value>) -> Option<JoinHandle<bool>> {
        {
            let mut params = self.inner.params.lock().unwrap_or_else(PoisonError::into_inner);
            if params.deps == deps {
                return None;
            }
            params.deps = deps;
        }
        self.spawn_refetch()
    }

    /// Replace the call parameters. The request is re-issued only when `deps`
    /// changed, as with [`set_deps`](Self::set_deps).
    ///
    /// # Panics
    ///
    /// Panics outside a tokio runtime when the request is re-issued.
    pub fn set_init(&self, init: RequestInit, deps: Vec<Value>) -> Option<JoinHandle<bool>> {
        self.inner
            .params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .init = init;
        self.set_deps(deps)
    }

    pub fn snapshot(&self) -> CallSnapshot<T> {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot<T>> {
        self.inner.state.subscribe()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.load(Ordering::SeqCst)
    }

    /// Stop committing results. In-flight requests run to completion but
    /// their results are discarded.
    pub fn unmount(&self) {
        self.inner.mounted.store(false, Ordering::SeqCst);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn begin(&self) -> Option<(u64, RequestInit)> {
        if !self.is_mounted() {
            tracing::debug!(path = self.inner.service.path(), "Ignoring request on unmounted call");
            return None;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let init = self
            .inner
            .params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .init
            .clone();
        self.inner.state.send_modify(|snapshot| snapshot.loading = true);
        Some((generation, init))
    }
}

async fn complete<T>(inner: Arc<CallInner<T>>, generation: u64, init: RequestInit) -> bool
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    let result: ApiResult<T> = inner.service.request(init).await;

    let committed = inner.state.send_if_modified(|snapshot| {
        if !inner.is_current(generation) {
            return false;
        }
        snapshot.data = result.data;
        snapshot.error = result.error;
        snapshot.response = result.response;
        snapshot.loading = false;
        true
    });

    if !committed {
        tracing::debug!(
            path = inner.service.path(),
            generation,
            latest = inner.generation.load(Ordering::SeqCst),
            "Dropped stale response"
        );
    }
    committed
}

impl<T> std::fmt::Debug for ApiCall<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCall")
            .field("service", &self.inner.service)
            .field("generation", &self.inner.generation.load(Ordering::SeqCst))
            .field("mounted", &self.inner.mounted.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiClient, ServiceFactory};
    use crate::openapi::tests::gallery_document;
    use crate::openapi::HttpMethod;
    use crate::testing::{MockHttp, MockResponse};
    use serde_json::json;
    use std::time::Duration;

    fn service(mock: &MockHttp) -> Service<Value> {
        let client = ApiClient::new("http://api.test", Arc::new(mock.clone()));
        ServiceFactory::new(client, gallery_document())
            .create(HttpMethod::Get, "/galleries")
            .unwrap()
    }

    /// Answers after `limit` milliseconds, echoing the limit back.
    fn delayed_by_limit() -> MockHttp {
        let mock = MockHttp::new();
        mock.add_mock_sync("*", |req| {
            let limit: u64 = req
                .query
                .get("limit")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            MockResponse::json(json!({ "limit": limit }))
                .with_delay(Duration::from_millis(limit))
        });
        mock
    }

    fn limit(n: u64) -> RequestInit {
        RequestInit::new().query("limit", n)
    }

    #[test]
    #[should_panic]
    fn test_mount_outside_runtime_panics() {
        let mock = MockHttp::new();
        ApiCall::mount(service(&mock), RequestInit::new(), vec![]);
    }

    #[test]
    fn test_unchanged_deps_need_no_runtime() {
        let mock = MockHttp::new();
        let call = ApiCall::new(service(&mock), RequestInit::new(), vec![json!(1)]);
        assert!(call.set_deps(vec![json!(1)]).is_none());
        mock.assert_called_times("*", 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_issues_first_request() {
        let mock = MockHttp::new();
        mock.add_mock_sync("*", |_| MockResponse::json(json!([{ "id": "g1" }])));
        let call = ApiCall::mount(service(&mock), RequestInit::new(), vec![]);
        assert!(call.snapshot().loading);

        let mut rx = call.subscribe();
        rx.wait_for(|s| !s.loading).await.unwrap();

        let snapshot = call.snapshot();
        assert_eq!(snapshot.data, Some(json!([{ "id": "g1" }])));
        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.response.map(|r| r.status), Some(200));
        mock.assert_called_times("*", 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_never_overwrites_newer() {
        let mock = delayed_by_limit();
        let call = ApiCall::new(service(&mock), limit(500), vec![json!(500)]);

        let first = call.spawn_refetch().unwrap();
        let second = call.set_init(limit(50), vec![json!(50)]).unwrap();

        // The second request completes first and commits.
        assert!(second.await.unwrap());
        assert_eq!(call.snapshot().data, Some(json!({ "limit": 50 })));
        assert!(!call.snapshot().loading);

        // The first one arrives later and is dropped.
        assert!(!first.await.unwrap());
        assert_eq!(call.snapshot().data, Some(json!({ "limit": 50 })));
        mock.assert_called_times("*", 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_stays_until_latest_commits() {
        let mock = delayed_by_limit();
        let call = ApiCall::new(service(&mock), limit(50), vec![json!(50)]);

        let first = call.spawn_refetch().unwrap();
        let second = call.set_init(limit(500), vec![json!(500)]).unwrap();

        assert!(!first.await.unwrap());
        assert!(call.snapshot().loading);
        assert_eq!(call.snapshot().data, None);

        assert!(second.await.unwrap());
        assert!(!call.snapshot().loading);
        assert_eq!(call.snapshot().data, Some(json!({ "limit": 500 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_deps_refetches_only_on_change() {
        let mock = MockHttp::new();
        mock.add_mock_sync("*", |_| MockResponse::json(json!([])));
        let call = ApiCall::new(service(&mock), RequestInit::new(), vec![json!(1)]);

        assert!(call.set_deps(vec![json!(1)]).is_none());
        let handle = call.set_deps(vec![json!(2)]).unwrap();
        assert!(handle.await.unwrap());
        mock.assert_called_times("*", 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_init_uses_new_parameters() {
        let mock = MockHttp::new();
        mock.add_mock_sync("*", |req| MockResponse::json(json!({ "url": req.url })));
        let call = ApiCall::new(service(&mock), RequestInit::new(), vec![json!(0)]);

        let handle = call
            .set_init(RequestInit::new().query("limit", 5), vec![json!(5)])
            .unwrap();
        assert!(handle.await.unwrap());
        assert_eq!(
            call.snapshot().data,
            Some(json!({ "url": "http://api.test/galleries?limit=5" }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_discards_in_flight_result() {
        let mock = delayed_by_limit();
        let call = ApiCall::new(service(&mock), limit(200), vec![]);

        let pending = call.spawn_refetch().unwrap();
        call.unmount();
        assert!(!pending.await.unwrap());
        assert_eq!(call.snapshot().data, None);

        assert!(call.spawn_refetch().is_none());
        assert!(!call.refetch().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_result_is_committed() {
        let mock = MockHttp::new();
        mock.add_mock_sync("*", |_| MockResponse::unauthorized("Not signed in"));
        let call = ApiCall::new(service(&mock), RequestInit::new(), vec![]);

        assert!(call.refetch().await);
        let snapshot = call.snapshot();
        assert!(snapshot.data.is_none());
        assert_eq!(snapshot.error.map(|e| e.message()), Some("Not signed in".to_string()));
    }
}
