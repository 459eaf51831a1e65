//! Live synchronization with the running go2rtc instance.
//!
//! Registry mutations are mirrored to the engine's runtime API so changes
//! take effect without a restart. Delivery is best effort: a failed call is
//! logged and the committed registry change stands.

use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
enum SyncError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("engine answered {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Client for the engine's `/api/streams` control endpoint.
#[derive(Debug, Clone)]
pub struct LiveSync {
    client: reqwest::Client,
    base_url: String,
}

impl LiveSync {
    pub fn new(api_base_url: impl Into<String>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let base_url = api_base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create or replace the named source on the engine.
    pub async fn push(&self, name: &str, url: &str) {
        let endpoint = format!(
            "{}/api/streams?name={}&src={}",
            self.base_url,
            urlencoding::encode(name),
            urlencoding::encode(url)
        );

        if let Err(e) = self.send(self.client.put(&endpoint)).await {
            warn!(stream = %name, error = %e, "Failed to push stream to engine");
        }
    }

    /// Delete the named source from the engine.
    pub async fn retract(&self, name: &str) {
        let endpoint = format!(
            "{}/api/streams?src={}",
            self.base_url,
            urlencoding::encode(name)
        );

        if let Err(e) = self.send(self.client.delete(&endpoint)).await {
            warn!(stream = %name, error = %e, "Failed to remove stream from engine");
        }
    }

    /// Mirror a rename/update: drop the old name first when it changed.
    pub async fn mirror_update(&self, old_name: &str, new_name: &str, url: &str) {
        if old_name != new_name {
            self.retract(old_name).await;
        }
        self.push(new_name, url).await;
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(), SyncError> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Status { status, body });
        }

        debug!(status = %status, "Engine stream API call succeeded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{RawQuery, State};
    use axum::http::{Method, StatusCode};
    use axum::routing::any;
    use axum::Router;
    use std::sync::{Arc, Mutex};

    type Calls = Arc<Mutex<Vec<(Method, String)>>>;

    async fn record(
        State(calls): State<Calls>,
        method: Method,
        RawQuery(query): RawQuery,
    ) -> StatusCode {
        calls
            .lock()
            .unwrap()
            .push((method, query.unwrap_or_default()));
        StatusCode::OK
    }

    async fn fake_engine() -> (String, Calls) {
        let calls: Calls = Arc::default();
        let app = Router::new()
            .route("/api/streams", any(record))
            .with_state(calls.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/", addr), calls)
    }

    #[tokio::test]
    async fn test_push_encodes_query() {
        let (base, calls) = fake_engine().await;
        let sync = LiveSync::new(base).unwrap();

        sync.push("front door", "rtsp://10.0.0.5:554/s?a=1&b=2").await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, Method::PUT);
        assert_eq!(
            calls[0].1,
            "name=front%20door&src=rtsp%3A%2F%2F10.0.0.5%3A554%2Fs%3Fa%3D1%26b%3D2"
        );
    }

    #[tokio::test]
    async fn test_mirror_update_rename_deletes_then_pushes() {
        let (base, calls) = fake_engine().await;
        let sync = LiveSync::new(base).unwrap();

        sync.mirror_update("cam1", "cam2", "rtsp://x").await;

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                (Method::DELETE, "src=cam1".to_string()),
                (Method::PUT, "name=cam2&src=rtsp%3A%2F%2Fx".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_mirror_update_same_name_only_pushes() {
        let (base, calls) = fake_engine().await;
        let sync = LiveSync::new(base).unwrap();

        sync.mirror_update("cam1", "cam1", "rtsp://y").await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, Method::PUT);
    }

    #[tokio::test]
    async fn test_unreachable_engine_is_swallowed() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sync = LiveSync::new(format!("http://{}", addr)).unwrap();
        sync.push("cam1", "rtsp://x").await;
        sync.retract("cam1").await;
        sync.mirror_update("cam1", "cam2", "rtsp://x").await;
    }

    #[tokio::test]
    async fn test_error_status_is_swallowed() {
        let app = Router::new().route(
            "/api/streams",
            any(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let sync = LiveSync::new(format!("http://{}", addr)).unwrap();
        sync.push("cam1", "rtsp://x").await;
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let sync = LiveSync::new("http://localhost:1984/").unwrap();
        assert_eq!(sync.base_url(), "http://localhost:1984");
    }
}
