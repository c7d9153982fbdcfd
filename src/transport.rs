use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("invalid destination url {0}")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server answered with status {0}")]
    Status(u16),
}

/// Destination for serialized snapshots.
pub trait SnapshotSink: Send + Sync {
    fn send(
        &self,
        url: &str,
        payload: &str,
        key: &str,
    ) -> impl Future<Output = Result<(), SendError>> + Send;
}

/// Posts snapshots as JSON with the credential as a bearer token.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
}

impl HttpSink {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .user_agent(concat!("hostmon/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

impl SnapshotSink for HttpSink {
    async fn send(&self, url: &str, payload: &str, key: &str) -> Result<(), SendError> {
        let target = Url::parse(url).map_err(|err| SendError::InvalidUrl(format!("{url}: {err}")))?;
        debug!(base = %base_uri(&target), resource = target.path(), "sending snapshot");

        let response = self
            .client
            .post(target)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(key)
            .body(payload.to_string())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SendError::Status(status.as_u16()));
        }

        info!(url, "data sent successfully");
        Ok(())
    }
}

/// Logs snapshots instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct LogSink;

impl SnapshotSink for LogSink {
    async fn send(&self, url: &str, payload: &str, _key: &str) -> Result<(), SendError> {
        info!(url, payload, "collected data");
        Ok(())
    }
}

fn base_uri(url: &Url) -> String {
    let mut base = format!("{}://", url.scheme());
    if !url.username().is_empty() {
        base.push_str(url.username());
        base.push('@');
    }
    base.push_str(url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        base.push_str(&format!(":{port}"));
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    async fn spawn_server(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{addr}/api/report")
    }

    #[test]
    fn base_uri_drops_path_and_keeps_port() {
        let url = Url::parse("https://agent@collector.local:8443/api/report?x=1").unwrap();
        assert_eq!(base_uri(&url), "https://agent@collector.local:8443");
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_before_sending() {
        let sink = HttpSink::new(Duration::from_secs(1));
        let err = sink.send("not a url", "{}", "key").await.unwrap_err();
        assert!(matches!(err, SendError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn posts_payload_with_bearer_key() {
        let seen: Arc<Mutex<Option<(String, String)>>> = Arc::new(Mutex::new(None));
        let router = {
            let seen = seen.clone();
            Router::new().route(
                "/api/report",
                post(move |headers: HeaderMap, body: String| {
                    let seen = seen.clone();
                    async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        *seen.lock().unwrap() = Some((auth, body));
                        StatusCode::OK
                    }
                }),
            )
        };
        let url = spawn_server(router).await;

        let sink = HttpSink::new(Duration::from_secs(5));
        sink.send(&url, r#"{"cpu_percent":1.0}"#, "secret")
            .await
            .unwrap();

        let (auth, body) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(auth, "Bearer secret");
        assert_eq!(body, r#"{"cpu_percent":1.0}"#);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let router = Router::new().route(
            "/api/report",
            post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let url = spawn_server(router).await;

        let sink = HttpSink::new(Duration::from_secs(5));
        let err = sink.send(&url, "{}", "secret").await.unwrap_err();
        assert!(matches!(err, SendError::Status(503)));
    }

    #[tokio::test]
    async fn log_sink_always_succeeds() {
        LogSink.send("http://unused", "{}", "").await.unwrap();
    }
}
