use axum::{
    Router,
    extract::{RawQuery, State},
    response::Html,
    routing::get,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};

const DONE_PAGE: &str = "<!doctype html><html><body>\
<p>Sign-in response received. You can close this window and return to the terminal.</p>\
</body></html>";

struct ListenerState {
    /// Redirect URI without its query; the callback URL is rebuilt from it.
    redirect_base: String,
    sender: Mutex<Option<oneshot::Sender<String>>>,
}

/// One-shot loopback HTTP listener on the redirect URI's host, port and path.
pub struct CallbackListener {
    listener: tokio::net::TcpListener,
    redirect_base: String,
    path: String,
}

impl CallbackListener {
    pub async fn bind(redirect_uri: &str) -> anyhow::Result<Self> {
        let parsed = url::Url::parse(redirect_uri)?;
        if parsed.scheme() != "http" {
            anyhow::bail!("--listen needs an http:// loopback redirect URI, got {}", redirect_uri);
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("redirect URI has no host: {}", redirect_uri))?;
        let port = parsed.port_or_known_default().unwrap_or(80);

        let listener = tokio::net::TcpListener::bind((host, port)).await?;
        let mut base = parsed.clone();
        base.set_query(None);
        base.set_fragment(None);
        tracing::info!("Waiting for the login callback on {}", base);

        Ok(Self {
            listener,
            redirect_base: base.to_string(),
            path: parsed.path().to_string(),
        })
    }

    #[cfg(test)]
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until the first request to the callback path, then shut down and return its URL.
    pub async fn wait(self, timeout: Duration) -> anyhow::Result<String> {
        let Self {
            listener,
            redirect_base,
            path,
        } = self;
        let (tx, rx) = oneshot::channel::<String>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(ListenerState {
            redirect_base,
            sender: Mutex::new(Some(tx)),
        });
        let app = Router::new()
            .route(&path, get(receive_callback))
            .with_state(state);

        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let received = tokio::time::timeout(timeout, rx).await;
        let _ = shutdown_tx.send(());
        match server.await {
            Ok(Err(e)) => tracing::warn!("Callback listener error: {}", e),
            Err(e) => tracing::warn!("Callback listener task failed: {}", e),
            Ok(Ok(())) => {}
        }

        match received {
            Ok(Ok(url)) => Ok(url),
            Ok(Err(_)) => anyhow::bail!("callback listener stopped before a callback arrived"),
            Err(_) => anyhow::bail!("no callback received within {}s", timeout.as_secs()),
        }
    }
}

async fn receive_callback(
    State(state): State<Arc<ListenerState>>,
    RawQuery(query): RawQuery,
) -> Html<&'static str> {
    let url = match query {
        Some(q) => format!("{}?{}", state.redirect_base, q),
        None => state.redirect_base.clone(),
    };
    if let Some(tx) = state.sender.lock().await.take() {
        let _ = tx.send(url);
    }
    Html(DONE_PAGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn captures_first_callback() {
        let listener = CallbackListener::bind("http://127.0.0.1:0/cb").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let waiter = tokio::spawn(listener.wait(Duration::from_secs(5)));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /cb?code=abc&state=xyz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));

        let url = waiter.await.unwrap().unwrap();
        assert_eq!(url, "http://127.0.0.1:0/cb?code=abc&state=xyz");
    }

    #[tokio::test]
    async fn times_out_without_callback() {
        let listener = CallbackListener::bind("http://127.0.0.1:0/cb").await.unwrap();
        let err = listener.wait(Duration::from_millis(50)).await.unwrap_err();
        assert!(err.to_string().contains("no callback"));
    }

    #[tokio::test]
    async fn rejects_https_redirect() {
        assert!(CallbackListener::bind("https://127.0.0.1:8443/cb").await.is_err());
    }
}
