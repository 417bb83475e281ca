// Server loop module
// Accepts connections until shutdown is signalled, then drains active ones

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use super::connection::{accept_connection, ServerContext};
use super::signal::SignalHandler;
use crate::logger;

/// How often the drain phase re-checks the active connection count
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Accept loop for the edge server.
///
/// Returns once shutdown is requested and in-flight connections have
/// finished, or the drain deadline (the connection timeout) has passed.
/// Idle keep-alive connections are closed as soon as draining starts.
pub async fn start_server_loop(
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    signals: Arc<SignalHandler>,
) {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &ctx);
                    }
                    Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
                }
            }

            () = signals.shutdown.notified() => {
                logger::log_info("Shutdown requested, no longer accepting connections");
                break;
            }
        }
    }

    drop(listener);
    ctx.start_draining();
    drain_connections(&ctx, ctx.config.connection_timeout()).await;
}

async fn drain_connections(ctx: &ServerContext, deadline: Duration) {
    let started = tokio::time::Instant::now();
    while ctx.active() > 0 {
        if started.elapsed() >= deadline {
            logger::log_warning(&format!(
                "Shutting down with {} connection(s) still open",
                ctx.active()
            ));
            return;
        }
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
    logger::log_info("All connections closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::handler::RequestHandler;
    use crate::server::listener::{create_reusable_listener, DEFAULT_BACKLOG};

    fn test_context(max_connections: Option<u64>) -> Arc<ServerContext> {
        context_with_timeout(max_connections, 2)
    }

    fn context_with_timeout(max_connections: Option<u64>, timeout_secs: u64) -> Arc<ServerContext> {
        let mut config = Config::load_from("definitely-not-a-config-file").unwrap();
        config.service.url = String::new();
        config.logging.access_log = true;
        config.performance.max_connections = max_connections;
        config.performance.read_timeout = timeout_secs;
        config.performance.write_timeout = timeout_secs;

        let handler =
            RequestHandler::with_auth_service(config.handler_config(), Duration::from_secs(1))
                .unwrap();
        Arc::new(ServerContext::new(Arc::new(config), Arc::new(handler)))
    }

    fn http_client() -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_serves_requests_until_shutdown() {
        let listener =
            create_reusable_listener("127.0.0.1:0".parse().unwrap(), DEFAULT_BACKLOG).unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = test_context(None);
        let signals = Arc::new(SignalHandler::new());

        let server = tokio::spawn(start_server_loop(
            listener,
            Arc::clone(&ctx),
            Arc::clone(&signals),
        ));

        let client = http_client();
        let response = client
            .post(format!("http://{addr}/functions/v1/hello"))
            .body(r#"{"x":1}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["receivedData"], serde_json::json!({"x": 1}));
        assert_eq!(body["user"], "anonymous");

        let preflight = client
            .request(reqwest::Method::OPTIONS, format!("http://{addr}/"))
            .send()
            .await
            .unwrap();
        assert_eq!(preflight.status(), 200);
        assert!(preflight.headers().get("content-type").is_none());

        drop(client);
        signals.trigger();
        tokio::time::timeout(Duration::from_secs(10), server)
            .await
            .expect("server loop should stop after shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_idle_keep_alive_connections() {
        let listener =
            create_reusable_listener("127.0.0.1:0".parse().unwrap(), DEFAULT_BACKLOG).unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = context_with_timeout(None, 30);
        let signals = Arc::new(SignalHandler::new());

        let server = tokio::spawn(start_server_loop(
            listener,
            Arc::clone(&ctx),
            Arc::clone(&signals),
        ));

        // The pooled connection stays open after the response
        let client = http_client();
        let response = client.get(format!("http://{addr}/")).send().await.unwrap();
        assert_eq!(response.status(), 200);
        response.bytes().await.unwrap();
        assert_eq!(ctx.active(), 1);

        let started = std::time::Instant::now();
        signals.trigger();
        tokio::time::timeout(Duration::from_secs(3), server)
            .await
            .expect("idle keep-alive connection should not hold up shutdown")
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(ctx.is_draining());
        assert_eq!(ctx.active(), 0);
        drop(client);
    }

    #[tokio::test]
    async fn test_rejects_over_connection_limit() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = test_context(Some(0));

        let _client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (stream, peer_addr) = listener.accept().await.unwrap();

        assert!(!accept_connection(stream, peer_addr, &ctx));
        assert_eq!(ctx.active(), 0);
    }

    #[tokio::test]
    async fn test_drain_returns_when_idle() {
        let ctx = test_context(None);
        tokio::time::timeout(
            Duration::from_secs(1),
            drain_connections(&ctx, Duration::from_secs(30)),
        )
        .await
        .unwrap();
    }
}
