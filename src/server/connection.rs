// Connection handling module
// Accepts one TCP connection and serves its requests with the edge handler

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use http_body_util::Full;
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::USER_AGENT;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, Version};
use hyper_util::rt::TokioIo;
use tokio::sync::watch;

use crate::config::Config;
use crate::handler::RequestHandler;
use crate::logger::{self, AccessLogEntry};

/// Everything a connection task needs, shared across all connections
pub struct ServerContext {
    pub config: Arc<Config>,
    pub handler: Arc<RequestHandler>,
    pub active_connections: Arc<AtomicUsize>,
    draining: watch::Sender<bool>,
}

impl ServerContext {
    pub fn new(config: Arc<Config>, handler: Arc<RequestHandler>) -> Self {
        Self {
            config,
            handler,
            active_connections: Arc::new(AtomicUsize::new(0)),
            draining: watch::channel(false).0,
        }
    }

    pub fn active(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }

    /// Ask every open connection to finish its in-flight request and close
    pub fn start_draining(&self) {
        self.draining.send_replace(true);
    }

    pub fn is_draining(&self) -> bool {
        *self.draining.borrow()
    }
}

/// Accept a connection, enforcing `performance.max_connections`.
///
/// Returns `false` when the connection was rejected.
pub fn accept_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    ctx: &Arc<ServerContext>,
) -> bool {
    // Increment first, then check, so two racing accepts cannot both pass
    let prev_count = ctx.active_connections.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = ctx.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            ctx.active_connections.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection rejected."
            ));
            drop(stream);
            return false;
        }
    }

    logger::log_connection_accepted(&peer_addr);
    handle_connection(stream, peer_addr, Arc::clone(ctx));
    true
}

/// Serve one connection in a spawned task, bounded by the connection timeout
fn handle_connection(stream: tokio::net::TcpStream, peer_addr: SocketAddr, ctx: Arc<ServerContext>) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);
        let timeout_duration = ctx.config.connection_timeout();

        let mut builder = http1::Builder::new();
        builder.keep_alive(ctx.config.performance.keep_alive_timeout > 0);

        let service_ctx = Arc::clone(&ctx);
        let conn = builder.serve_connection(
            io,
            service_fn(move |req| {
                let ctx = Arc::clone(&service_ctx);
                async move { serve_request(req, peer_addr, &ctx).await }
            }),
        );

        let mut draining = ctx.draining.subscribe();
        let served = async move {
            tokio::pin!(conn);
            // Drain may have started before this task subscribed
            let mut closing = *draining.borrow_and_update();
            if closing {
                conn.as_mut().graceful_shutdown();
            }
            loop {
                tokio::select! {
                    result = conn.as_mut() => break result,
                    _ = draining.changed(), if !closing => {
                        closing = true;
                        conn.as_mut().graceful_shutdown();
                    }
                }
            }
        };

        match tokio::time::timeout(timeout_duration, served).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => logger::log_connection_error(&err),
            Err(_) => logger::log_warning(&format!(
                "Connection from {peer_addr} timed out after {} seconds",
                timeout_duration.as_secs()
            )),
        }

        ctx.active_connections.fetch_sub(1, Ordering::SeqCst);
    });
}

/// Run the handler for one request and write its access log line
async fn serve_request(
    req: Request<Incoming>,
    peer_addr: SocketAddr,
    ctx: &ServerContext,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let logging = &ctx.config.logging;
    if !logging.access_log {
        return Ok(ctx.handler.handle(req).await);
    }

    let started = Instant::now();
    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = version_label(req.version()).to_string();
    entry.user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);

    let handled = ctx.handler.handle_request(req).await;

    entry.remote_user = handled.user;
    entry.status = handled.response.status().as_u16();
    entry.body_bytes = handled
        .response
        .body()
        .size_hint()
        .exact()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0);
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    logger::log_access(&entry, &logging.access_log_format);

    Ok(handled.response)
}

fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}
