use std::sync::Arc;

mod config;
mod handler;
mod http;
mod identity;
mod logger;
mod server;

/// Command line arguments
struct Args {
    config_path: String,
}

impl Args {
    fn parse() -> Result<Self, String> {
        let mut args = std::env::args().skip(1);
        let mut config_path = "config".to_string();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config_path = args
                        .next()
                        .ok_or_else(|| "--config requires a path".to_string())?;
                }
                "--help" | "-h" => {
                    println!("Usage: hello-edge [--config <path-without-extension>]");
                    std::process::exit(0);
                }
                other => return Err(format!("Unknown argument: {other}")),
            }
        }

        Ok(Self { config_path })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse()?;
    let cfg = config::Config::load_from(&args.config_path)?;
    logger::init(&cfg)?;

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }

    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.get_socket_addr()?;
    let listener = server::create_reusable_listener(addr, server::DEFAULT_BACKLOG)?;

    let request_handler =
        handler::RequestHandler::with_auth_service(cfg.handler_config(), cfg.service_timeout())?;

    logger::log_server_start(&addr, &cfg);
    logger::log_info(&format!(
        "Max body size: {} bytes, max connections: {:?}",
        cfg.http.max_body_size, cfg.performance.max_connections
    ));

    let ctx = Arc::new(server::ServerContext::new(
        Arc::new(cfg),
        Arc::new(request_handler),
    ));

    let signals = Arc::new(server::SignalHandler::new());
    server::start_signal_handler(Arc::clone(&signals));

    server::start_server_loop(listener, ctx, Arc::clone(&signals)).await;
    if signals.is_shutdown_requested() {
        logger::log_info("Server stopped by signal");
    }
    Ok(())
}
