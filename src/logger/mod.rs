//! Logger module
//!
//! Provides logging utilities for the edge server including:
//! - Server lifecycle logging
//! - Access logging with multiple formats
//! - Error, warning and debug logging
//! - File-based logging support

mod format;
pub mod writer;

pub use format::AccessLogEntry;
pub use writer::Level;

use crate::config::Config;
use std::net::SocketAddr;

/// Initialize the logger with configuration
///
/// Should be called once at application startup.
pub fn init(config: &Config) -> std::io::Result<()> {
    writer::init(
        Level::parse(&config.logging.level),
        config.logging.access_log_file.as_deref(),
        config.logging.error_log_file.as_deref(),
    )
}

/// Route a message through the global writer, or straight to the console
/// before `init()` has run (and in unit tests)
fn write(level: Level, message: &str) {
    match writer::get() {
        Some(w) => w.write(level, message),
        None => match level {
            Level::Error | Level::Warn => eprintln!("{message}"),
            Level::Info | Level::Debug => println!("{message}"),
        },
    }
}

fn write_access(message: &str) {
    match writer::get() {
        Some(w) => w.write_access(message),
        None => println!("{message}"),
    }
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    write(Level::Info, "======================================");
    write(Level::Info, "Edge function server started");
    write(Level::Info, &format!("Listening on: http://{addr}"));
    write(Level::Info, &format!("Log level: {}", config.logging.level));
    if let Some(workers) = config.server.workers {
        write(Level::Info, &format!("Worker threads: {workers}"));
    }
    if config.service.url.is_empty() {
        write(
            Level::Info,
            "Identity backend: not configured (callers resolve as anonymous)",
        );
    } else {
        write(
            Level::Info,
            &format!("Identity backend: {}", config.service.url),
        );
    }
    if let Some(ref path) = config.logging.access_log_file {
        write(Level::Info, &format!("Access log: {path}"));
    }
    if let Some(ref path) = config.logging.error_log_file {
        write(Level::Info, &format!("Error log: {path}"));
    }
    write(Level::Info, "======================================\n");
}

pub fn log_info(message: &str) {
    write(Level::Info, &format!("[INFO] {message}"));
}

pub fn log_debug(message: &str) {
    write(Level::Debug, &format!("[DEBUG] {message}"));
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    write(
        Level::Debug,
        &format!("[Connection] Accepted from: {peer_addr}"),
    );
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    write(
        Level::Error,
        &format!("[ERROR] Failed to serve connection: {err:?}"),
    );
}

pub fn log_error(message: &str) {
    write(Level::Error, &format!("[ERROR] {message}"));
}

pub fn log_warning(message: &str) {
    write(Level::Warn, &format!("[WARN] {message}"));
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    write_access(&entry.format(format));
}
