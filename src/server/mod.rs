// Server module entry
// Hosts the edge handler: listener, accept loop, connections and signals

pub mod connection;
pub mod listener;
pub mod signal;

// `loop` is a keyword, so the file is mounted under another name
#[path = "loop.rs"]
pub mod server_loop;

pub use connection::ServerContext;
pub use listener::{create_reusable_listener, DEFAULT_BACKLOG};
pub use server_loop::start_server_loop;
pub use signal::{start_signal_handler, SignalHandler};
