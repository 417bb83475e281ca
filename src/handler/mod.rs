//! Request handler module
//!
//! The edge function itself: one stateless handler shared by all connections.

mod error;
pub mod router;
mod types;

pub use router::RequestHandler;
