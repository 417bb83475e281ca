//! HTTP protocol layer module
//!
//! Response builders shared by the request handler and the connection layer.

pub mod response;

pub use response::{
    build_405_response, build_preflight_response, error_response, json_response,
};
