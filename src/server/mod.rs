//! HTTP control plane and websocket event surface

pub mod http;
pub mod websocket;

pub use http::{run, AppState};
