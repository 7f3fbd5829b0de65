pub mod client;
pub mod common;
pub mod data;
pub mod hardware;
pub mod protocol;
pub mod server;
pub mod thresholds;
