pub mod bridge;
pub mod cache;
pub mod config;
pub mod delimited;
pub mod error;
pub mod executor;
pub mod logging;
pub mod protocol;
pub mod shutdown;
