//! HTTP API module.
//!
//! Run trigger, health check and the log broadcaster every stage writes to.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{router, start_server};
pub use types::*;
