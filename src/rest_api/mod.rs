//! REST API module
//!
//! Serves `/health`, `/metrics` and a read-only listing of managed services.

mod dto;
mod handlers;
mod server;

pub use dto::{ServiceListResponse, ServiceSummary};
pub use server::{router, run_server};
