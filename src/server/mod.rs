//! HTTP API over the session directory: summaries, raw logs, progress, and
//! danger findings.

mod api;
mod handlers;
mod server;

pub use api::{MarkReadRequest, OperationResponse, SessionSummary};
pub use handlers::AppState;
pub use server::ReviewServer;
