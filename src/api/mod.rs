//! HTTP transport for inbound submissions. All decision logic lives in the
//! engine; this layer only frames, validates, and acknowledges.

mod error;
mod handlers;
pub mod types;

pub use error::ApiError;

use axum::routing::post;
use axum::Router;

use crate::server::AppState;

/// Build the submission API router.
pub fn router() -> Router<AppState> {
    Router::new().route("/verify", post(handlers::verify))
}
