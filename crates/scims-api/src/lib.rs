//! REST API for the SCIMS crafting engine.
//!
//! An Axum server over any [`ScimsStore`](scims_core::ScimsStore). The
//! requester is taken from the `x-scims-user` header; authentication
//! happens upstream.
//!
//! Errors render as `{"error": <message>, "status": <code>}` with the
//! status chosen by [`ApiError::status`].

pub mod error;
pub mod handlers;
pub mod requests;
pub mod router;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use handlers::{REQUESTER_HEADER, Requester};
pub use router::build_router;
pub use server::{ServerError, start_server};
pub use state::AppState;
