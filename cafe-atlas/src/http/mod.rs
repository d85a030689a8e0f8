//! HTTP layer: Axum router, handlers, and responses.
//!
//! Two surfaces over the same data: the JSON API under `/api` (bearer
//! tokens) and server-rendered pages (session cookies).

mod api;
mod auth;
mod error;
mod handlers;
mod pages;
mod responses;
mod state;
mod templates;

#[cfg(test)]
mod tests;

pub use handlers::router;
pub use state::AppState;
