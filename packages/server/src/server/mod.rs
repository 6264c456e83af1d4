//! HTTP server: router, routes, and application state.

pub mod app;
pub mod routes;

pub use app::{build_app, AxumAppState};
