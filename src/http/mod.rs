//! HTTP surface: admission middleware, error envelope and server.

mod error;
mod health;
mod middleware;
mod server;

pub use error::ApiError;
pub use middleware::rate_limit;
pub use server::{create_router, AppState, HttpServer};
