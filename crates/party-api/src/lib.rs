pub mod auth;
pub mod error;
pub mod facebook;
pub mod geocode;
pub mod middleware;
pub mod parties;
pub mod routes;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;
pub use routes::router;
