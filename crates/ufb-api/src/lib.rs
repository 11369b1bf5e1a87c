pub mod auth;
pub mod codes;
pub mod error;
pub mod feedback;
pub mod mailer;
pub mod middleware;
pub mod oauth;
pub mod permissions;
pub mod posts;
pub mod roles;
pub mod routes;
pub mod service;
pub mod session;
pub mod state;
pub mod statistics;
pub mod users;
pub mod validation;
mod views;

pub use error::ApiError;
pub use routes::router;
pub use state::{ApiConfig, AppState};
