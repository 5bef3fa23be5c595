pub mod annotations;
pub mod auth;
pub mod images;
pub mod middleware;
pub mod novels;
pub mod rest;
pub mod sharing;
pub mod state;
pub mod users;

// Re-export the middleware so the binary can build the router from one place.
pub use middleware::{require_admin, require_auth};
