//! Storefront API Library
//!
//! Authentication, signed reset links and real-time notifications for the
//! storefront web app and its admin API.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod routes;
pub mod security;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
