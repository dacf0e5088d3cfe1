//! Storefront Shared Types and Utilities
//!
//! Domain types, storage contracts and their implementations shared by the
//! storefront services.

pub mod db;
pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use db::*;
pub use error::*;
pub use memory::MemoryStore;
pub use store::{PgStore, TokenStore, UserStore};
pub use types::*;
