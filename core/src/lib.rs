//! BI Migration Core Library
//!
//! Contains domain models, the entity store, BI tool adapters and the
//! services behind the BI migration hub: connection management, asset
//! catalog and the migration job lifecycle.

pub mod adapter;
pub mod asset;
pub mod connection;
pub mod domain;
pub mod error;
pub mod migration;
pub mod query;
pub mod store;

pub use error::{CoreError, Result};
