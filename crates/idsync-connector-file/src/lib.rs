//! # File Connector
//!
//! A provider adapter over a JSON document on disk. Useful as a staging
//! target, for fixtures, and for exercising sync configurations before
//! pointing them at a live system.
//!
//! ## Features
//!
//! - SCIM-style filter expressions on population reads
//! - Ignore lists for users and groups
//! - Memberships stored apart from user records
//! - Atomic store replacement on every write
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use idsync_connector_file::{FileDirectory, FileDirectoryConfig};
//! use idsync_core::prelude::*;
//!
//! let config = FileDirectoryConfig::new("directory.json")
//!     .with_id_attribute("userId")
//!     .with_group_attribute("groups");
//! let directory = FileDirectory::new(config)?;
//!
//! let orchestrator = SyncOrchestrator::new(Arc::new(directory), sync_config)?;
//! orchestrator.sync(&desired).await?;
//! ```

pub mod config;
pub mod directory;
pub mod filter;

// Re-exports
pub use config::FileDirectoryConfig;
pub use directory::FileDirectory;
pub use filter::{Filter, FilterError};
