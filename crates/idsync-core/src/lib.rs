//! # idsync core
//!
//! Provider-agnostic reconciliation of user populations between a source of
//! truth and a target identity system.
//!
//! ## Architecture
//!
//! ```text
//!  desired (canonical) ─────────────────────────┐
//!                                               ▼
//!  adapter ──► native ──► AttributeMapper ──► ReconciliationEngine ──► DiffResult
//!     ▲                   + MembershipOverlay                              │
//!     │                                                                    ▼
//!     └──── create / update / delete ◄──── AttributeMapper (reverse) ◄─────┘
//! ```
//!
//! - [`mapping`] - Field mapping table and the bidirectional attribute mapper
//! - [`membership`] - Group membership overlay on canonical records
//! - [`reconcile`] - Three-way population diff keyed by an identity attribute
//! - [`adapter`] - The capability set every provider adapter implements
//! - [`orchestrator`] - The generic sync control loop
//! - [`config`] - Per-target sync configuration
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use idsync_core::prelude::*;
//!
//! let config: SyncConfig = serde_yaml::from_str(yaml)?;
//! let orchestrator = SyncOrchestrator::new(Arc::new(adapter), config)?;
//!
//! let plan = orchestrator.plan(&desired).await?;
//! println!("{} to add, {} to update, {} to remove",
//!     plan.diff.to_add.len(), plan.diff.to_update.len(), plan.diff.to_remove.len());
//!
//! let report = orchestrator.apply(&plan).await?;
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod ignore;
pub mod mapping;
pub mod membership;
pub mod orchestrator;
pub mod reconcile;
pub mod record;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::adapter::{ListOptions, ProviderAdapter};
    pub use crate::config::SyncConfig;
    pub use crate::error::{AdapterError, AdapterResult, ConfigError, SyncError, SyncResult};
    pub use crate::ignore::IgnoreRules;
    pub use crate::mapping::{AttributeMapper, FieldMapping, MappingError, MappingResult};
    pub use crate::membership::MembershipOverlay;
    pub use crate::orchestrator::{
        ApplyPolicy, ApplySummary, ItemFailure, SyncOrchestrator, SyncPhase, SyncPlan, SyncReport,
    };
    pub use crate::reconcile::{
        diff, DiffResult, DuplicateKeyPolicy, ReconcileError, ReconciliationEngine,
    };
    pub use crate::record::{AttributeValue, CanonicalRecord, NativeRecord};
}

// Re-export async_trait for adapter implementors
pub use async_trait::async_trait;
