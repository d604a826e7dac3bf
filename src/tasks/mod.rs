//! Background Tasks Module
//!
//! Contains background tasks that run periodically for the lifetime of a cache.
//!
//! # Tasks
//! - Maintenance: purges expired entries, prunes access patterns and logs stats

mod maintenance;

pub use maintenance::{spawn_maintenance_task, Maintain, MaintenanceHandle};
