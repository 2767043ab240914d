//! routefs - a tier-routing passthrough filesystem core.
//!
//! One logical namespace is routed across several backing stores: filename
//! suffixes pick the default store, two persistent object maps track where
//! the hot and cold copies of every object live, and a background
//! post-processor migrates objects between tiers from access statistics.
//! The kernel bridge is an external collaborator that drives the
//! [`vfs::Vfs`] operation vtable.

pub mod config;
pub mod control;
pub mod error;
mod fs;
pub mod index;
pub mod objmap;
mod paths;
mod ppd;
pub mod postprocess;
pub mod rootmap;
pub mod stats;
pub mod store;
pub mod vfs;

pub use crate::config::Config;
pub use crate::error::{map_io_error, FsError, FsResult};
pub use crate::fs::RouteFs;
pub use crate::vfs::Vfs;
