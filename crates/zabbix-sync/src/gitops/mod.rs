//! Git-backed snapshot store for the cache directory.
//!
//! The working tree holds one file per synchronized asset. Its status
//! against the index is what the reconciler uses as a diff between the
//! live Zabbix state and the committed desired state.

pub mod error;
pub mod git;

pub use error::{GitOpsError, Result};
pub use git::types::*;
pub use git::GitRepository;
