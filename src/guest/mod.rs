//! Guests - remote machines the tests run on
//!
//! A guest is owned by exactly one schedule entry for the entry's whole
//! lifetime. Provisioning and disposal happen outside of this crate.

mod ssh;

pub use ssh::{SshConfig, SshGuest};

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Output of a command executed on a guest
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn lines(&self) -> Vec<&str> {
        self.stdout.lines().collect()
    }
}

/// Handle of a guest snapshot
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SnapshotRef {
    pub name: String,
}

impl SnapshotRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for SnapshotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A remote execution target
#[async_trait]
pub trait Guest: Send + Sync {
    fn name(&self) -> &str;

    /// Address harnesses use to reach the guest
    fn hostname(&self) -> &str;

    fn port(&self) -> u16 {
        22
    }

    fn user(&self) -> &str {
        "root"
    }

    /// Run a command on the guest
    async fn execute(&self, command: &str) -> Result<CommandOutput>;

    fn supports_snapshots(&self) -> bool {
        false
    }

    async fn create_snapshot(&self) -> Result<SnapshotRef> {
        Err(Error::guest(self.name(), "snapshots are not supported"))
    }

    /// Restore a snapshot, returning the guest to use from now on
    async fn restore_snapshot(&self, snapshot: &SnapshotRef) -> Result<Arc<dyn Guest>> {
        Err(Error::guest(
            self.name(),
            format!("cannot restore snapshot '{snapshot}', snapshots are not supported"),
        ))
    }

    /// Store a snapshot locally for post-mortem inspection
    async fn export_snapshot(&self, snapshot: &SnapshotRef) -> Result<PathBuf> {
        Err(Error::guest(
            self.name(),
            format!("cannot export snapshot '{snapshot}'"),
        ))
    }
}

impl fmt::Debug for dyn Guest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guest({})", self.name())
    }
}
