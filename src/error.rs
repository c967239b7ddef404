//! Error types
//!
//! All library operations return [`Error`]. Each variant belongs to a
//! [`Severity`] class, which decides which error wins when several jobs
//! failed at once (see [`crate::executor::resolve_fatal`]).

use std::path::PathBuf;
use thiserror::Error;

use crate::models::Stage;

/// How actionable an error is for the person running the schedule
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Expected, user-facing errors, shown as they are
    User,
    /// Known errors of the engine and its collaborators
    Domain,
    /// Anything else - panics, raw I/O, foreign errors
    Unknown,
}

/// Schedule runner errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Soft(String),

    #[error("No tests were found, test schedule is empty")]
    EmptySchedule,

    #[error("Cannot run schedule entry {entry}, requires '{capability}'")]
    UnsupportedCapability { entry: String, capability: String },

    #[error("Schedule entry {entry} cannot move from {from} to {to}")]
    InvalidTransition { entry: String, from: Stage, to: Stage },

    #[error("Schedule entry {0} has no guest assigned")]
    NoGuest(String),

    #[error("Guest {guest}: {message}")]
    Guest { guest: String, message: String },

    #[error("Harness invocation failed: {0}")]
    Invocation(String),

    #[error("Harness exited with return code {exit_code}: {stderr}")]
    HarnessCrashed { exit_code: i32, stderr: String },

    #[error("Failed to gather results from {path}: {message}")]
    Results { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Fatal(String),

    #[error("Job '{job}' panicked: {reason}")]
    JobPanicked { job: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn soft(message: impl Into<String>) -> Self {
        Error::Soft(message.into())
    }

    pub fn guest(guest: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Guest {
            guest: guest.into(),
            message: message.into(),
        }
    }

    pub fn results(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Results {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Error::Soft(_) | Error::EmptySchedule => Severity::User,
            Error::JobPanicked { .. } | Error::Io(_) | Error::Other(_) => Severity::Unknown,
            _ => Severity::Domain,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
