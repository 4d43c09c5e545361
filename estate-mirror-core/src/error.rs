//! Error types for estate-mirror-core

use std::path::PathBuf;
use thiserror::Error;

use crate::contract::NamespaceTriple;
use crate::git::GitError;

/// Listing the source namespace failed. Always fatal for a run: an incomplete
/// view of the estate would silently skip repositories.
#[derive(Error, Debug)]
pub enum EnumerationError {
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Unable to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Errors talking to the destination host API.
#[derive(Error, Debug)]
pub enum DestinationError {
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
}

#[derive(Error, Debug)]
pub enum MirrorStoreError {
    #[error("{component:?} is not a valid path component for a mirror")]
    InvalidComponent { component: String },

    #[error("Unable to create {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to read {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum FailureLogError {
    #[error("Unable to open failure log {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to write to failure log: {0}")]
    Write(#[from] std::io::Error),
}

/// Why a single pull or push job did not complete. Never crosses the job
/// boundary: the scheduler turns it into a failed [`crate::scheduler::JobOutcome`].
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    MirrorStore(#[from] MirrorStoreError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("Destination rejected {name}: {status} {body}")]
    CreateRejected {
        name: String,
        status: u16,
        body: String,
    },

    #[error(transparent)]
    Destination(#[from] DestinationError),

    #[error("Invalid remote URL {url}: {reason}")]
    InvalidRemote { url: String, reason: String },

    #[error("No local mirror for {0}; pull it before pushing")]
    MissingMirror(NamespaceTriple),

    #[error("Destination name {name:?} is shared by {} repositories", triples.len())]
    NameCollision {
        name: String,
        triples: Vec<NamespaceTriple>,
    },

    #[error("Job exceeded its {0:?} time limit")]
    TimedOut(std::time::Duration),

    #[error("Job panicked: {0}")]
    Panicked(String),

    #[error("Worker pool shut down before the job could start")]
    PoolClosed,
}

/// Fatal errors for a whole synchronisation run.
#[derive(Error, Debug)]
pub enum SynchroniseError {
    #[error("Namespace enumeration failed: {0}")]
    Enumeration(#[from] EnumerationError),

    #[error("Unable to list local mirrors: {0}")]
    MirrorStore(#[from] MirrorStoreError),
}
