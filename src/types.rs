//! Core data types shared by the collector, proxy pool and upload poller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque continuation token returned by a list endpoint
///
/// The empty cursor means "start from the beginning".
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl Cursor {
    /// The cursor that requests the first page
    pub fn start() -> Self {
        Self(String::new())
    }

    /// Whether this is the starting cursor
    pub fn is_start(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Cursor {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Cursor {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One response from a list endpoint
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    /// Items in server order; may be empty even when `has_more` is true
    pub items: Vec<T>,
    /// Cursor for the next call; `None` ends the walk regardless of `has_more`
    pub next_cursor: Option<Cursor>,
    /// Whether the server claims more data exists
    pub has_more: bool,
}

impl<T> Page<T> {
    /// A page that continues at `next_cursor`
    pub fn more(items: Vec<T>, next_cursor: impl Into<Cursor>) -> Self {
        Self {
            items,
            next_cursor: Some(next_cursor.into()),
            has_more: true,
        }
    }

    /// A final page
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
            has_more: false,
        }
    }

    /// Whether a further fetch is both claimed and possible
    pub fn continues(&self) -> bool {
        self.has_more && self.next_cursor.is_some()
    }
}

/// Outcome of one collection request
///
/// Items keep discovery order. `truncated` is set when a bound stopped the walk while
/// more data was still available.
#[must_use]
#[derive(Clone, Debug, PartialEq)]
pub struct CollectionResult<T> {
    /// Collected items, in the order they were discovered
    pub items: Vec<T>,
    /// Whether more data existed when the walk stopped
    pub truncated: bool,
}

impl<T> CollectionResult<T> {
    /// Number of collected items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing was collected
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// An untrusted proxy address (e.g. `"1.2.3.4:8080"`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyCandidate {
    /// `host:port` of the proxy
    pub address: String,
}

impl ProxyCandidate {
    /// Create a candidate from an address
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

/// Result of one health check; discarded after selection
#[derive(Clone, Debug)]
pub struct ProxyHealth {
    /// The candidate that was checked
    pub candidate: ProxyCandidate,
    /// Whether the check succeeded within the timeout
    pub reachable: bool,
    /// When the check finished
    pub checked_at: DateTime<Utc>,
}

/// Identifier of a server-side import job
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable reference to a completed upload, usable in a later payload
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermanentHandle(pub String);

impl fmt::Display for PermanentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status reported by one poll of an import job
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    /// Still processing
    Pending,
    /// Finished; the handle can be referenced
    Uploaded {
        /// Handle to reference the uploaded file
        handle: PermanentHandle,
    },
    /// The server gave up on the job
    Failed {
        /// Reason supplied by the server
        reason: String,
    },
}

/// Lifecycle state of an [`UploadJob`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Not yet started
    Created,
    /// Started and not yet terminal
    Pending,
    /// Terminal: upload completed
    Uploaded,
    /// Terminal: server reported failure
    Failed,
    /// Terminal: poll bound reached
    TimedOut,
}

impl JobState {
    /// Whether no further transition can occur
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Uploaded | JobState::Failed | JobState::TimedOut
        )
    }
}

/// Progress record for one source being imported
///
/// Mutated only by the poller; dropped once the terminal state is returned.
#[derive(Clone, Debug)]
pub struct UploadJob {
    /// Assigned by a successful start call
    pub job_id: Option<JobId>,
    /// URL the destination imports from
    pub source_url: String,
    /// Current lifecycle state
    pub state: JobState,
    /// Status polls made so far
    pub attempts: u32,
    /// Most recent failure description
    pub last_error: Option<String>,
}

impl UploadJob {
    /// A job that has not been started
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            job_id: None,
            source_url: source_url.into(),
            state: JobState::Created,
            attempts: 0,
            last_error: None,
        }
    }
}
