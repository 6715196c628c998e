//! Admission outcome messages carried over the outcome channel.
//!
//! An [`AdmissionOutcome`] is produced exactly once per admission attempt at
//! the synchronous boundary and consumed one or more times (at-least-once)
//! downstream. Messages are serialized with `bincode` on the wire for
//! compact, fast encoding.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The synchronous admission decision for a single claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// The claim fit within remaining stock.
    Granted,
    /// The stock was already exhausted.
    Rejected,
}

impl Decision {
    /// Stable string form, used in logs and metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "GRANTED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The asynchronous record of an admission decision.
///
/// Carries the verified identity, the decision taken at the synchronous
/// boundary, and the processing attempt counter used by the consumer's
/// explicit retry mechanism. Attempt `0` is the first delivery; each
/// republication after a processing fault increments it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionOutcome {
    /// Verified identity of the requester (unique key downstream).
    pub identity: String,
    /// Decision taken against the stock counter.
    pub decision: Decision,
    /// Processing attempt number (0-based).
    pub attempt: u32,
}

impl AdmissionOutcome {
    /// Create a first-attempt outcome message.
    pub fn new(identity: impl Into<String>, decision: Decision) -> Self {
        Self {
            identity: identity.into(),
            decision,
            attempt: 0,
        }
    }

    /// Clone this message with the attempt counter advanced, for
    /// republication after a processing fault.
    #[must_use]
    pub fn next_attempt(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            decision: self.decision,
            attempt: self.attempt + 1,
        }
    }
}
