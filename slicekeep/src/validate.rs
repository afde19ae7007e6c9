//! Per-slice validation cascade
//!
//! Checks run in a fixed order: presence, schema version, age, decode.
//! The first disqualifying check wins, so a stale record is never decoded.

use crate::clock::duration_millis;
use crate::document::SliceRecord;
use crate::error::PersistError;
use crate::slice::SliceDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Result of validating one stored slice
#[derive(Debug, Clone, PartialEq)]
pub enum SliceOutcome {
    /// Decoded state, ready for hydration
    Valid(Value),
    /// No record under this slice name
    Missing,
    /// Written under another schema version
    Stale { stored: u32, expected: u32 },
    /// Older than the allowed age
    Expired { age_millis: u64, max_age_millis: u64 },
    /// Payload failed to decode
    Corrupt(PersistError),
}

impl SliceOutcome {
    pub fn kind(&self) -> SliceOutcomeKind {
        match self {
            Self::Valid(_) => SliceOutcomeKind::Valid,
            Self::Missing => SliceOutcomeKind::Missing,
            Self::Stale { .. } => SliceOutcomeKind::Stale,
            Self::Expired { .. } => SliceOutcomeKind::Expired,
            Self::Corrupt(_) => SliceOutcomeKind::Corrupt,
        }
    }
}

/// Payload-free tag of a [`SliceOutcome`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SliceOutcomeKind {
    Valid,
    Missing,
    Stale,
    Expired,
    Corrupt,
}

impl fmt::Display for SliceOutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Valid => "valid",
            Self::Missing => "missing",
            Self::Stale => "stale",
            Self::Expired => "expired",
            Self::Corrupt => "corrupt",
        };
        f.write_str(label)
    }
}

/// Inputs shared by every check
struct Candidate<'a> {
    descriptor: &'a SliceDescriptor,
    record: &'a SliceRecord,
    max_age: Option<Duration>,
    now: u64,
}

type Check = fn(&Candidate<'_>) -> Option<SliceOutcome>;

/// Disqualifying checks, in precedence order
const CHECKS: [Check; 2] = [check_version, check_age];

fn check_version(c: &Candidate<'_>) -> Option<SliceOutcome> {
    (c.record.version != c.descriptor.version).then(|| SliceOutcome::Stale {
        stored: c.record.version,
        expected: c.descriptor.version,
    })
}

fn check_age(c: &Candidate<'_>) -> Option<SliceOutcome> {
    let max_age_millis = duration_millis(c.max_age?);
    let age_millis = c.record.age_millis(c.now);

    (age_millis > max_age_millis).then_some(SliceOutcome::Expired {
        age_millis,
        max_age_millis,
    })
}

/// Returns true when a record is past its allowed age
pub(crate) fn is_expired(record: &SliceRecord, max_age: Option<Duration>, now: u64) -> bool {
    max_age.is_some_and(|max| record.age_millis(now) > duration_millis(max))
}

/// Validate one slice record against its descriptor
///
/// `max_age` is the effective expiry (descriptor override or item default).
pub fn evaluate(
    descriptor: &SliceDescriptor,
    record: Option<&SliceRecord>,
    max_age: Option<Duration>,
    now: u64,
) -> SliceOutcome {
    let Some(record) = record else {
        return SliceOutcome::Missing;
    };

    let candidate = Candidate {
        descriptor,
        record,
        max_age,
        now,
    };

    if let Some(outcome) = CHECKS.iter().find_map(|check| check(&candidate)) {
        return outcome;
    }

    match descriptor.decode(&record.payload) {
        Ok(value) => SliceOutcome::Valid(value),
        Err(e) => SliceOutcome::Corrupt(PersistError::Decode {
            slice: descriptor.name.clone(),
            reason: e.to_string(),
        }),
    }
}
