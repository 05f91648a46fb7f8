//! Attaches a line hash to the result it was computed for.

use serde_json::{Map, Value};

use crate::models::sarif::{is_truthy, SarifLocation, PRIMARY_LOCATION_LINE_HASH};

/// What applying a line hash did to a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    /// Hash is for a different line.
    Ignored,
    /// Fingerprint was missing and has been recorded.
    Recorded,
    /// Result already carried this exact fingerprint.
    Unchanged,
    /// Result carries a different fingerprint, which is kept.
    Conflict { existing: String },
    /// `partialFingerprints` is not an object, so nothing can be recorded.
    Unwritable,
}

/// Waits for the hash of one result's primary line.
///
/// Identifies its result by position in the document so the driver can keep
/// exclusive ownership of the results while files are hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultAnnotator {
    pub run_index: usize,
    pub result_index: usize,
    /// Line whose hash becomes the fingerprint.
    pub target_line: i64,
    /// URI as written in the document, for log messages.
    pub uri: String,
}

impl ResultAnnotator {
    /// Build an annotator for `location`, the result's primary location.
    ///
    /// A location without a region refers to the whole file and uses line 1.
    pub fn new(run_index: usize, result_index: usize, location: SarifLocation<'_>) -> Self {
        Self {
            run_index,
            result_index,
            target_line: location.start_line().unwrap_or(1),
            uri: location
                .artifact_location()
                .map(|a| a.describe())
                .unwrap_or_default(),
        }
    }

    /// Apply the hash of `line` to `result`. Never overwrites an existing
    /// fingerprint; a mismatch is logged and reported as a conflict.
    ///
    /// A missing, `null` or empty fingerprint counts as absent.
    pub fn apply(&self, result: &mut Map<String, Value>, line: usize, token: &str) -> Annotation {
        if i64::try_from(line).ok() != Some(self.target_line) {
            return Annotation::Ignored;
        }

        let fingerprints = result
            .entry("partialFingerprints")
            .or_insert(Value::Null);
        if fingerprints.is_null() {
            *fingerprints = Value::Object(Map::new());
        }
        let Some(fingerprints) = fingerprints.as_object_mut() else {
            tracing::debug!(
                file = %self.uri,
                line,
                "Unable to record fingerprint: partialFingerprints is not an object"
            );
            return Annotation::Unwritable;
        };

        if let Some(existing) = fingerprints
            .get(PRIMARY_LOCATION_LINE_HASH)
            .filter(|value| is_truthy(value))
        {
            if existing.as_str() == Some(token) {
                return Annotation::Unchanged;
            }
            let existing = match existing {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            tracing::warn!(
                file = %self.uri,
                line,
                computed = token,
                existing = %existing,
                "Calculated fingerprint differs from existing fingerprint; keeping existing value"
            );
            return Annotation::Conflict { existing };
        }

        fingerprints.insert(
            PRIMARY_LOCATION_LINE_HASH.to_string(),
            Value::String(token.to_string()),
        );
        Annotation::Recorded
    }
}
