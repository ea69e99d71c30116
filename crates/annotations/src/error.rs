//! Annotation errors

use thiserror::Error;

/// Errors that can occur when reading or writing network annotations
///
/// `NotPresent` is an expected condition (nothing configured yet) and is kept
/// apart from the two content errors so callers can branch on it without
/// logging it as a failure.
#[derive(Debug, Error)]
pub enum AnnotationError {
    /// The annotation key is not set on the object
    #[error("Annotation not present: {0}")]
    NotPresent(String),

    /// The annotation is in our format but its content is invalid or self-contradictory
    #[error("Invalid annotation data: {0}")]
    InvalidConfig(String),

    /// The annotation value could not be parsed at all
    #[error("Malformed annotation {key}: {source}")]
    MalformedWireFormat {
        /// Annotation key holding the bad value
        key: String,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// No address could be found for the pod from any source
    #[error("pod {namespace}/{name}: no pod IPs found")]
    NoPodIpFound {
        /// Pod namespace
        namespace: String,
        /// Pod name
        name: String,
    },
}

impl AnnotationError {
    /// Returns true for the expected-absent case
    #[must_use]
    pub fn is_not_present(&self) -> bool {
        matches!(self, AnnotationError::NotPresent(_))
    }
}
