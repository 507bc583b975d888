//! Face descriptors for volunteer check-in
//!
//! Descriptors come from the browser-side face model as a fixed-length float
//! vector. Two descriptors belong to the same person when their Euclidean
//! distance is below [`FACE_MATCH_THRESHOLD`].

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Distance below which two descriptors are considered the same face
pub const FACE_MATCH_THRESHOLD: f32 = 0.6;

/// Upper bound on descriptor length accepted from clients
const MAX_DESCRIPTOR_LEN: usize = 512;

/// Validated face descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceDescriptor(Vec<f32>);

impl FaceDescriptor {
    pub fn new(values: Vec<f32>) -> Result<Self, ValidationError> {
        if values.is_empty() {
            return Err(ValidationError::Empty {
                field: "face_descriptor",
            });
        }
        if values.len() > MAX_DESCRIPTOR_LEN {
            return Err(ValidationError::TooLong {
                field: "face_descriptor",
                max: MAX_DESCRIPTOR_LEN,
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ValidationError::InvalidFormat {
                field: "face_descriptor",
                reason: "values must be finite numbers",
            });
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// Euclidean distance to a stored descriptor, `None` when the lengths
    /// differ (descriptor produced by a different model).
    pub fn distance(&self, other: &[f32]) -> Option<f32> {
        if self.0.len() != other.len() {
            return None;
        }
        let sum: f32 = self
            .0
            .iter()
            .zip(other)
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        Some(sum.sqrt())
    }

    /// Linear scan for the closest candidate under the match threshold.
    pub fn best_match<'a, K>(
        &self,
        candidates: impl IntoIterator<Item = (K, &'a [f32])>,
    ) -> Option<(K, f32)> {
        candidates
            .into_iter()
            .filter_map(|(key, stored)| self.distance(stored).map(|d| (key, d)))
            .filter(|(_, d)| *d < FACE_MATCH_THRESHOLD)
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}
