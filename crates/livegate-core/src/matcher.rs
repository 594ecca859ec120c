//! Descriptor comparison and verdict aggregation.
//!
//! The thresholds are empirically tuned for 128-d face descriptors compared
//! by Euclidean distance. Recalibrating them for another model is a
//! deployment decision; the defaults stay literal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::FaceDescriptor;

#[derive(Error, Debug, PartialEq)]
pub enum MatchError {
    #[error("descriptor length mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
    #[error("empty descriptor")]
    EmptyDescriptor,
    #[error("no samples to compare")]
    NoSamples,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerifyStatus {
    Pass,
    /// Close enough to need a human look.
    Suspect,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleScore {
    pub distance: f32,
    pub similarity_percent: u8,
}

/// Result of a single-pair or multi-sample verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResult {
    /// Pair distance, or the smallest sample distance.
    pub distance: f32,
    pub similarity_percent: u8,
    pub status: VerifyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_sample: Option<Vec<SampleScore>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchThresholds {
    /// Single pair: below this is a pass.
    pub pass_distance: f32,
    /// Single pair: below this (and not a pass) is suspect.
    pub suspect_distance: f32,
    /// Distance at which similarity reaches 0%.
    pub similarity_scale: f32,
    /// Multi-sample: a sample below this counts toward `Suspect`.
    pub sample_pass_distance: f32,
    /// Multi-sample: every sample and the mean must be below this to pass.
    pub strict_distance: f32,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            pass_distance: 0.5,
            suspect_distance: 0.6,
            similarity_scale: 0.6,
            sample_pass_distance: 0.55,
            strict_distance: 0.51,
        }
    }
}

pub trait Matcher {
    fn verify(&self, a: &FaceDescriptor, b: &FaceDescriptor) -> Result<VerifyResult, MatchError>;

    fn verify_multiple(
        &self,
        reference: &FaceDescriptor,
        samples: &[FaceDescriptor],
    ) -> Result<VerifyResult, MatchError>;
}

pub fn euclidean_distance(a: &FaceDescriptor, b: &FaceDescriptor) -> Result<f32, MatchError> {
    if a.len() != b.len() {
        return Err(MatchError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.is_empty() {
        return Err(MatchError::EmptyDescriptor);
    }
    let sum: f32 = a
        .values
        .iter()
        .zip(&b.values)
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    Ok(sum.sqrt())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher {
    pub thresholds: MatchThresholds,
}

impl EuclideanMatcher {
    pub fn new(thresholds: MatchThresholds) -> Self {
        Self { thresholds }
    }

    /// `round(max(0, 1 - distance / scale) · 100)`
    pub fn similarity_percent(&self, distance: f32) -> u8 {
        let similarity = (1.0 - distance / self.thresholds.similarity_scale).max(0.0) * 100.0;
        similarity.round().min(100.0) as u8
    }

    pub fn classify_pair(&self, distance: f32) -> VerifyStatus {
        if distance < self.thresholds.pass_distance {
            VerifyStatus::Pass
        } else if distance < self.thresholds.suspect_distance {
            VerifyStatus::Suspect
        } else {
            VerifyStatus::Fail
        }
    }

    /// Aggregate per-sample distances into one verdict.
    pub fn evaluate_distances(&self, distances: &[f32]) -> Result<VerifyResult, MatchError> {
        if distances.is_empty() {
            return Err(MatchError::NoSamples);
        }

        let t = &self.thresholds;
        let pass_count = distances
            .iter()
            .filter(|&&d| d < t.sample_pass_distance)
            .count();
        let all_strict = distances.iter().all(|&d| d < t.strict_distance);
        let mean = distances.iter().sum::<f32>() / distances.len() as f32;
        let min = distances.iter().copied().fold(f32::INFINITY, f32::min);

        let status = if all_strict && mean < t.strict_distance {
            VerifyStatus::Pass
        } else if pass_count >= 1 {
            VerifyStatus::Suspect
        } else {
            VerifyStatus::Fail
        };

        tracing::debug!(
            samples = distances.len(),
            pass_count,
            mean_distance = mean,
            min_distance = min,
            ?status,
            "multi-sample verdict"
        );

        Ok(VerifyResult {
            distance: min,
            similarity_percent: self.similarity_percent(mean),
            status,
            per_sample: Some(
                distances
                    .iter()
                    .map(|&distance| SampleScore {
                        distance,
                        similarity_percent: self.similarity_percent(distance),
                    })
                    .collect(),
            ),
        })
    }
}

impl Matcher for EuclideanMatcher {
    fn verify(&self, a: &FaceDescriptor, b: &FaceDescriptor) -> Result<VerifyResult, MatchError> {
        let distance = euclidean_distance(a, b)?;
        Ok(VerifyResult {
            distance,
            similarity_percent: self.similarity_percent(distance),
            status: self.classify_pair(distance),
            per_sample: None,
        })
    }

    fn verify_multiple(
        &self,
        reference: &FaceDescriptor,
        samples: &[FaceDescriptor],
    ) -> Result<VerifyResult, MatchError> {
        let distances = samples
            .iter()
            .map(|sample| euclidean_distance(reference, sample))
            .collect::<Result<Vec<_>, _>>()?;
        self.evaluate_distances(&distances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIM: usize = 128;

    /// Descriptor at exactly `distance` from the origin descriptor.
    fn at_distance(distance: f32) -> FaceDescriptor {
        let mut values = vec![0.0; DIM];
        values[0] = distance;
        FaceDescriptor::new(values)
    }

    fn origin() -> FaceDescriptor {
        FaceDescriptor::new(vec![0.0; DIM])
    }

    #[test]
    fn test_distance_known_geometry() {
        let a = FaceDescriptor::new(vec![0.0, 0.0]);
        let b = FaceDescriptor::new(vec![0.3, 0.4]);
        assert!((euclidean_distance(&a, &b).unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_distance_rejects_mismatch() {
        let err = euclidean_distance(&origin(), &FaceDescriptor::new(vec![0.0; 3])).unwrap_err();
        assert_eq!(err, MatchError::DimensionMismatch { left: 128, right: 3 });
        let empty = FaceDescriptor::new(Vec::new());
        assert_eq!(
            euclidean_distance(&empty, &empty).unwrap_err(),
            MatchError::EmptyDescriptor
        );
    }

    #[test]
    fn test_single_pair_verdicts() {
        let matcher = EuclideanMatcher::default();
        let pass = matcher.verify(&origin(), &at_distance(0.45)).unwrap();
        assert_eq!(pass.status, VerifyStatus::Pass);
        assert_eq!(pass.similarity_percent, 25);
        assert!(pass.per_sample.is_none());

        let suspect = matcher.verify(&origin(), &at_distance(0.55)).unwrap();
        assert_eq!(suspect.status, VerifyStatus::Suspect);

        let fail = matcher.verify(&origin(), &at_distance(0.70)).unwrap();
        assert_eq!(fail.status, VerifyStatus::Fail);
        assert_eq!(fail.similarity_percent, 0);
    }

    #[test]
    fn test_pair_boundaries() {
        let matcher = EuclideanMatcher::default();
        assert_eq!(matcher.classify_pair(0.5), VerifyStatus::Suspect);
        assert_eq!(matcher.classify_pair(0.6), VerifyStatus::Fail);
    }

    #[test]
    fn test_similarity_scale() {
        let matcher = EuclideanMatcher::default();
        assert_eq!(matcher.similarity_percent(0.0), 100);
        assert_eq!(matcher.similarity_percent(0.3), 50);
        assert_eq!(matcher.similarity_percent(0.6), 0);
        assert_eq!(matcher.similarity_percent(1.5), 0);
    }

    #[test]
    fn test_multi_sample_pass() {
        let matcher = EuclideanMatcher::default();
        let result = matcher.evaluate_distances(&[0.30, 0.35, 0.40]).unwrap();
        assert_eq!(result.status, VerifyStatus::Pass);
        assert!((result.distance - 0.30).abs() < 1e-6);
        // mean 0.35 -> 41.67%
        assert_eq!(result.similarity_percent, 42);
        let detail = result.per_sample.unwrap();
        assert_eq!(detail.len(), 3);
        assert_eq!(detail[0].similarity_percent, 50);
    }

    #[test]
    fn test_multi_sample_suspect() {
        let matcher = EuclideanMatcher::default();
        let result = matcher.evaluate_distances(&[0.30, 0.60, 0.70]).unwrap();
        assert_eq!(result.status, VerifyStatus::Suspect);
        assert!((result.distance - 0.30).abs() < 1e-6);
    }

    #[test]
    fn test_multi_sample_fail() {
        let matcher = EuclideanMatcher::default();
        let result = matcher.evaluate_distances(&[0.70, 0.80, 0.90]).unwrap();
        assert_eq!(result.status, VerifyStatus::Fail);
        assert_eq!(result.similarity_percent, 0);
    }

    #[test]
    fn test_multi_sample_needs_every_sample_strict() {
        // All below 0.55 and the mean below 0.51, but one sample is not.
        let matcher = EuclideanMatcher::default();
        let result = matcher.evaluate_distances(&[0.40, 0.40, 0.53]).unwrap();
        assert_eq!(result.status, VerifyStatus::Suspect);
    }

    #[test]
    fn test_multi_sample_needs_strict_mean() {
        let matcher = EuclideanMatcher::default();
        let result = matcher.evaluate_distances(&[0.505, 0.509]).unwrap();
        assert_eq!(result.status, VerifyStatus::Pass);
        let result = matcher.evaluate_distances(&[0.509, 0.511]).unwrap();
        assert_eq!(result.status, VerifyStatus::Suspect);
    }

    #[test]
    fn test_verify_multiple_from_descriptors() {
        let matcher = EuclideanMatcher::default();
        let samples = [at_distance(0.30), at_distance(0.35), at_distance(0.40)];
        let result = matcher.verify_multiple(&origin(), &samples).unwrap();
        assert_eq!(result.status, VerifyStatus::Pass);
    }

    #[test]
    fn test_verify_multiple_requires_samples() {
        let matcher = EuclideanMatcher::default();
        assert_eq!(
            matcher.verify_multiple(&origin(), &[]).unwrap_err(),
            MatchError::NoSamples
        );
    }

    #[test]
    fn test_result_serializes_status() {
        let matcher = EuclideanMatcher::default();
        let result = matcher.verify(&origin(), &at_distance(0.55)).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "SUSPECT");
        assert!(json.get("per_sample").is_none());
    }
}
