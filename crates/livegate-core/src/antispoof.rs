//! Spoof evidence gathered from landmark motion.
//!
//! A printed photo or a still on a screen produces near-identical landmark
//! positions from frame to frame, while a live face drifts. The session keeps
//! a short window of recent landmark samples and reports how much the eyes
//! and nose moved across it.
//!
//! Only the evidence is collected here. No verdict is derived from it and
//! nothing moves a session into `SpoofDetected` automatically; a host that
//! has its own classifier marks the session itself.

use std::collections::VecDeque;

use serde::Serialize;

use crate::types::{Landmarks, Point};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    left_eye: Point,
    right_eye: Point,
    nose_x: f32,
}

/// Motion statistics over the buffered samples.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MotionStats {
    /// Mean Euclidean displacement of the eye centres across consecutive pairs.
    pub mean_eye_displacement: f32,
    /// Number of consecutive sample pairs analysed.
    pub frame_pairs_analysed: usize,
    /// Population variance of the nose-tip x coordinate.
    pub nose_x_variance: f32,
}

/// Bounded FIFO of recent landmark samples.
#[derive(Debug, Clone)]
pub struct SpoofEvidence {
    capacity: usize,
    samples: VecDeque<Sample>,
}

impl SpoofEvidence {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, landmarks: &Landmarks) {
        let (left_eye, right_eye) = landmarks.eye_centres();
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample {
            left_eye,
            right_eye,
            nose_x: landmarks.nose_tip().x,
        });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Statistics over the current window. All zero with fewer than two
    /// samples.
    pub fn motion_stats(&self) -> MotionStats {
        if self.samples.len() < 2 {
            return MotionStats::default();
        }

        let mut total_displacement = 0.0f32;
        let mut pair_count = 0usize;
        for (prev, curr) in self.samples.iter().zip(self.samples.iter().skip(1)) {
            let left = prev.left_eye.distance(&curr.left_eye);
            let right = prev.right_eye.distance(&curr.right_eye);
            total_displacement += (left + right) / 2.0;
            pair_count += 1;
        }

        let n = self.samples.len() as f32;
        let mean_x = self.samples.iter().map(|s| s.nose_x).sum::<f32>() / n;
        let nose_x_variance = self
            .samples
            .iter()
            .map(|s| (s.nose_x - mean_x).powi(2))
            .sum::<f32>()
            / n;

        MotionStats {
            mean_eye_displacement: total_displacement / pair_count as f32,
            frame_pairs_analysed: pair_count,
            nose_x_variance,
        }
    }
}
