//! Face placement check against the on-screen target oval.
//!
//! Containment is approximated by testing the four edge midpoints of the
//! face bounding box against the ellipse, then the box-to-ellipse area ratio
//! decides whether the user is too far or too close. This is guidance for
//! the user, not a geometric proof of containment.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::types::{FrameFeatures, Point};

/// Where the detected face sits relative to the target oval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaceInsideStatus {
    NoFace,
    OutsideOval,
    ComeClose,
    VeryClose,
    FaceUnstable,
    Valid,
}

/// Target oval in absolute frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OvalConfig {
    pub center_x: f32,
    pub center_y: f32,
    pub radius_x: f32,
    pub radius_y: f32,
    pub mirror_x: bool,
    pub fill_ratio_lower_bound: f32,
    pub fill_ratio_upper_bound: f32,
    /// Upper bound of the normalized ellipse equation; 1.0 is the exact edge.
    pub containment_slack: f32,
}

impl OvalConfig {
    pub fn area(&self) -> f32 {
        PI * self.radius_x * self.radius_y
    }

    fn contains(&self, p: Point) -> bool {
        let dx = (p.x - self.center_x) / self.radius_x;
        let dy = (p.y - self.center_y) / self.radius_y;
        dx * dx + dy * dy <= self.containment_slack
    }
}

/// Classify the face in `features` against `config`.
///
/// `frame_width` is needed to mirror x-coordinates when the preview is
/// flipped; `frame_height` is accepted for symmetry with callers that
/// resolve oval geometry per frame.
pub fn classify(
    features: &FrameFeatures,
    config: &OvalConfig,
    frame_width: u32,
    _frame_height: u32,
) -> FaceInsideStatus {
    if !features.detected {
        return FaceInsideStatus::NoFace;
    }

    let bbox = features.bbox;
    let inside = bbox.edge_midpoints().into_iter().all(|mut p| {
        if config.mirror_x {
            p.x = frame_width as f32 - p.x;
        }
        config.contains(p)
    });
    if !inside {
        return FaceInsideStatus::OutsideOval;
    }

    let fill_ratio = bbox.area() / config.area();
    if fill_ratio < config.fill_ratio_lower_bound {
        FaceInsideStatus::ComeClose
    } else if fill_ratio > config.fill_ratio_upper_bound {
        FaceInsideStatus::VeryClose
    } else {
        FaceInsideStatus::Valid
    }
}
