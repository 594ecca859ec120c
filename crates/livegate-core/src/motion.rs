//! Active liveness cues computed from the 68-point landmarks.
//!
//! Every detector here is owned by one session and carries state across
//! ticks; none of them is shared between sessions.

use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{Landmarks, Point};

/// Eye aspect ratio of a six-point eye contour `p1..p6`:
/// `(|p2-p6| + |p3-p5|) / (2·|p1-p4|)`.
pub fn eye_aspect_ratio(eye: &[Point]) -> f32 {
    let vertical = eye[1].distance(&eye[5]) + eye[2].distance(&eye[4]);
    let horizontal = eye[0].distance(&eye[3]);
    if horizontal <= f32::EPSILON {
        return 0.0;
    }
    vertical / (2.0 * horizontal)
}

/// Inner lip gap divided by mouth corner distance.
pub fn mouth_open_ratio(landmarks: &Landmarks) -> f32 {
    let mouth = landmarks.mouth();
    let width = mouth[0].distance(&mouth[6]);
    if width <= f32::EPSILON {
        return 0.0;
    }
    mouth[13].distance(&mouth[19]) / width
}

/// Counts frame-to-frame changes of the mean EAR.
///
/// This fires on any EAR movement of at least `min_delta`, not on an
/// open/closed threshold, so it is sensitive to general facial motion.
#[derive(Debug, Clone)]
pub struct BlinkDetector {
    min_delta: f32,
    changes_required: u32,
    previous: Option<f32>,
    changes: u32,
}

impl BlinkDetector {
    pub fn new(min_delta: f32, changes_required: u32) -> Self {
        Self {
            min_delta,
            changes_required,
            previous: None,
            changes: 0,
        }
    }

    /// Feed one frame. Returns true once more than `changes_required`
    /// changes have been seen since the last reset.
    pub fn observe(&mut self, landmarks: &Landmarks) -> bool {
        let left = eye_aspect_ratio(landmarks.left_eye());
        let right = eye_aspect_ratio(landmarks.right_eye());
        self.observe_ear((left + right) / 2.0)
    }

    pub fn observe_ear(&mut self, ear: f32) -> bool {
        let previous = self.previous.replace(ear);
        match previous {
            Some(prev) if (ear - prev).abs() >= self.min_delta => {
                self.changes += 1;
                self.changes > self.changes_required
            }
            _ => false,
        }
    }

    pub fn change_count(&self) -> u32 {
        self.changes
    }

    pub fn previous_metric(&self) -> Option<f32> {
        self.previous
    }

    pub fn reset_count(&mut self) {
        self.changes = 0;
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.changes = 0;
    }
}

/// Stateless threshold on [`mouth_open_ratio`].
#[derive(Debug, Clone, Copy)]
pub struct MouthOpenDetector {
    min_ratio: f32,
}

impl MouthOpenDetector {
    pub fn new(min_ratio: f32) -> Self {
        Self { min_ratio }
    }

    pub fn is_open(&self, landmarks: &Landmarks) -> bool {
        mouth_open_ratio(landmarks) > self.min_ratio
    }
}

/// Horizontal nose-tip travel between consecutive frames.
#[derive(Debug, Clone)]
pub struct HeadTurnDetector {
    min_travel_px: f32,
    previous_nose_x: Option<f32>,
}

impl HeadTurnDetector {
    pub fn new(min_travel_px: f32) -> Self {
        Self {
            min_travel_px,
            previous_nose_x: None,
        }
    }

    /// The first frame after a reset only records a baseline.
    pub fn observe(&mut self, landmarks: &Landmarks) -> bool {
        let nose_x = landmarks.nose_tip().x;
        match self.previous_nose_x.replace(nose_x) {
            Some(prev) => (nose_x - prev).abs() > self.min_travel_px,
            None => false,
        }
    }

    pub fn previous_nose_x(&self) -> Option<f32> {
        self.previous_nose_x
    }

    pub fn reset(&mut self) {
        self.previous_nose_x = None;
    }
}

/// Direction the user is asked to turn their face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeDirection {
    Left,
    Right,
}

impl ChallengeDirection {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.gen_bool(0.5) {
            Self::Left
        } else {
            Self::Right
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeCheck {
    /// No active challenge.
    Idle,
    Pending,
    Satisfied,
    /// The response window closed without a matching turn.
    Expired,
}

/// Randomized left/right turn with a response window.
///
/// The nose is compared against the midpoint of the outer eye corners in
/// raw frame coordinates. `Left` is met when the nose sits right of that
/// midpoint by more than the offset, `Right` when it sits left of it: the
/// labels follow what the user sees in the mirrored preview.
#[derive(Debug, Clone)]
pub struct ChallengeDetector {
    offset_px: f32,
    timeout: Duration,
    direction: Option<ChallengeDirection>,
    started_at: Option<Instant>,
}

impl ChallengeDetector {
    pub fn new(offset_px: f32, timeout: Duration) -> Self {
        Self {
            offset_px,
            timeout,
            direction: None,
            started_at: None,
        }
    }

    /// Start a new challenge, replacing any active one.
    pub fn begin<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) -> ChallengeDirection {
        let direction = ChallengeDirection::random(rng);
        self.begin_with(direction, now);
        direction
    }

    pub fn begin_with(&mut self, direction: ChallengeDirection, now: Instant) {
        self.direction = Some(direction);
        self.started_at = Some(now);
    }

    pub fn check(&self, landmarks: &Landmarks, now: Instant) -> ChallengeCheck {
        let (Some(direction), Some(started_at)) = (self.direction, self.started_at) else {
            return ChallengeCheck::Idle;
        };
        if now.saturating_duration_since(started_at) > self.timeout {
            return ChallengeCheck::Expired;
        }

        let (left_corner, right_corner) = landmarks.outer_eye_corners();
        let eye_centre_x = (left_corner.x + right_corner.x) / 2.0;
        let offset = landmarks.nose_tip().x - eye_centre_x;
        let met = match direction {
            ChallengeDirection::Left => offset > self.offset_px,
            ChallengeDirection::Right => -offset > self.offset_px,
        };
        if met {
            ChallengeCheck::Satisfied
        } else {
            ChallengeCheck::Pending
        }
    }

    pub fn direction(&self) -> Option<ChallengeDirection> {
        self.direction
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn clear(&mut self) {
        self.direction = None;
        self.started_at = None;
    }
}
