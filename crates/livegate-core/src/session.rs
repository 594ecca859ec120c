//! Liveness session state machine.
//!
//! A session walks the user through
//! `Start → [Challenge] → Blink → [Mouth] → Head → Hold → Done`, one tick per
//! processed frame. Each tick first recomputes where the face sits relative to
//! the target oval; step logic only runs while that status is `Valid`.
//!
//! Forward step changes are deferred by a short delay (see [`Deferred`]) so
//! the host can keep rendering the previous hint. Losing the face for longer
//! than the miss threshold schedules a return to `Start`. `SpoofDetected` and
//! `MatchFailed` are set from outside the tick loop and freeze the session
//! until [`LivenessSession::reset`].

use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::antispoof::{MotionStats, SpoofEvidence};
use crate::config::LivenessConfig;
use crate::deferred::Deferred;
use crate::motion::{
    BlinkDetector, ChallengeCheck, ChallengeDetector, ChallengeDirection, HeadTurnDetector,
    MouthOpenDetector,
};
use crate::oval::{self, FaceInsideStatus, OvalConfig};
use crate::types::FrameFeatures;

/// Session progress, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LivenessStep {
    Start,
    Challenge,
    Blink,
    Mouth,
    Head,
    Hold,
    Done,
    SpoofDetected,
    MatchFailed,
}

impl LivenessStep {
    /// No tick changes a session in a terminal step.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::SpoofDetected | Self::MatchFailed)
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Self::SpoofDetected | Self::MatchFailed)
    }
}

/// What the host should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TickOutcome {
    pub capture_requested: bool,
    /// Drop previously captured frames before storing this capture.
    pub reset_capture_buffer: bool,
    pub session_done: bool,
}

impl TickOutcome {
    fn capture() -> Self {
        Self {
            capture_requested: true,
            ..Self::default()
        }
    }
}

/// A still captured at a step boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedFrame {
    #[serde(skip)]
    pub jpeg: Vec<u8>,
    pub step: LivenessStep,
    pub captured_at: DateTime<Utc>,
}

impl CapturedFrame {
    pub fn new(jpeg: Vec<u8>, step: LivenessStep) -> Self {
        Self {
            jpeg,
            step,
            captured_at: Utc::now(),
        }
    }
}

/// Read-only view of a session for the host UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub step: LivenessStep,
    pub face_status: FaceInsideStatus,
    pub challenge: Option<ChallengeDirection>,
    pub miss_count: u32,
    pub captured: usize,
}

pub struct LivenessSession {
    config: LivenessConfig,
    oval: OvalConfig,
    frame_width: u32,
    frame_height: u32,

    step: LivenessStep,
    face_status: FaceInsideStatus,
    miss_count: u32,
    hold_started_at: Option<Instant>,
    pending: Deferred<LivenessStep>,

    challenge: ChallengeDetector,
    blink: BlinkDetector,
    mouth: MouthOpenDetector,
    head: HeadTurnDetector,
    evidence: SpoofEvidence,

    captured: Vec<CapturedFrame>,
    rng: StdRng,
}

impl LivenessSession {
    pub fn new(config: LivenessConfig, frame_width: u32, frame_height: u32) -> Self {
        Self::with_rng(config, frame_width, frame_height, StdRng::from_entropy())
    }

    /// Build a session with a caller-supplied challenge RNG.
    pub fn with_rng(
        config: LivenessConfig,
        frame_width: u32,
        frame_height: u32,
        rng: StdRng,
    ) -> Self {
        let oval = config.oval.resolve(frame_width, frame_height);
        Self {
            oval,
            frame_width,
            frame_height,
            step: LivenessStep::Start,
            face_status: FaceInsideStatus::OutsideOval,
            miss_count: 0,
            hold_started_at: None,
            pending: Deferred::new(),
            challenge: ChallengeDetector::new(
                config.challenge_offset_px,
                config.challenge_timeout(),
            ),
            blink: BlinkDetector::new(config.ear_delta, config.blink_changes_required),
            mouth: MouthOpenDetector::new(config.mouth_open_ratio),
            head: HeadTurnDetector::new(config.head_turn_px),
            evidence: SpoofEvidence::new(config.spoof_buffer_len),
            captured: Vec::new(),
            rng,
            config,
        }
    }

    /// Process one frame's detection result.
    pub fn tick(&mut self, features: &FrameFeatures, now: Instant) -> TickOutcome {
        if self.step.is_terminal() {
            return TickOutcome::default();
        }
        self.poll(now);

        if !features.detected {
            self.on_missed_face(now);
            return TickOutcome::default();
        }
        self.miss_count = 0;

        self.face_status = oval::classify(features, &self.oval, self.frame_width, self.frame_height);
        if self.face_status != FaceInsideStatus::Valid {
            self.interrupt_hold();
            return TickOutcome::default();
        }

        if let Some(landmarks) = &features.landmarks {
            self.evidence.push(landmarks);
        }

        // Keep the pre-transition hint on screen until the change lands.
        if self.pending.is_pending() {
            return TickOutcome::default();
        }

        self.run_step(features, now)
    }

    /// Apply a deferred step change if it is due. Returns the new step.
    pub fn poll(&mut self, now: Instant) -> Option<LivenessStep> {
        let next = self.pending.take_due(now)?;
        self.enter(next);
        Some(next)
    }

    fn run_step(&mut self, features: &FrameFeatures, now: Instant) -> TickOutcome {
        let landmarks = features.landmarks.as_ref();
        match self.step {
            LivenessStep::Start => {
                self.reset_detectors();
                let next = if self.config.challenge_step {
                    let direction = self.challenge.begin(now, &mut self.rng);
                    tracing::debug!(?direction, "challenge issued");
                    LivenessStep::Challenge
                } else {
                    LivenessStep::Blink
                };
                self.schedule(next, now);
                TickOutcome {
                    capture_requested: true,
                    reset_capture_buffer: true,
                    session_done: false,
                }
            }
            LivenessStep::Challenge => {
                let Some(landmarks) = landmarks else {
                    return TickOutcome::default();
                };
                match self.challenge.check(landmarks, now) {
                    ChallengeCheck::Satisfied => {
                        self.challenge.clear();
                        self.schedule(LivenessStep::Blink, now);
                        TickOutcome::capture()
                    }
                    ChallengeCheck::Expired => {
                        let direction = self.challenge.begin(now, &mut self.rng);
                        tracing::warn!(?direction, "challenge expired, issuing a new one");
                        TickOutcome::default()
                    }
                    ChallengeCheck::Pending | ChallengeCheck::Idle => TickOutcome::default(),
                }
            }
            LivenessStep::Blink => {
                let Some(landmarks) = landmarks else {
                    return TickOutcome::default();
                };
                if !self.blink.observe(landmarks) {
                    return TickOutcome::default();
                }
                self.blink.reset_count();
                let next = if self.config.mouth_step {
                    LivenessStep::Mouth
                } else {
                    LivenessStep::Head
                };
                self.schedule(next, now);
                TickOutcome::capture()
            }
            LivenessStep::Mouth => match landmarks {
                Some(landmarks) if self.mouth.is_open(landmarks) => {
                    self.schedule(LivenessStep::Head, now);
                    TickOutcome::capture()
                }
                _ => TickOutcome::default(),
            },
            LivenessStep::Head => {
                let Some(landmarks) = landmarks else {
                    return TickOutcome::default();
                };
                if !self.head.observe(landmarks) {
                    return TickOutcome::default();
                }
                self.schedule(LivenessStep::Hold, now);
                self.hold_started_at = Some(now);
                TickOutcome::capture()
            }
            LivenessStep::Hold => {
                let started = *self.hold_started_at.get_or_insert(now);
                if now.saturating_duration_since(started) < self.config.hold_duration() {
                    return TickOutcome::default();
                }
                self.step = LivenessStep::Done;
                tracing::info!("liveness sequence complete");
                TickOutcome {
                    capture_requested: true,
                    reset_capture_buffer: false,
                    session_done: true,
                }
            }
            LivenessStep::Done | LivenessStep::SpoofDetected | LivenessStep::MatchFailed => {
                TickOutcome::default()
            }
        }
    }

    fn on_missed_face(&mut self, now: Instant) {
        self.miss_count = self.miss_count.saturating_add(1);
        self.interrupt_hold();

        if self.miss_count <= self.config.miss_threshold {
            self.face_status = FaceInsideStatus::NoFace;
            return;
        }

        self.face_status = FaceInsideStatus::FaceUnstable;
        let mid_sequence = self.step != LivenessStep::Start || self.pending.is_pending();
        let reset_pending = self.pending.peek() == Some(&LivenessStep::Start);
        if mid_sequence && !reset_pending {
            tracing::warn!(
                step = ?self.step,
                misses = self.miss_count,
                "face lost, restarting sequence"
            );
            self.challenge.clear();
            self.schedule(LivenessStep::Start, now);
        }
    }

    fn interrupt_hold(&mut self) {
        let holding = self.step == LivenessStep::Hold
            || self.pending.peek() == Some(&LivenessStep::Hold);
        if holding {
            self.hold_started_at = None;
        }
    }

    fn schedule(&mut self, next: LivenessStep, now: Instant) {
        tracing::debug!(from = ?self.step, to = ?next, "step change scheduled");
        self.pending.schedule(next, now, self.config.transition_delay());
    }

    fn enter(&mut self, next: LivenessStep) {
        debug_assert!(next > self.step || next == LivenessStep::Start);
        tracing::debug!(from = ?self.step, to = ?next, "step changed");
        if self.step == LivenessStep::Challenge && next != LivenessStep::Challenge {
            self.challenge.clear();
        }
        if next == LivenessStep::Start {
            self.reset_detectors();
            self.challenge.clear();
            self.hold_started_at = None;
        }
        self.step = next;
    }

    fn reset_detectors(&mut self) {
        self.blink.reset();
        self.head.reset();
    }

    /// Store a capture taken in response to a tick.
    pub fn record_capture(&mut self, frame: CapturedFrame, reset_buffer: bool) {
        if reset_buffer {
            self.captured.clear();
        }
        tracing::debug!(step = ?frame.step, bytes = frame.jpeg.len(), "frame captured");
        self.captured.push(frame);
    }

    /// Hand the captured frames to the host, leaving the buffer empty.
    pub fn take_captured_frames(&mut self) -> Vec<CapturedFrame> {
        std::mem::take(&mut self.captured)
    }

    pub fn captured_frames(&self) -> &[CapturedFrame] {
        &self.captured
    }

    pub fn mark_spoof_detected(&mut self) {
        self.fail(LivenessStep::SpoofDetected);
    }

    pub fn mark_match_failed(&mut self) {
        self.fail(LivenessStep::MatchFailed);
    }

    fn fail(&mut self, step: LivenessStep) {
        self.pending.cancel();
        self.challenge.clear();
        self.hold_started_at = None;
        tracing::warn!(from = ?self.step, to = ?step, "session failed");
        self.step = step;
    }

    /// Return to a fresh session. Cancels any pending step change.
    pub fn reset(&mut self) {
        self.pending.cancel();
        self.step = LivenessStep::Start;
        self.face_status = FaceInsideStatus::OutsideOval;
        self.miss_count = 0;
        self.hold_started_at = None;
        self.challenge.clear();
        self.reset_detectors();
        self.evidence.clear();
        self.captured.clear();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            step: self.step,
            face_status: self.face_status,
            challenge: self.challenge.direction(),
            miss_count: self.miss_count,
            captured: self.captured.len(),
        }
    }

    pub fn step(&self) -> LivenessStep {
        self.step
    }

    pub fn face_status(&self) -> FaceInsideStatus {
        self.face_status
    }

    pub fn challenge_direction(&self) -> Option<ChallengeDirection> {
        self.challenge.direction()
    }

    pub fn challenge_started_at(&self) -> Option<Instant> {
        self.challenge.started_at()
    }

    pub fn blink_change_count(&self) -> u32 {
        self.blink.change_count()
    }

    pub fn previous_blink_metric(&self) -> Option<f32> {
        self.blink.previous_metric()
    }

    pub fn previous_nose_x(&self) -> Option<f32> {
        self.head.previous_nose_x()
    }

    pub fn miss_count(&self) -> u32 {
        self.miss_count
    }

    pub fn hold_started_at(&self) -> Option<Instant> {
        self.hold_started_at
    }

    pub fn pending_step(&self) -> Option<LivenessStep> {
        self.pending.peek().copied()
    }

    pub fn motion_stats(&self) -> MotionStats {
        self.evidence.motion_stats()
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }
}
