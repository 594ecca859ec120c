//! livegate-core: Liveness gate and face match scoring.
//!
//! Drives an active liveness session (directional challenge, blink, optional
//! mouth-open, head turn, steady hold) from per-frame face detections, and
//! scores captured face descriptors against a reference identity.
//!
//! Face detection, landmark extraction and descriptor models are external;
//! they plug in through [`source::FrameFeatureSource`].

pub mod antispoof;
pub mod capture;
pub mod config;
pub mod deferred;
pub mod matcher;
pub mod motion;
pub mod oval;
pub mod session;
pub mod source;
pub mod types;

#[cfg(test)]
pub(crate) mod fixtures;

pub use config::{ConfigError, DeviceProfile, LivenessConfig, OvalSettings};
pub use matcher::{EuclideanMatcher, MatchError, Matcher, VerifyResult, VerifyStatus};
pub use oval::{FaceInsideStatus, OvalConfig};
pub use session::{
    CapturedFrame, LivenessSession, LivenessStep, SessionSnapshot, TickOutcome,
};
pub use source::{Camera, CameraError, Frame, FrameFeatureSource, SourceError};
pub use types::{BoundingBox, FaceDescriptor, FrameFeatures, Landmarks, Point};
