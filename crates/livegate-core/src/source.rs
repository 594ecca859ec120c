//! Collaborator contracts: the face feature model and the camera.
//!
//! Neither is implemented by the core. A feature source wraps whatever
//! detector/landmark/descriptor models the host ships; a camera wraps the
//! capture device. Both are owned by exactly one session at a time.

use thiserror::Error;

use crate::types::{FaceDescriptor, FrameFeatures};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("feature models are not loaded")]
    NotReady,
    #[error("failed to load feature models: {0}")]
    Load(String),
    #[error("detection failed: {0}")]
    Detection(String),
    #[error("descriptor extraction is not supported by this source")]
    Unsupported,
}

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no camera device available")]
    NoDevice,
    #[error("camera access denied: {0}")]
    PermissionDenied(String),
    #[error("camera is not started")]
    NotStarted,
    #[error("frame capture failed: {0}")]
    Capture(String),
    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] crate::capture::CaptureError),
}

/// An RGB8 video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    /// A uniformly grey frame.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![128; width as usize * height as usize * 3],
        }
    }
}

/// Per-frame face detection and still-image descriptor extraction.
pub trait FrameFeatureSource {
    /// Load model weights. Called once before the first detection when
    /// [`is_ready`](Self::is_ready) reports false.
    fn load(&mut self) -> Result<(), SourceError>;

    fn is_ready(&self) -> bool;

    /// Detect at most one face with its 68 landmarks.
    fn detect(&mut self, frame: &Frame) -> Result<FrameFeatures, SourceError>;

    /// Extract a descriptor from an encoded still image. `Ok(None)` means
    /// no face was found.
    fn describe(&mut self, image: &[u8]) -> Result<Option<FaceDescriptor>, SourceError>;
}

/// Live frame acquisition.
pub trait Camera {
    /// Acquire the device. Returns the frame size.
    fn start(&mut self) -> Result<(u32, u32), CameraError>;

    fn grab(&mut self) -> Result<Frame, CameraError>;

    /// Encode a still of `frame` (JPEG, quality 90).
    fn snapshot(&mut self, frame: &Frame) -> Result<Vec<u8>, CameraError>;

    /// Release the device. Must be safe to call more than once.
    fn release(&mut self);
}

impl<T: FrameFeatureSource + ?Sized> FrameFeatureSource for Box<T> {
    fn load(&mut self) -> Result<(), SourceError> {
        (**self).load()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn detect(&mut self, frame: &Frame) -> Result<FrameFeatures, SourceError> {
        (**self).detect(frame)
    }

    fn describe(&mut self, image: &[u8]) -> Result<Option<FaceDescriptor>, SourceError> {
        (**self).describe(image)
    }
}

impl<T: Camera + ?Sized> Camera for Box<T> {
    fn start(&mut self) -> Result<(u32, u32), CameraError> {
        (**self).start()
    }

    fn grab(&mut self) -> Result<Frame, CameraError> {
        (**self).grab()
    }

    fn snapshot(&mut self, frame: &Frame) -> Result<Vec<u8>, CameraError> {
        (**self).snapshot(frame)
    }

    fn release(&mut self) {
        (**self).release()
    }
}
