//! Trace replay: a recorded detection stream standing in for live models and
//! a camera.
//!
//! A trace is JSON lines. Each line is either a detection record
//! (`{"detected":true,"bbox":{..},"landmarks":[{"x":..,"y":..},..]}`) or
//! `{"error":"..."}` for a detector failure at that frame. Blank lines are
//! skipped.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use livegate_core::capture::{encode_jpeg, SNAPSHOT_QUALITY};
use livegate_core::{
    Camera, CameraError, FaceDescriptor, Frame, FrameFeatureSource, FrameFeatures, SourceError,
};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TraceRecord {
    Error { error: String },
    Frame(FrameFeatures),
}

pub fn parse_trace(text: &str) -> Result<Vec<TraceRecord>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("trace line {}", i + 1))
        })
        .collect()
}

/// Feature source that plays back a trace, one record per `detect` call.
/// Once the trace is exhausted every frame reports no face.
pub struct ReplaySource {
    records: VecDeque<TraceRecord>,
    loaded: bool,
}

impl ReplaySource {
    pub fn new(records: Vec<TraceRecord>) -> Self {
        Self {
            records: records.into(),
            loaded: false,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read trace {}", path.display()))?;
        let records = parse_trace(&text)?;
        tracing::info!(path = %path.display(), frames = records.len(), "trace loaded");
        Ok(Self::new(records))
    }

    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

impl FrameFeatureSource for ReplaySource {
    fn load(&mut self) -> Result<(), SourceError> {
        self.loaded = true;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.loaded
    }

    fn detect(&mut self, _frame: &Frame) -> Result<FrameFeatures, SourceError> {
        if !self.loaded {
            return Err(SourceError::NotReady);
        }
        match self.records.pop_front() {
            Some(TraceRecord::Frame(features)) => Ok(features),
            Some(TraceRecord::Error { error }) => Err(SourceError::Detection(error)),
            None => Ok(FrameFeatures::missing()),
        }
    }

    fn describe(&mut self, _image: &[u8]) -> Result<Option<FaceDescriptor>, SourceError> {
        Err(SourceError::Unsupported)
    }
}

/// Camera producing blank frames of a fixed size.
pub struct ReplayCamera {
    width: u32,
    height: u32,
    started: bool,
    releases: Arc<AtomicUsize>,
}

impl ReplayCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            started: false,
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counter of `release` calls that stays readable after the camera has
    /// moved into an engine.
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.releases)
    }
}

impl Camera for ReplayCamera {
    fn start(&mut self) -> Result<(u32, u32), CameraError> {
        if self.width == 0 || self.height == 0 {
            return Err(CameraError::NoDevice);
        }
        self.started = true;
        Ok((self.width, self.height))
    }

    fn grab(&mut self) -> Result<Frame, CameraError> {
        if !self.started {
            return Err(CameraError::NotStarted);
        }
        Ok(Frame::blank(self.width, self.height))
    }

    fn snapshot(&mut self, frame: &Frame) -> Result<Vec<u8>, CameraError> {
        Ok(encode_jpeg(frame, SNAPSHOT_QUALITY)?)
    }

    fn release(&mut self) {
        if self.started {
            self.started = false;
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}
