use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use livegate_core::antispoof::MotionStats;
use livegate_core::{
    Camera, CapturedFrame, EuclideanMatcher, FaceDescriptor, FrameFeatureSource, FrameFeatures,
    LivenessConfig, LivenessSession, LivenessStep, Matcher, SessionSnapshot, TickOutcome,
    VerifyResult, VerifyStatus,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] livegate_core::CameraError),
    #[error("feature source error: {0}")]
    Source(#[from] livegate_core::SourceError),
    #[error("match error: {0}")]
    Match(#[from] livegate_core::MatchError),
    #[error("no face found in a captured image")]
    NoFaceDetected,
    #[error("no frames captured")]
    NothingCaptured,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of one engine tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub tick: u64,
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
    pub outcome: TickOutcome,
}

/// Messages sent from async callers to the engine thread.
enum EngineRequest {
    Tick {
        reply: oneshot::Sender<Result<TickReport, EngineError>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    MotionStats {
        reply: oneshot::Sender<MotionStats>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    TakeCaptured {
        reply: oneshot::Sender<Vec<CapturedFrame>>,
    },
    VerifyCaptured {
        reference: FaceDescriptor,
        reply: oneshot::Sender<Result<VerifyResult, EngineError>>,
    },
    VerifyImages {
        first: Vec<u8>,
        second: Vec<u8>,
        reply: oneshot::Sender<Result<VerifyResult, EngineError>>,
    },
    ReportSpoof {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Releases the camera exactly once, on `release()` or on drop.
struct CameraLease<C: Camera> {
    camera: C,
    released: bool,
}

impl<C: Camera> CameraLease<C> {
    fn new(camera: C) -> Self {
        Self {
            camera,
            released: false,
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.camera.release();
            tracing::info!("camera released");
        }
    }
}

impl<C: Camera> Deref for CameraLease<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.camera
    }
}

impl<C: Camera> DerefMut for CameraLease<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.camera
    }
}

impl<C: Camera> Drop for CameraLease<C> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    in_flight: Arc<AtomicBool>,
    session_id: Uuid,
}

/// Clears the in-flight flag even if the awaiting future is dropped.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl EngineHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Grab a frame, detect, and advance the session.
    pub async fn tick(&self) -> Result<TickReport, EngineError> {
        self.request(|reply| EngineRequest::Tick { reply }).await?
    }

    /// Like [`tick`](Self::tick), but returns `Ok(None)` instead of queueing
    /// when another tick is still being processed.
    pub async fn try_tick(&self) -> Result<Option<TickReport>, EngineError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!("tick skipped, previous tick still running");
            return Ok(None);
        }
        let _guard = InFlight(Arc::clone(&self.in_flight));
        self.tick().await.map(Some)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, EngineError> {
        self.request(|reply| EngineRequest::Snapshot { reply }).await
    }

    pub async fn motion_stats(&self) -> Result<MotionStats, EngineError> {
        self.request(|reply| EngineRequest::MotionStats { reply })
            .await
    }

    pub async fn reset(&self) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::Reset { reply }).await
    }

    /// Hand over the frames captured so far, leaving the session's buffer empty.
    pub async fn take_captured(&self) -> Result<Vec<CapturedFrame>, EngineError> {
        self.request(|reply| EngineRequest::TakeCaptured { reply })
            .await
    }

    /// Score every captured frame against `reference`. A `Fail` verdict
    /// moves the session to `MatchFailed`.
    pub async fn verify_captured(
        &self,
        reference: FaceDescriptor,
    ) -> Result<VerifyResult, EngineError> {
        self.request(|reply| EngineRequest::VerifyCaptured { reference, reply })
            .await?
    }

    /// Compare the faces in two encoded images.
    pub async fn verify_images(
        &self,
        first: Vec<u8>,
        second: Vec<u8>,
    ) -> Result<VerifyResult, EngineError> {
        self.request(|reply| EngineRequest::VerifyImages {
            first,
            second,
            reply,
        })
        .await?
    }

    /// Report an external spoof verdict. The session stays in
    /// `SpoofDetected` until reset.
    pub async fn report_spoof(&self) -> Result<SessionSnapshot, EngineError> {
        self.request(|reply| EngineRequest::ReportSpoof { reply })
            .await
    }

    /// Release the camera and stop the engine thread.
    pub async fn stop(&self) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::Stop { reply }).await
    }
}

/// Everything the engine thread owns.
struct Engine<C: Camera, S: FrameFeatureSource> {
    session: LivenessSession,
    camera: CameraLease<C>,
    source: S,
    matcher: EuclideanMatcher,
    ticks: u64,
}

/// Spawn the engine on a dedicated OS thread.
///
/// Starts the camera and loads the feature source synchronously, then enters
/// a request loop. Fails fast if either is unavailable; the camera is released
/// again when the source fails to load.
pub fn spawn_engine<C, S>(
    camera: C,
    mut source: S,
    config: LivenessConfig,
) -> Result<EngineHandle, EngineError>
where
    C: Camera + Send + 'static,
    S: FrameFeatureSource + Send + 'static,
{
    let mut camera = CameraLease::new(camera);
    let (width, height) = camera.start()?;
    tracing::info!(width, height, "camera started");

    if !source.is_ready() {
        source.load()?;
        tracing::info!("feature source loaded");
    }

    let session_id = Uuid::new_v4();
    let session = LivenessSession::new(config, width, height);
    let mut engine = Engine {
        session,
        camera,
        source,
        matcher: EuclideanMatcher::default(),
        ticks: 0,
    };

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("livegate-engine".into())
        .spawn(move || {
            let span = tracing::info_span!("session", id = %session_id);
            let _enter = span.enter();
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                if !engine.handle(req) {
                    break;
                }
            }
            engine.camera.release();
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle {
        tx,
        in_flight: Arc::new(AtomicBool::new(false)),
        session_id,
    })
}

impl<C: Camera, S: FrameFeatureSource> Engine<C, S> {
    /// Returns false when the loop should stop.
    fn handle(&mut self, req: EngineRequest) -> bool {
        match req {
            EngineRequest::Tick { reply } => {
                let _ = reply.send(self.tick());
            }
            EngineRequest::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot());
            }
            EngineRequest::MotionStats { reply } => {
                let _ = reply.send(self.session.motion_stats());
            }
            EngineRequest::Reset { reply } => {
                self.session.reset();
                tracing::info!("session reset");
                let _ = reply.send(());
            }
            EngineRequest::TakeCaptured { reply } => {
                let _ = reply.send(self.session.take_captured_frames());
            }
            EngineRequest::VerifyCaptured { reference, reply } => {
                let _ = reply.send(self.verify_captured(&reference));
            }
            EngineRequest::VerifyImages {
                first,
                second,
                reply,
            } => {
                let _ = reply.send(self.verify_images(&first, &second));
            }
            EngineRequest::ReportSpoof { reply } => {
                self.session.mark_spoof_detected();
                let _ = reply.send(self.session.snapshot());
            }
            EngineRequest::Stop { reply } => {
                self.camera.release();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn tick(&mut self) -> Result<TickReport, EngineError> {
        let frame = self.camera.grab()?;
        let features = match self.source.detect(&frame) {
            Ok(features) => features,
            Err(e) => {
                tracing::warn!(error = %e, "detection failed, treating frame as missed");
                FrameFeatures::missing()
            }
        };

        let outcome = self.session.tick(&features, Instant::now());
        if outcome.capture_requested {
            let jpeg = self.camera.snapshot(&frame)?;
            self.session.record_capture(
                CapturedFrame::new(jpeg, self.session.step()),
                outcome.reset_capture_buffer,
            );
        }
        if outcome.session_done {
            tracing::info!(
                captured = self.session.captured_frames().len(),
                "liveness session passed"
            );
        }

        self.ticks += 1;
        Ok(TickReport {
            tick: self.ticks,
            snapshot: self.session.snapshot(),
            outcome,
        })
    }

    fn describe(&mut self, image: &[u8]) -> Result<FaceDescriptor, EngineError> {
        self.source
            .describe(image)?
            .ok_or(EngineError::NoFaceDetected)
    }

    fn verify_captured(&mut self, reference: &FaceDescriptor) -> Result<VerifyResult, EngineError> {
        let images: Vec<Vec<u8>> = self
            .session
            .captured_frames()
            .iter()
            .map(|frame| frame.jpeg.clone())
            .collect();
        if images.is_empty() {
            return Err(EngineError::NothingCaptured);
        }

        let samples = images
            .iter()
            .map(|image| self.describe(image))
            .collect::<Result<Vec<_>, _>>()?;
        let result = self.matcher.verify_multiple(reference, &samples)?;

        tracing::info!(
            samples = samples.len(),
            distance = result.distance,
            similarity = result.similarity_percent,
            status = ?result.status,
            "captured frames verified"
        );
        if result.status == VerifyStatus::Fail {
            self.session.mark_match_failed();
        }
        Ok(result)
    }

    fn verify_images(&mut self, first: &[u8], second: &[u8]) -> Result<VerifyResult, EngineError> {
        let a = self.describe(first)?;
        let b = self.describe(second)?;
        let result = self.matcher.verify(&a, &b)?;
        tracing::info!(
            distance = result.distance,
            similarity = result.similarity_percent,
            status = ?result.status,
            "image pair verified"
        );
        Ok(result)
    }
}

/// How a tick runner finished.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub session_id: Uuid,
    pub ticks: u64,
    pub skipped: u64,
    pub final_step: LivenessStep,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn passed(&self) -> bool {
        self.final_step == LivenessStep::Done
    }
}

/// Tick the engine every `interval` until the session reaches a terminal
/// step, `max_ticks` ticks have run, or `events` is closed. Each report is
/// forwarded to `events`.
///
/// Ticks never overlap: a tick that is still running when the next is due
/// causes that next tick to be skipped rather than queued.
pub async fn run_session(
    handle: &EngineHandle,
    interval: Duration,
    max_ticks: Option<u64>,
    events: mpsc::Sender<TickReport>,
) -> Result<RunSummary, EngineError> {
    let started_at = Utc::now();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        session = %handle.session_id(),
        interval_ms = interval.as_millis() as u64,
        "tick runner started"
    );

    let mut ticks = 0u64;
    let mut skipped = 0u64;
    let mut final_step;
    loop {
        ticker.tick().await;
        let Some(report) = handle.try_tick().await? else {
            skipped += 1;
            continue;
        };
        ticks += 1;
        final_step = report.snapshot.step;

        if events.send(report).await.is_err() {
            tracing::debug!("event receiver closed, stopping");
            break;
        }
        if final_step.is_terminal() {
            break;
        }
        if max_ticks.is_some_and(|max| ticks >= max) {
            tracing::warn!(ticks, step = ?final_step, "tick limit reached");
            break;
        }
    }

    Ok(RunSummary {
        session_id: handle.session_id(),
        ticks,
        skipped,
        final_step,
        started_at,
        finished_at: Utc::now(),
    })
}
