//! Async driver for one [`Session`].
//!
//! The [`Controller`] owns the session and runs a single `tokio::select!` loop
//! over four sources:
//!
//! ```text
//! inbox (Message)  ──▶ session setters / ingest / submit
//! next deadline    ──▶ preview recompute, idle warning, auto-apply
//! render task      ──▶ accept_render → PreviewSink + PreviewRendered
//! submit task      ──▶ finish_submit → Applied / SubmitFailed
//! ```
//!
//! Renders run on the blocking pool, one at a time; a recompute that comes due
//! while another is running waits for it and then reads the latest controls.
//! A submit that finds the preview stale renders the current controls there
//! first, so the payload never lags behind the controls.
//! Submissions run as spawned tasks; ingesting a new image aborts the one
//! still running for the old image. A task that panics or is aborted is
//! reported as [`SubmitError::Aborted`], so the in-flight guard is always
//! released. When the loop ends (teardown message or closed inbox) every
//! outstanding task is aborted and no further events are dispatched.
//!
//! User-facing notifications go to [`SessionObserver`]s as [`SessionEvent`]s,
//! in registration order. Logging is separate and goes through `tracing`.

use crate::backend::{SubmitError, Submitter};
use crate::config::AdjustConfig;
use crate::imaging::{self, Adjustment, CropAnchor, PixelBuffer};
use crate::session::{
    RenderOutput, Session, SessionError, SubmitOutcome, SubmitStart, TimerEvent,
};
use crate::types::UpdateEvent;
use serde::{Deserialize, Serialize};
use std::future::pending;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

// ============================================================================
// Inbound protocol
// ============================================================================

/// One inbound message, serialized as a JSON object tagged by `op`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Message {
    /// A backend event; `detail` is decoded as an [`UpdateEvent`] when `name` matches.
    Event {
        name: String,
        detail: serde_json::Value,
    },
    SetAdjustment {
        name: Adjustment,
        value: f64,
    },
    SetTargetWidth {
        value: u32,
    },
    SetTargetHeight {
        value: u32,
    },
    SetKeepAspect {
        value: bool,
    },
    SetCropAnchor {
        value: CropAnchor,
    },
    DragStart,
    DragEnd,
    ResetColor,
    ResetSize,
    Submit,
    Teardown,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_message(line: &str) -> Result<Option<Message>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Forward JSON-lines messages from `reader` into `tx` until EOF or until the
/// receiver goes away. Malformed lines, including ones that are not UTF-8,
/// are logged and skipped; only a failing read ends the stream early.
pub async fn read_messages<R>(mut reader: R, tx: mpsc::Sender<Message>) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut line_no = 0usize;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        line_no += 1;
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping message that is not UTF-8");
                continue;
            }
        };
        match parse_message(line) {
            Ok(Some(message)) => {
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(line = line_no, error = %e, "Skipping malformed message"),
        }
    }
    Ok(())
}

// ============================================================================
// Observers and preview sinks
// ============================================================================

/// User-facing notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Ingested { width: u32, height: u32 },
    IngestFailed { reason: String },
    PreviewRendered { width: u32, height: u32, fingerprint: String },
    IdleWarning,
    AutoApplyScheduled,
    SubmitStarted { width: u32, height: u32 },
    Applied,
    SubmitFailed { reason: String },
    /// Submit refused: already applied, or nothing to submit.
    SubmitRejected { reason: String },
    /// Submit ignored because one is already in flight.
    SubmitIgnored,
    TornDown,
}

pub trait SessionObserver: Send {
    fn on_event(&mut self, node_id: &str, event: &SessionEvent);
}

impl<F> SessionObserver for F
where
    F: FnMut(&str, &SessionEvent) + Send,
{
    fn on_event(&mut self, node_id: &str, event: &SessionEvent) {
        self(node_id, event)
    }
}

/// Observers invoked in registration order.
#[derive(Default)]
pub struct ObserverList {
    observers: Vec<Box<dyn SessionObserver>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: impl SessionObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn dispatch(&mut self, node_id: &str, event: &SessionEvent) {
        for observer in &mut self.observers {
            observer.on_event(node_id, event);
        }
    }
}

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PNG encode failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Where accepted previews are presented.
pub trait PreviewSink: Send {
    fn present(&mut self, node_id: &str, preview: &PixelBuffer) -> Result<(), PreviewError>;
}

/// Discards previews.
pub struct NullPreview;

impl PreviewSink for NullPreview {
    fn present(&mut self, _node_id: &str, _preview: &PixelBuffer) -> Result<(), PreviewError> {
        Ok(())
    }
}

/// Overwrites one PNG file with every accepted preview.
pub struct FilePreview {
    path: PathBuf,
}

impl FilePreview {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PreviewSink for FilePreview {
    fn present(&mut self, _node_id: &str, preview: &PixelBuffer) -> Result<(), PreviewError> {
        let png = imaging::encode_png(preview)?;
        std::fs::write(&self.path, png)?;
        Ok(())
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Summary returned when the loop ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub node_id: String,
    /// Images ingested over the session's life.
    pub images: u64,
    /// Whether the last image was applied.
    pub applied: bool,
}

struct InFlightSubmit {
    generation: u64,
    handle: JoinHandle<Result<(), SubmitError>>,
}

pub struct Controller<S: Submitter> {
    session: Session,
    update_event: String,
    submitter: Arc<S>,
    observers: ObserverList,
    preview: Box<dyn PreviewSink>,
}

impl<S: Submitter> Controller<S> {
    pub fn new(session: Session, update_event: impl Into<String>, submitter: Arc<S>) -> Self {
        Self {
            session,
            update_event: update_event.into(),
            submitter,
            observers: ObserverList::new(),
            preview: Box::new(NullPreview),
        }
    }

    pub fn from_config(node_id: impl Into<String>, config: &AdjustConfig, submitter: Arc<S>) -> Self {
        let session = Session::new(node_id, config.session_settings());
        Self::new(session, config.session.update_event.clone(), submitter)
    }

    pub fn observe(mut self, observer: impl SessionObserver + 'static) -> Self {
        self.observers.register(observer);
        self
    }

    pub fn with_preview(mut self, sink: impl PreviewSink + 'static) -> Self {
        self.preview = Box::new(sink);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Drive the session until a teardown message arrives or the inbox closes.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<Message>) -> RunReport {
        let mut render: Option<JoinHandle<RenderOutput>> = None;
        let mut submit: Option<InFlightSubmit> = None;
        info!(node_id = %self.session.node_id(), "Session started");

        loop {
            if render.is_none() {
                if let Some(job) = self.session.take_render_job(Instant::now()) {
                    render = Some(tokio::task::spawn_blocking(move || job.run()));
                }
            }
            // A due preview waits for the running render instead of spinning.
            let deadline = if render.is_some() {
                self.session.timer_deadline()
            } else {
                self.session.next_deadline()
            };

            tokio::select! {
                message = inbox.recv() => match message {
                    Some(Message::Teardown) | None => break,
                    Some(message) => self.handle_message(message, &mut submit).await,
                },
                _ = sleep_until_opt(deadline) => {
                    self.on_deadline(&mut submit).await;
                }
                result = join_render(&mut render) => {
                    render = None;
                    self.on_render_finished(result);
                }
                (generation, result) = join_submit(&mut submit) => {
                    submit = None;
                    self.on_submit_finished(generation, result);
                }
            }
        }

        if let Some(handle) = render.take() {
            handle.abort();
        }
        if let Some(inflight) = submit.take() {
            inflight.handle.abort();
        }
        let report = RunReport {
            node_id: self.session.node_id().to_string(),
            images: self.session.generation(),
            applied: self.session.has_applied(),
        };
        self.session.teardown();
        self.dispatch(SessionEvent::TornDown);
        report
    }

    fn dispatch(&mut self, event: SessionEvent) {
        let node_id = self.session.node_id().to_string();
        self.observers.dispatch(&node_id, &event);
    }

    async fn handle_message(&mut self, message: Message, submit: &mut Option<InFlightSubmit>) {
        let now = Instant::now();
        let result = match message {
            Message::Event { name, detail } => {
                self.on_backend_event(&name, detail, now, submit);
                Ok(())
            }
            Message::SetAdjustment { name, value } => self.session.set_adjustment(name, value, now),
            Message::SetTargetWidth { value } => self.session.set_target_width(value, now),
            Message::SetTargetHeight { value } => self.session.set_target_height(value, now),
            Message::SetKeepAspect { value } => self.session.set_keep_aspect(value, now),
            Message::SetCropAnchor { value } => self.session.set_crop_anchor(value, now),
            Message::DragStart => self.session.drag_start(),
            Message::DragEnd => self.session.drag_end(now),
            Message::ResetColor => self.session.reset_color(now),
            Message::ResetSize => self.session.reset_size(now),
            Message::Submit => {
                self.start_submit(submit).await;
                Ok(())
            }
            // Handled by the loop.
            Message::Teardown => Ok(()),
        };
        if let Err(e) = result {
            warn!(node_id = %self.session.node_id(), error = %e, "Ignoring control change");
        }
    }

    /// Ingest a matching update. A submission still running for the
    /// previous image is aborted so its POST does not reach the backend.
    fn on_backend_event(
        &mut self,
        name: &str,
        detail: serde_json::Value,
        now: Instant,
        submit: &mut Option<InFlightSubmit>,
    ) {
        if name != self.update_event {
            debug!(event = name, "Ignoring unrelated event");
            return;
        }
        let update: UpdateEvent = match serde_json::from_value(detail) {
            Ok(update) => update,
            Err(e) => {
                warn!(event = name, error = %e, "Malformed update event");
                return;
            }
        };
        if update.node_id != self.session.node_id() {
            debug!(node_id = %update.node_id, "Ignoring update for another node");
            return;
        }
        match self.session.ingest(&update.image_data, now) {
            Ok((width, height)) => {
                if let Some(inflight) = submit.take() {
                    debug!(generation = inflight.generation, "Abandoning submission for replaced image");
                    inflight.handle.abort();
                }
                self.dispatch(SessionEvent::Ingested { width, height });
            }
            Err(e) => self.dispatch(SessionEvent::IngestFailed {
                reason: e.to_string(),
            }),
        }
    }

    async fn on_deadline(&mut self, submit: &mut Option<InFlightSubmit>) {
        for event in self.session.poll_timers(Instant::now()) {
            match event {
                TimerEvent::IdleWarning => self.dispatch(SessionEvent::IdleWarning),
                TimerEvent::AutoApplyScheduled => self.dispatch(SessionEvent::AutoApplyScheduled),
                TimerEvent::AutoApplyDue => {
                    info!(node_id = %self.session.node_id(), "Auto-applying after idle timeout");
                    self.start_submit(submit).await;
                }
            }
        }
        // Preview deadlines are picked up at the top of the loop.
    }

    fn on_render_finished(&mut self, result: Result<RenderOutput, JoinError>) {
        match result {
            Ok(output) => {
                if self.session.accept_render(output) {
                    self.present_preview();
                }
            }
            Err(e) => error!(node_id = %self.session.node_id(), error = %e, "Preview render task failed"),
        }
    }

    fn present_preview(&mut self) {
        let Some(buffer) = self.session.rendered() else {
            return;
        };
        let event = SessionEvent::PreviewRendered {
            width: buffer.width(),
            height: buffer.height(),
            fingerprint: imaging::fingerprint(buffer),
        };
        if let Err(e) = self.preview.present(self.session.node_id(), buffer) {
            warn!(node_id = %self.session.node_id(), error = %e, "Could not present preview");
        }
        self.dispatch(event);
    }

    async fn start_submit(&mut self, slot: &mut Option<InFlightSubmit>) {
        // The payload must reflect the latest controls; render them on the
        // blocking pool rather than inside the loop.
        if let Some(job) = self.session.take_flush_job() {
            match tokio::task::spawn_blocking(move || job.run()).await {
                Ok(output) => {
                    if self.session.accept_render(output) {
                        self.present_preview();
                    }
                }
                Err(e) => error!(node_id = %self.session.node_id(), error = %e, "Preview render task failed"),
            }
        }
        match self.session.begin_submit() {
            Ok(SubmitStart::Started(ticket)) => {
                self.dispatch(SessionEvent::SubmitStarted {
                    width: ticket.payload.width,
                    height: ticket.payload.height,
                });
                let submitter = Arc::clone(&self.submitter);
                let payload = ticket.payload;
                let handle = tokio::spawn(async move { submitter.submit(&payload).await });
                *slot = Some(InFlightSubmit {
                    generation: ticket.generation,
                    handle,
                });
            }
            Ok(SubmitStart::AlreadyInFlight) => self.dispatch(SessionEvent::SubmitIgnored),
            Err(e @ (SessionError::AlreadyApplied | SessionError::NothingToSubmit)) => {
                info!(node_id = %self.session.node_id(), reason = %e, "Submit rejected");
                self.dispatch(SessionEvent::SubmitRejected {
                    reason: e.to_string(),
                });
            }
            Err(e) => warn!(node_id = %self.session.node_id(), error = %e, "Submit refused"),
        }
    }

    fn on_submit_finished(&mut self, generation: u64, result: Result<(), SubmitError>) {
        match self.session.finish_submit(generation, result) {
            SubmitOutcome::Applied => self.dispatch(SessionEvent::Applied),
            SubmitOutcome::Failed(e) => self.dispatch(SessionEvent::SubmitFailed {
                reason: e.to_string(),
            }),
            SubmitOutcome::Stale => {}
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}

async fn join_render(slot: &mut Option<JoinHandle<RenderOutput>>) -> Result<RenderOutput, JoinError> {
    match slot.as_mut() {
        Some(handle) => handle.await,
        None => pending().await,
    }
}

async fn join_submit(slot: &mut Option<InFlightSubmit>) -> (u64, Result<(), SubmitError>) {
    match slot.as_mut() {
        Some(inflight) => {
            let result = match (&mut inflight.handle).await {
                Ok(result) => result,
                Err(e) => {
                    error!(generation = inflight.generation, error = %e, "Submission task failed");
                    Err(SubmitError::Aborted)
                }
            };
            (inflight.generation, result)
        }
        None => pending().await,
    }
}
