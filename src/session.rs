//! The adjustment session: one image's lifecycle from ingest to submit.
//!
//! [`Session`] is a synchronous state machine. It never sleeps, spawns or
//! performs I/O; every time-dependent method takes the current
//! [`Instant`] so the async driver in [`runtime`](crate::runtime) (or a test)
//! owns the clock. Heavy work is handed out as values:
//!
//! - [`RenderJob`] is a snapshot of the source and controls; the driver runs it
//!   off the event loop and hands the [`RenderOutput`] back through
//!   [`Session::accept_render`], which discards results from an older image.
//! - [`SubmitTicket`] carries the payload for one submission; its outcome comes
//!   back through [`Session::finish_submit`], tagged with the same generation.
//!
//! ## State
//!
//! ```text
//!  Idle ──ingest──▶ Previewing ──control change──▶ Adjusting
//!                      ▲   │                          │
//!                      │   └──────── submit ──────────┤
//!                      │                              ▼
//!                      └──── failure ─────────── Submitting ──success──▶ Applied
//! ```
//!
//! A new ingest returns any state to `Previewing` with all flags cleared.
//! The state is derived from the flags, see [`Session::state`].

use crate::backend::SubmitError;
use crate::imaging::{
    self, Adjustment, AdjustmentParameters, CropAnchor, DecodeError, GeometryOptions,
    GeometrySpec, PixelBuffer, bound_dimensions, linked_dimension,
};
use crate::timer::{Debounce, Escalation, EscalationTimings, IdleEscalation, earliest};
use crate::types::SubmitPayload;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("could not decode image: {0}")]
    Decode(#[from] DecodeError),
    #[error("this image has already been applied")]
    AlreadyApplied,
    #[error("no adjusted image to submit")]
    NothingToSubmit,
    #[error("invalid {name} value: {value}")]
    InvalidValue { name: Adjustment, value: f64 },
    #[error("session has been torn down")]
    TornDown,
}

/// Observable lifecycle state, derived from the session flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No image yet (or torn down).
    Idle,
    /// Image present, nothing touched since ingest.
    Previewing,
    /// A control was changed; idle timers are running.
    Adjusting,
    /// A submission is in flight.
    Submitting,
    /// Submitted successfully; terminal until the next ingest.
    Applied,
}

/// Tunables for a session, normally built from
/// [`AdjustConfig`](crate::config::AdjustConfig).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub timings: EscalationTimings,
    pub drag_throttle: Duration,
    pub geometry: GeometryOptions,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timings: EscalationTimings::default(),
            drag_throttle: Duration::from_millis(50),
            geometry: GeometryOptions::default(),
        }
    }
}

/// Snapshot of everything a preview render needs.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub generation: u64,
    pub revision: u64,
    source: Arc<PixelBuffer>,
    params: AdjustmentParameters,
    geometry: GeometrySpec,
    options: GeometryOptions,
}

impl RenderJob {
    pub fn run(&self) -> RenderOutput {
        RenderOutput {
            generation: self.generation,
            revision: self.revision,
            buffer: imaging::render(&self.source, &self.params, &self.geometry, &self.options),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub generation: u64,
    pub revision: u64,
    pub buffer: PixelBuffer,
}

/// Result of asking the idle timers what is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    IdleWarning,
    AutoApplyScheduled,
    AutoApplyDue,
}

/// One submission handed to the driver.
#[derive(Debug, Clone)]
pub struct SubmitTicket {
    pub generation: u64,
    pub payload: SubmitPayload,
}

#[derive(Debug)]
pub enum SubmitStart {
    Started(SubmitTicket),
    /// A submission is already in flight; nothing was done.
    AlreadyInFlight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Applied,
    Failed(SubmitError),
    /// The result belongs to an image that has since been replaced.
    Stale,
}

pub struct Session {
    node_id: String,
    settings: SessionSettings,
    source: Option<Arc<PixelBuffer>>,
    generation: u64,
    params: AdjustmentParameters,
    geometry: GeometrySpec,
    /// Bumped on every control change; a render is current when its revision matches.
    revision: u64,
    rendered: Option<PixelBuffer>,
    rendered_revision: u64,
    has_applied: bool,
    is_applying: bool,
    has_adjusted: bool,
    dragging: bool,
    live: bool,
    preview: Debounce,
    idle: IdleEscalation,
}

impl Session {
    pub fn new(node_id: impl Into<String>, settings: SessionSettings) -> Self {
        let preview = Debounce::new(settings.drag_throttle);
        let idle = IdleEscalation::new(settings.timings);
        Self {
            node_id: node_id.into(),
            settings,
            source: None,
            generation: 0,
            params: AdjustmentParameters::default(),
            geometry: GeometrySpec::default(),
            revision: 0,
            rendered: None,
            rendered_revision: 0,
            has_applied: false,
            is_applying: false,
            has_adjusted: false,
            dragging: false,
            live: true,
            preview,
            idle,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn params(&self) -> &AdjustmentParameters {
        &self.params
    }

    pub fn geometry(&self) -> &GeometrySpec {
        &self.geometry
    }

    pub fn source_dimensions(&self) -> Option<(u32, u32)> {
        self.source.as_ref().map(|s| s.dimensions())
    }

    /// The last accepted preview, if any.
    pub fn rendered(&self) -> Option<&PixelBuffer> {
        self.rendered.as_ref()
    }

    pub fn has_applied(&self) -> bool {
        self.has_applied
    }

    pub fn is_applying(&self) -> bool {
        self.is_applying
    }

    pub fn has_adjusted(&self) -> bool {
        self.has_adjusted
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn state(&self) -> SessionState {
        if !self.live || self.source.is_none() {
            SessionState::Idle
        } else if self.has_applied {
            SessionState::Applied
        } else if self.is_applying {
            SessionState::Submitting
        } else if self.has_adjusted {
            SessionState::Adjusting
        } else {
            SessionState::Previewing
        }
    }

    /// True when the cached preview does not reflect the current controls.
    pub fn preview_is_stale(&self) -> bool {
        self.source.is_some() && (self.rendered.is_none() || self.rendered_revision != self.revision)
    }

    // ------------------------------------------------------------------
    // Ingest
    // ------------------------------------------------------------------

    /// Decode base64 / data-URL text and make it the session's image.
    ///
    /// On failure nothing changes. On success all flags and timers are reset,
    /// the previous preview is dropped and a recompute is due immediately.
    /// Returns the new source dimensions.
    pub fn ingest(&mut self, encoded: &str, now: Instant) -> Result<(u32, u32), SessionError> {
        if !self.live {
            return Err(SessionError::TornDown);
        }
        let buffer = match imaging::decode_base64_image(encoded) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!(node_id = %self.node_id, error = %e, "Image decode failed; keeping previous image");
                return Err(e.into());
            }
        };
        Ok(self.replace_source(buffer, now))
    }

    fn replace_source(&mut self, buffer: PixelBuffer, now: Instant) -> (u32, u32) {
        let dims = buffer.dimensions();
        self.source = Some(Arc::new(buffer));
        self.generation += 1;
        self.revision += 1;
        self.rendered = None;
        self.has_applied = false;
        self.is_applying = false;
        self.has_adjusted = false;
        self.idle.cancel();
        self.relink_dimensions();
        self.preview.cancel();
        self.preview.trigger(now, false);
        info!(
            node_id = %self.node_id,
            generation = self.generation,
            width = dims.0,
            height = dims.1,
            "Image ingested"
        );
        dims
    }

    // ------------------------------------------------------------------
    // Controls
    // ------------------------------------------------------------------

    /// Set one color multiplier. Values are clamped to the valid range;
    /// NaN and infinities are rejected.
    pub fn set_adjustment(
        &mut self,
        which: Adjustment,
        value: f64,
        now: Instant,
    ) -> Result<(), SessionError> {
        self.ensure_live()?;
        if !self.params.set(which, value) {
            return Err(SessionError::InvalidValue { name: which, value });
        }
        self.controls_changed(now, true);
        Ok(())
    }

    /// Set the target width; with aspect lock and an image present the
    /// height follows. The pair is scaled down together to fit `max_dimension`.
    pub fn set_target_width(&mut self, value: u32, now: Instant) -> Result<(), SessionError> {
        self.ensure_live()?;
        let value = value.min(self.max_dimension());
        self.geometry.target_width = value;
        if let Some((sw, sh)) = self.linkable_source(value) {
            self.geometry.target_height = linked_dimension(value, sw, sh);
        }
        self.bound_targets();
        self.controls_changed(now, true);
        Ok(())
    }

    /// Set the target height; with aspect lock and an image present the
    /// width follows. The pair is scaled down together to fit `max_dimension`.
    pub fn set_target_height(&mut self, value: u32, now: Instant) -> Result<(), SessionError> {
        self.ensure_live()?;
        let value = value.min(self.max_dimension());
        self.geometry.target_height = value;
        if let Some((sw, sh)) = self.linkable_source(value) {
            self.geometry.target_width = linked_dimension(value, sh, sw);
        }
        self.bound_targets();
        self.controls_changed(now, true);
        Ok(())
    }

    /// Turning the lock on derives a missing dimension from the one that is set.
    pub fn set_keep_aspect(&mut self, keep: bool, now: Instant) -> Result<(), SessionError> {
        self.ensure_live()?;
        self.geometry.keep_aspect = keep;
        self.relink_dimensions();
        self.controls_changed(now, true);
        Ok(())
    }

    pub fn set_crop_anchor(&mut self, anchor: CropAnchor, now: Instant) -> Result<(), SessionError> {
        self.ensure_live()?;
        self.geometry.anchor = anchor;
        self.controls_changed(now, true);
        Ok(())
    }

    /// Restore brightness, contrast and saturation to identity.
    /// Recomputes the preview but does not count as an adjustment.
    pub fn reset_color(&mut self, now: Instant) -> Result<(), SessionError> {
        self.ensure_live()?;
        self.params = AdjustmentParameters::default();
        self.controls_changed(now, false);
        Ok(())
    }

    /// Clear both target dimensions back to "use source size".
    /// Recomputes the preview but does not count as an adjustment.
    pub fn reset_size(&mut self, now: Instant) -> Result<(), SessionError> {
        self.ensure_live()?;
        self.geometry.target_width = 0;
        self.geometry.target_height = 0;
        self.controls_changed(now, false);
        Ok(())
    }

    pub fn drag_start(&mut self) -> Result<(), SessionError> {
        self.ensure_live()?;
        self.dragging = true;
        Ok(())
    }

    /// End a continuous gesture: the preview catches up immediately.
    pub fn drag_end(&mut self, now: Instant) -> Result<(), SessionError> {
        self.ensure_live()?;
        self.dragging = false;
        self.controls_changed(now, true);
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), SessionError> {
        if self.live { Ok(()) } else { Err(SessionError::TornDown) }
    }

    fn max_dimension(&self) -> u32 {
        self.settings.geometry.max_dimension
    }

    fn linkable_source(&self, value: u32) -> Option<(u32, u32)> {
        if self.geometry.keep_aspect && value > 0 {
            self.source_dimensions()
        } else {
            None
        }
    }

    /// With the lock on and exactly one target set, fill in the other from
    /// the source aspect.
    fn relink_dimensions(&mut self) {
        let Some((sw, sh)) = self.source_dimensions() else {
            return;
        };
        if !self.geometry.keep_aspect {
            return;
        }
        match (self.geometry.target_width, self.geometry.target_height) {
            (0, 0) => return,
            (w, 0) => self.geometry.target_height = linked_dimension(w, sw, sh),
            (0, h) => self.geometry.target_width = linked_dimension(h, sh, sw),
            _ => return,
        }
        self.bound_targets();
    }

    fn bound_targets(&mut self) {
        let (w, h) = (self.geometry.target_width, self.geometry.target_height);
        let max = self.max_dimension();
        // A zero side means "derive"; only the set side is bounded.
        let (w, h) = match (w, h) {
            (0, h) => (0, h.min(max)),
            (w, 0) => (w.min(max), 0),
            (w, h) => bound_dimensions((w, h), max),
        };
        self.geometry.target_width = w;
        self.geometry.target_height = h;
    }

    fn controls_changed(&mut self, now: Instant, adjusted: bool) {
        self.revision += 1;
        self.preview.trigger(now, self.dragging);
        if adjusted {
            self.mark_adjusted(now);
        }
    }

    /// Record a user adjustment and restart both idle deadlines.
    /// Ignored once the image has been applied.
    fn mark_adjusted(&mut self, now: Instant) {
        if self.has_applied || self.source.is_none() {
            return;
        }
        self.has_adjusted = true;
        if !self.is_applying {
            self.idle.restart(now);
        }
    }

    // ------------------------------------------------------------------
    // Preview pipeline
    // ------------------------------------------------------------------

    pub fn preview_deadline(&self) -> Option<Instant> {
        if self.live { self.preview.deadline() } else { None }
    }

    pub fn timer_deadline(&self) -> Option<Instant> {
        if self.live { self.idle.next_deadline() } else { None }
    }

    /// Earliest pending deadline of any kind.
    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([self.preview_deadline(), self.timer_deadline()])
    }

    /// Take the preview recompute if it is due, as a job reading the
    /// controls as they are now.
    pub fn take_render_job(&mut self, now: Instant) -> Option<RenderJob> {
        if !self.live || !self.preview.take_if_due(now) {
            return None;
        }
        self.render_job()
    }

    fn render_job(&self) -> Option<RenderJob> {
        let source = self.source.as_ref()?;
        Some(RenderJob {
            generation: self.generation,
            revision: self.revision,
            source: Arc::clone(source),
            params: self.params,
            geometry: self.geometry,
            options: self.settings.geometry,
        })
    }

    /// Store a finished render unless it belongs to a replaced image or is
    /// not newer than the last accepted one. Returns whether it was kept.
    pub fn accept_render(&mut self, output: RenderOutput) -> bool {
        if !self.live || output.generation != self.generation {
            debug!(
                node_id = %self.node_id,
                generation = output.generation,
                current = self.generation,
                "Discarding render for replaced image"
            );
            return false;
        }
        if output.revision <= self.rendered_revision {
            debug!(node_id = %self.node_id, revision = output.revision, "Discarding out-of-order render");
            return false;
        }
        debug!(
            node_id = %self.node_id,
            generation = output.generation,
            revision = output.revision,
            width = output.buffer.width(),
            height = output.buffer.height(),
            "Preview rendered"
        );
        self.rendered_revision = output.revision;
        self.rendered = Some(output.buffer);
        true
    }

    /// The render a submit has to wait for, if any: a job for the current
    /// controls when the cached preview is stale and a submit could start.
    /// Cancels the pending recompute.
    ///
    /// The driver runs the job off the event loop and passes the output to
    /// [`accept_render`](Self::accept_render) before
    /// [`begin_submit`](Self::begin_submit), which then finds nothing to flush.
    pub fn take_flush_job(&mut self) -> Option<RenderJob> {
        if !self.live || self.has_applied || self.is_applying || !self.preview_is_stale() {
            return None;
        }
        self.preview.cancel();
        self.render_job()
    }

    /// Cancel any pending recompute and render the current controls now.
    pub fn render_now(&mut self) -> bool {
        self.preview.cancel();
        match self.render_job() {
            Some(job) => {
                let output = job.run();
                self.accept_render(output)
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Idle timers
    // ------------------------------------------------------------------

    /// Report idle escalations due at `now`. Escalations are only reported
    /// while the session is adjusted and not yet applied.
    pub fn poll_timers(&mut self, now: Instant) -> Vec<TimerEvent> {
        if !self.live {
            return Vec::new();
        }
        let fired = self.idle.poll(now);
        if !self.has_adjusted || self.has_applied || self.is_applying {
            return Vec::new();
        }
        fired
            .into_iter()
            .map(|e| match e {
                Escalation::Warn => {
                    warn!(node_id = %self.node_id, generation = self.generation, "Adjustments not applied yet");
                    TimerEvent::IdleWarning
                }
                Escalation::ActScheduled => {
                    info!(node_id = %self.node_id, generation = self.generation, "Auto-apply scheduled");
                    TimerEvent::AutoApplyScheduled
                }
                Escalation::Act => TimerEvent::AutoApplyDue,
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Start a submission of the current preview.
    ///
    /// Idle timers are cancelled first in every case. Already-applied
    /// sessions are rejected with [`SessionError::AlreadyApplied`]; a second
    /// call while one is in flight returns [`SubmitStart::AlreadyInFlight`].
    /// A pending preview recompute is flushed so the payload reflects the
    /// latest controls.
    pub fn begin_submit(&mut self) -> Result<SubmitStart, SessionError> {
        if !self.live {
            return Err(SessionError::TornDown);
        }
        self.idle.cancel();
        if self.has_applied {
            return Err(SessionError::AlreadyApplied);
        }
        if self.is_applying {
            debug!(node_id = %self.node_id, "Submission already in flight");
            return Ok(SubmitStart::AlreadyInFlight);
        }
        if self.preview_is_stale() {
            self.render_now();
        }
        let Some(rendered) = self.rendered.as_ref() else {
            return Err(SessionError::NothingToSubmit);
        };

        let payload = SubmitPayload {
            node_id: self.node_id.clone(),
            adjusted_data: imaging::to_rgba_bytes(rendered),
            width: rendered.width(),
            height: rendered.height(),
        };
        self.is_applying = true;
        info!(
            node_id = %self.node_id,
            generation = self.generation,
            width = payload.width,
            height = payload.height,
            "Submitting adjusted image"
        );
        Ok(SubmitStart::Started(SubmitTicket {
            generation: self.generation,
            payload,
        }))
    }

    /// Record how a submission ended. Always releases the in-flight guard
    /// for the current image; results for a replaced image are ignored.
    pub fn finish_submit(&mut self, generation: u64, result: Result<(), SubmitError>) -> SubmitOutcome {
        if !self.live || generation != self.generation {
            debug!(node_id = %self.node_id, generation, "Ignoring submission result for replaced image");
            return SubmitOutcome::Stale;
        }
        self.is_applying = false;
        match result {
            Ok(()) => {
                self.has_applied = true;
                self.rendered = None;
                self.preview.cancel();
                self.idle.cancel();
                info!(node_id = %self.node_id, generation, "Adjusted image applied");
                SubmitOutcome::Applied
            }
            Err(e) => {
                warn!(node_id = %self.node_id, generation, error = %e, "Submission failed");
                SubmitOutcome::Failed(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Cancel every timer and release the buffers. Nothing is reported after this.
    pub fn teardown(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        self.preview.cancel();
        self.idle.cancel();
        self.source = None;
        self.rendered = None;
        self.is_applying = false;
        info!(node_id = %self.node_id, "Session torn down");
    }
}
