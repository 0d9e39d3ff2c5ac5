//! End-to-end session behavior through the public API: controller loop,
//! paused tokio clock, scripted backend.

use live_adjust::backend::{SubmitError, Submitter};
use live_adjust::config::AdjustConfig;
use live_adjust::imaging::codec::encode_png_data_url;
use live_adjust::imaging::{
    self, Adjustment, AdjustmentParameters, CropAnchor, GeometryOptions, GeometrySpec,
    PixelBuffer, Resample,
};
use live_adjust::runtime::{Controller, Message, RunReport, SessionEvent};
use live_adjust::types::SubmitPayload;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const EVENT: &str = "realtime_image_adjust_update";

// =========================================================================
// Harness
// =========================================================================

#[derive(Default)]
struct ScriptedBackend {
    payloads: Mutex<Vec<SubmitPayload>>,
    outcomes: Mutex<VecDeque<Result<(), SubmitError>>>,
}

impl ScriptedBackend {
    fn with_outcomes(outcomes: Vec<Result<(), SubmitError>>) -> Arc<Self> {
        Arc::new(Self {
            payloads: Mutex::new(Vec::new()),
            outcomes: Mutex::new(outcomes.into()),
        })
    }

    fn calls(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }
}

impl Submitter for ScriptedBackend {
    async fn submit(&self, payload: &SubmitPayload) -> Result<(), SubmitError> {
        self.payloads.lock().unwrap().push(payload.clone());
        self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

struct Harness {
    tx: mpsc::Sender<Message>,
    task: JoinHandle<RunReport>,
    events: Arc<Mutex<Vec<SessionEvent>>>,
    backend: Arc<ScriptedBackend>,
}

impl Harness {
    fn start(backend: Arc<ScriptedBackend>) -> Self {
        let events: Arc<Mutex<Vec<SessionEvent>>> = Arc::default();
        let log = Arc::clone(&events);
        let controller = Controller::from_config("42", &AdjustConfig::default(), Arc::clone(&backend))
            .observe(move |_: &str, e: &SessionEvent| log.lock().unwrap().push(e.clone()));
        let (tx, rx) = mpsc::channel(32);
        let task = tokio::spawn(controller.run(rx));
        Self {
            tx,
            task,
            events,
            backend,
        }
    }

    async fn send(&self, message: Message) {
        self.tx.send(message).await.unwrap();
        // Let the controller drain the inbox before the clock moves.
        tokio::task::yield_now().await;
    }

    async fn ingest(&self, image: &PixelBuffer) {
        self.send(Message::Event {
            name: EVENT.into(),
            detail: serde_json::json!({
                "node_id": "42",
                "image_data": encode_png_data_url(image).unwrap(),
            }),
        })
        .await;
    }

    fn count(&self, pred: impl Fn(&SessionEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    async fn finish(self) -> (RunReport, Vec<SessionEvent>) {
        self.tx.send(Message::Teardown).await.unwrap();
        let report = self.task.await.unwrap();
        let events = self.events.lock().unwrap().clone();
        (report, events)
    }
}

fn gradient(width: u32, height: u32) -> PixelBuffer {
    PixelBuffer::from_fn(width, height, |x, y| {
        image::Rgb([(x * 255 / (width - 1)) as u8, (y * 255 / (height - 1)) as u8, 96])
    })
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

// =========================================================================
// Idle escalation
// =========================================================================

#[tokio::test(start_paused = true)]
async fn idle_adjustment_warns_then_auto_applies_exactly_once() {
    let h = Harness::start(ScriptedBackend::with_outcomes(vec![]));
    h.ingest(&gradient(32, 16)).await;
    h.send(Message::SetAdjustment {
        name: Adjustment::Saturation,
        value: 1.6,
    })
    .await;

    tokio::time::sleep(Duration::from_secs(19)).await;
    assert_eq!(h.count(|e| *e == SessionEvent::IdleWarning), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.count(|e| *e == SessionEvent::IdleWarning), 1);

    tokio::time::sleep(Duration::from_millis(19_500)).await;
    assert_eq!(h.count(|e| *e == SessionEvent::AutoApplyScheduled), 1);
    assert_eq!(h.backend.calls(), 0, "grace delay not over yet");

    tokio::time::sleep(Duration::from_secs(120)).await;
    let backend = Arc::clone(&h.backend);
    let (report, events) = h.finish().await;

    assert!(report.applied);
    assert_eq!(backend.calls(), 1);
    assert_eq!(events.iter().filter(|e| **e == SessionEvent::Applied).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn continued_adjustment_postpones_escalation() {
    let h = Harness::start(ScriptedBackend::with_outcomes(vec![]));
    h.ingest(&gradient(16, 16)).await;
    for value in [1.1, 1.2, 1.3] {
        h.send(Message::SetAdjustment {
            name: Adjustment::Brightness,
            value,
        })
        .await;
        tokio::time::sleep(Duration::from_secs(15)).await;
    }
    // 45s since the first change, 15s since the last one.
    assert_eq!(h.count(|e| *e == SessionEvent::IdleWarning), 0);
    assert_eq!(h.backend.calls(), 0);
    h.finish().await;
}

#[tokio::test(start_paused = true)]
async fn untouched_image_is_never_auto_applied() {
    let h = Harness::start(ScriptedBackend::with_outcomes(vec![]));
    h.ingest(&gradient(16, 16)).await;
    h.send(Message::ResetColor).await;
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.backend.calls(), 0);
    assert_eq!(h.count(|e| *e == SessionEvent::IdleWarning), 0);
    h.finish().await;
}

#[tokio::test(start_paused = true)]
async fn teardown_stops_pending_timers() {
    let h = Harness::start(ScriptedBackend::with_outcomes(vec![]));
    h.ingest(&gradient(16, 16)).await;
    h.send(Message::SetAdjustment {
        name: Adjustment::Contrast,
        value: 2.0,
    })
    .await;
    let backend = Arc::clone(&h.backend);
    let events_handle = Arc::clone(&h.events);
    let (report, events) = h.finish().await;

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(!report.applied);
    assert_eq!(backend.calls(), 0);
    assert_eq!(events.last(), Some(&SessionEvent::TornDown));
    assert_eq!(events_handle.lock().unwrap().len(), events.len());
}

// =========================================================================
// Submission
// =========================================================================

#[tokio::test(start_paused = true)]
async fn second_submit_is_rejected_without_backend_call() {
    let h = Harness::start(ScriptedBackend::with_outcomes(vec![]));
    h.ingest(&gradient(20, 10)).await;
    h.send(Message::Submit).await;
    settle().await;
    h.send(Message::Submit).await;
    settle().await;

    assert_eq!(h.backend.calls(), 1);
    assert_eq!(h.count(|e| *e == SessionEvent::Applied), 1);
    assert_eq!(
        h.count(|e| matches!(e, SessionEvent::SubmitRejected { reason } if reason.contains("already"))),
        1
    );
    h.finish().await;
}

#[tokio::test(start_paused = true)]
async fn failed_submit_can_be_retried() {
    let h = Harness::start(ScriptedBackend::with_outcomes(vec![
        Err(SubmitError::Rejected(Some("queue full".into()))),
        Ok(()),
    ]));
    h.ingest(&gradient(20, 10)).await;
    h.send(Message::Submit).await;
    settle().await;
    assert_eq!(
        h.count(|e| matches!(e, SessionEvent::SubmitFailed { reason } if reason.contains("queue full"))),
        1
    );

    h.send(Message::Submit).await;
    settle().await;
    let backend = Arc::clone(&h.backend);
    let (report, _) = h.finish().await;
    assert!(report.applied);
    assert_eq!(backend.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn new_image_allows_another_submission() {
    let h = Harness::start(ScriptedBackend::with_outcomes(vec![]));
    h.ingest(&gradient(8, 8)).await;
    h.send(Message::Submit).await;
    settle().await;
    h.ingest(&gradient(12, 6)).await;
    h.send(Message::Submit).await;
    settle().await;

    let backend = Arc::clone(&h.backend);
    let (report, _) = h.finish().await;
    assert_eq!(report.images, 2);
    assert!(report.applied);
    let payloads = backend.payloads.lock().unwrap().clone();
    assert_eq!(payloads.len(), 2);
    assert_eq!((payloads[1].width, payloads[1].height), (12, 6));
}

#[tokio::test(start_paused = true)]
async fn submitted_payload_matches_pipeline_output() {
    let source = gradient(200, 100);
    let h = Harness::start(ScriptedBackend::with_outcomes(vec![]));
    h.ingest(&source).await;
    h.send(Message::SetAdjustment {
        name: Adjustment::Brightness,
        value: 1.25,
    })
    .await;
    h.send(Message::SetTargetWidth { value: 100 }).await;
    h.send(Message::Submit).await;
    settle().await;

    let backend = Arc::clone(&h.backend);
    h.finish().await;
    let payload = backend.payloads.lock().unwrap()[0].clone();
    assert_eq!(payload.node_id, "42");
    assert_eq!((payload.width, payload.height), (100, 50));

    let expected = imaging::render(
        &source,
        &AdjustmentParameters {
            brightness: 1.25,
            ..AdjustmentParameters::default()
        },
        &GeometrySpec {
            target_width: 100,
            target_height: 50,
            ..GeometrySpec::default()
        },
        &GeometryOptions::default(),
    );
    assert_eq!(payload.adjusted_data, imaging::to_rgba_bytes(&expected));
}

// =========================================================================
// Preview
// =========================================================================

#[tokio::test(start_paused = true)]
async fn foreign_node_events_are_ignored() {
    let h = Harness::start(ScriptedBackend::with_outcomes(vec![]));
    h.send(Message::Event {
        name: EVENT.into(),
        detail: serde_json::json!({
            "node_id": 41,
            "image_data": encode_png_data_url(&gradient(8, 8)).unwrap(),
        }),
    })
    .await;
    settle().await;
    assert!(h.events().is_empty());
    let (report, _) = h.finish().await;
    assert_eq!(report.images, 0);
}

#[tokio::test(start_paused = true)]
async fn left_anchor_crop_preview() {
    let h = Harness::start(ScriptedBackend::with_outcomes(vec![]));
    h.ingest(&gradient(100, 100)).await;
    h.send(Message::SetKeepAspect { value: false }).await;
    h.send(Message::SetTargetWidth { value: 50 }).await;
    h.send(Message::SetTargetHeight { value: 100 }).await;
    h.send(Message::SetCropAnchor {
        value: CropAnchor::Left,
    })
    .await;
    settle().await;

    let last_preview = h
        .events()
        .into_iter()
        .rev()
        .find_map(|e| match e {
            SessionEvent::PreviewRendered {
                width,
                height,
                fingerprint,
            } => Some((width, height, fingerprint)),
            _ => None,
        })
        .unwrap();

    let expected = imaging::apply_geometry(
        &gradient(100, 100),
        &GeometrySpec {
            target_width: 50,
            target_height: 100,
            keep_aspect: false,
            anchor: CropAnchor::Left,
        },
        &GeometryOptions {
            aspect_tolerance: 0.01,
            resample: Resample::Triangle,
            ..GeometryOptions::default()
        },
    );
    assert_eq!((last_preview.0, last_preview.1), (50, 100));
    assert_eq!(last_preview.2, imaging::fingerprint(&expected));
    h.finish().await;
}

#[tokio::test(start_paused = true)]
async fn drag_coalesces_previews() {
    let h = Harness::start(ScriptedBackend::with_outcomes(vec![]));
    h.ingest(&gradient(64, 64)).await;
    settle().await;
    let before = h.count(|e| matches!(e, SessionEvent::PreviewRendered { .. }));

    h.send(Message::DragStart).await;
    for i in 0..10 {
        h.send(Message::SetAdjustment {
            name: Adjustment::Brightness,
            value: 1.0 + i as f64 * 0.05,
        })
        .await;
        tokio::time::sleep(Duration::from_millis(4)).await;
    }
    h.send(Message::DragEnd).await;
    settle().await;

    // 40ms of dragging at a 50ms throttle, plus the catch-up render.
    let during = h.count(|e| matches!(e, SessionEvent::PreviewRendered { .. })) - before;
    assert!(during <= 2, "rendered {during} previews while dragging");
    assert!(during >= 1);
    h.finish().await;
}
