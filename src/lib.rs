//! # live-adjust
//!
//! Realtime image adjustment sessions. A backend pushes an image for a node;
//! the session previews brightness, contrast, saturation and crop/resize
//! changes as the controls move, then submits the approved result back to
//! the backend exactly once.
//!
//! # Architecture: Pure Core, Async Shell
//!
//! ```text
//! backend event ─▶ runtime::Controller ─▶ session::Session ─▶ imaging::render
//!                        │   ▲                  │
//!                        │   └── deadlines ◀── timer
//!                        ▼
//!                  backend::Submitter ─▶ POST /…/apply
//! ```
//!
//! Everything that decides *what* happens is synchronous and takes the clock
//! as an argument: the image engines are pure functions from buffer to buffer,
//! and [`session::Session`] is a state machine that hands out render jobs and
//! submit tickets instead of doing the work itself. The async
//! [`runtime::Controller`] only moves those values between a `tokio::select!`
//! loop, the blocking pool and the network. Tests drive the core directly with
//! synthetic instants, and drive the controller under a paused tokio clock, so
//! the 20 s / 40 s idle timers run instantly and deterministically.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Decode, color engine, geometry engine, preview pipeline, fingerprint |
//! | [`timer`] | Single-slot deadlines, drag debounce, warn → act idle escalation |
//! | [`session`] | Adjustment session state machine: ingest, controls, preview, submit-once |
//! | [`backend`] | `Submitter` trait and the reqwest implementation |
//! | [`runtime`] | Async controller loop, inbound message protocol, observers, preview sinks |
//! | [`types`] | JSON wire types shared with the backend |
//! | [`config`] | `live-adjust.toml` loading, validation, merging |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Always Render From the Source
//!
//! Every preview starts from the untouched ingested buffer and runs color,
//! then geometry. Nothing is ever adjusted twice, so repeated renders with the
//! same controls are byte-identical and the order in which controls were moved
//! does not matter.
//!
//! ## Generations Instead of Cancellation
//!
//! Each ingest bumps a generation counter. Render results and submission
//! outcomes carry the generation they were started under, and anything from an
//! older image is dropped on arrival. This keeps the state machine free of
//! task handles: the controller may abort work early, but correctness never
//! depends on it.
//!
//! ## Submit Once
//!
//! `has_applied` only goes false → true and only a new ingest resets it. A
//! second submit is an explicit rejection (`AlreadyApplied`), distinct from a
//! submit while one is in flight, which is a silent no-op.
//!
//! ## Crop, Never Pad
//!
//! When the requested aspect ratio differs from the source, the source is
//! cropped at the chosen anchor and then scaled. The output is always filled.

pub mod backend;
pub mod config;
pub mod imaging;
pub mod output;
pub mod runtime;
pub mod session;
pub mod timer;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
