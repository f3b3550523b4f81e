//! HomeKit camera streaming and recording negotiation engine.
//!
//! The crate sits between an accessory server's characteristic dispatch
//! and a platform camera driver: it decodes the TLV payloads of the RTP
//! stream management and recording management services, matches selected
//! configurations against advertised capabilities, drives the per-stream
//! session lifecycle (Setup, Start, Suspend, Resume, Reconfigure, End)
//! with liveness watchdogs, and negotiates event-recording
//! configurations.
//!
//! The host owns the run loop: it routes characteristic reads/writes to
//! the [`CameraController`] handlers, polls
//! [`CameraController::next_timer_deadline`], and drains change events
//! with [`CameraController::take_events`].

pub mod accessory;
pub mod config;
pub mod controller;
pub mod error;
pub mod matcher;
pub mod platform;
pub mod recording;
pub mod streaming;
pub mod tlv;

pub use accessory::{Accessory, ResolvedStream, Service, ServiceKind, resolve_stream};
pub use controller::{CameraController, ChangeEvent, ControllerConfig, HapSession};
pub use error::{CameraError, Result};
pub use matcher::MatchPolicy;
pub use platform::CameraDriver;
