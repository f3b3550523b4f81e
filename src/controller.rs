//! Engine façade: accessory registry, session storage, timers, events.
//!
//! All mutation happens through `&mut self` on one logical thread; the
//! host's event loop owns the controller and serializes characteristic
//! handlers with timer processing. Timers are plain deadlines: handlers
//! take `now` and the host polls [`CameraController::next_timer_deadline`]
//! / [`CameraController::handle_expired_timers`].

use std::cell::Cell;
use std::collections::VecDeque;
use std::time::Duration;

use crate::accessory::{Accessory, total_streams};
use crate::config::SessionVideoConfiguration;
use crate::matcher::MatchPolicy;
use crate::platform::{EndpointParameters, IpAddress, SrtpParameters, StreamingStatus};

/// Budget for a controller to send Start after a setup commit.
pub const START_TIMEOUT: Duration = Duration::from_secs(30);

/// Budget for a controller to resume a suspended session.
pub const RESUME_TIMEOUT: Duration = Duration::from_secs(300);

/// Identity of one HAP (pairing) session, assigned by the host.
///
/// The host hands out slots `0..max_hap_sessions` and reuses a slot only
/// after calling [`CameraController::invalidate_hap_session`] for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HapSession(pub usize);

/// Characteristic change notifications raised by the engine, drained by
/// the host via [`CameraController::take_events`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    StreamingActive { accessory: usize, service_iid: u64 },
    SelectedRecordingConfiguration { accessory: usize },
    SupportedCameraRecordingConfiguration { accessory: usize },
    SupportedVideoRecordingConfiguration { accessory: usize },
    SupportedAudioRecordingConfiguration { accessory: usize },
    RecordingActive { accessory: usize },
    RecordingAudioActive { accessory: usize },
}

/// A staged endpoint proposal, written by Setup-Endpoints and consumed
/// by the following read. A second write replaces the first.
#[derive(Debug, Clone)]
pub(crate) struct SessionSetup {
    pub session_id: [u8; 16],
    pub controller_address: IpAddress,
    pub video_port: u16,
    pub audio_port: u16,
    pub video_srtp: SrtpParameters,
    pub audio_srtp: SrtpParameters,
}

/// Session-side sub-state while a slot is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionPhase {
    /// Claimed by a setup read, waiting for Start.
    SetUp,
    Active,
    Suspended,
}

/// A bound streaming session occupying one stream slot.
#[derive(Debug, Clone)]
pub(crate) struct StreamingSession {
    pub hap_session: usize,
    pub session_id: [u8; 16],
    pub phase: SessionPhase,
    pub controller: EndpointParameters,
    pub accessory: EndpointParameters,
    /// Video codec configuration saved at Start, checked on Reconfigure.
    pub initial_video: Option<SessionVideoConfiguration>,
    /// Absolute deadline of the armed watchdog, if any.
    pub deadline: Option<Duration>,
}

/// Controller sizing and policy knobs.
#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    /// Number of concurrent HAP session slots the host hands out.
    pub max_hap_sessions: usize,
    pub policy: MatchPolicy,
    /// Byte budget for one TLV characteristic response.
    pub tlv_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            max_hap_sessions: 8,
            policy: MatchPolicy::default(),
            tlv_capacity: 1024,
        }
    }
}

/// The negotiation engine for every camera accessory behind one server.
pub struct CameraController {
    pub(crate) accessories: Vec<Accessory>,
    pub(crate) num_streams: usize,
    pub(crate) max_hap_sessions: usize,
    /// One slot per stream, flat across accessories.
    pub(crate) sessions: Vec<Option<StreamingSession>>,
    /// `hap_session * num_streams + global_stream_index`.
    pub(crate) setups: Vec<Option<SessionSetup>>,
    pub(crate) policy: MatchPolicy,
    pub(crate) tlv_capacity: usize,
    pub(crate) recording_fetch_in_flight: Cell<bool>,
    pub(crate) events: VecDeque<ChangeEvent>,
}

impl CameraController {
    pub fn new(accessories: Vec<Accessory>, config: ControllerConfig) -> Self {
        let num_streams = total_streams(&accessories);
        for accessory in &accessories {
            assert_eq!(
                accessory.streams.len(),
                accessory.stream_count(),
                "accessory {:?} declares {} stream services but {} capability sets",
                accessory.name,
                accessory.stream_count(),
                accessory.streams.len(),
            );
        }
        CameraController {
            accessories,
            num_streams,
            max_hap_sessions: config.max_hap_sessions,
            sessions: (0..num_streams).map(|_| None).collect(),
            setups: (0..config.max_hap_sessions * num_streams)
                .map(|_| None)
                .collect(),
            policy: config.policy,
            tlv_capacity: config.tlv_capacity,
            recording_fetch_in_flight: Cell::new(false),
            events: VecDeque::new(),
        }
    }

    pub fn accessories(&self) -> &[Accessory] {
        &self.accessories
    }

    /// Drain pending characteristic change events.
    pub fn take_events(&mut self) -> Vec<ChangeEvent> {
        self.events.drain(..).collect()
    }

    /// Earliest armed watchdog deadline, for the host's timer wait.
    pub fn next_timer_deadline(&self) -> Option<Duration> {
        self.sessions
            .iter()
            .flatten()
            .filter_map(|session| session.deadline)
            .min()
    }

    /// Tear down every HAP session owning a session whose watchdog has
    /// expired. Equivalent to the controller sending End.
    pub fn handle_expired_timers(&mut self, now: Duration) {
        loop {
            let expired = self.sessions.iter().flatten().find_map(|session| {
                session
                    .deadline
                    .filter(|deadline| *deadline <= now)
                    .map(|_| session.hap_session)
            });
            match expired {
                Some(hap_session) => {
                    tracing::debug!(hap_session, "session watchdog expired");
                    self.invalidate_hap_session(HapSession(hap_session));
                }
                None => return,
            }
        }
    }

    /// Sweep everything a closed HAP session owns: bound streams and
    /// staged setups across all accessories.
    pub fn invalidate_hap_session(&mut self, hap: HapSession) {
        self.check_hap_session(hap);
        for global_index in 0..self.num_streams {
            let owned = matches!(
                &self.sessions[global_index],
                Some(session) if session.hap_session == hap.0
            );
            if owned {
                self.invalidate_stream(global_index);
            }
            let setup_slot = self.setup_index(hap, global_index);
            self.setups[setup_slot] = None;
        }
    }

    /// Whether the HAP session has a started (active or suspended) stream.
    pub fn session_has_active_stream(&self, hap: HapSession) -> bool {
        self.check_hap_session(hap);
        self.sessions.iter().flatten().any(|session| {
            session.hap_session == hap.0 && session.phase != SessionPhase::SetUp
        })
    }

    pub(crate) fn check_hap_session(&self, hap: HapSession) {
        assert!(
            hap.0 < self.max_hap_sessions,
            "HAP session slot {} out of range (max {})",
            hap.0,
            self.max_hap_sessions,
        );
    }

    pub(crate) fn setup_index(&self, hap: HapSession, global_stream_index: usize) -> usize {
        hap.0 * self.num_streams + global_stream_index
    }

    /// Map a flat session index back to (accessory index, local stream).
    pub(crate) fn locate_stream(&self, global_index: usize) -> (usize, usize) {
        let mut base = 0;
        for (accessory_index, accessory) in self.accessories.iter().enumerate() {
            let count = accessory.stream_count();
            if global_index < base + count {
                return (accessory_index, global_index - base);
            }
            base += count;
        }
        panic!("stream index {global_index} out of range");
    }

    /// End platform streaming, release the slot and drop the binding.
    pub(crate) fn invalidate_stream(&mut self, global_index: usize) {
        let Some(session) = self.sessions[global_index].take() else {
            return;
        };
        let (accessory_index, stream_index) = self.locate_stream(global_index);
        tracing::debug!(
            accessory = accessory_index,
            stream = stream_index,
            phase = ?session.phase,
            "invalidating streaming session",
        );
        let camera = self.accessories[accessory_index].camera().clone();
        if session.phase != SessionPhase::SetUp {
            camera.end_streaming_session(stream_index);
        }
        if let Err(err) = camera.try_set_stream_status(stream_index, StreamingStatus::Available) {
            tracing::error!(
                accessory = accessory_index,
                stream = stream_index,
                %err,
                "failed to release stream slot",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::accessory::{Service, ServiceKind};
    use crate::platform::mock::MockCamera;
    use crate::platform::{CameraDriver, IpVersion, MediaEndpoint};

    fn accessory(camera: Arc<MockCamera>) -> Accessory {
        Accessory {
            name: "test cam".into(),
            services: vec![Service {
                iid: 10,
                kind: ServiceKind::RtpStreamManagement,
            }],
            streams: vec![crate::config::StreamingCapabilities::default()],
            camera: Some(camera),
            recording: None,
        }
    }

    fn endpoint() -> EndpointParameters {
        EndpointParameters {
            address: IpAddress {
                version: IpVersion::V4,
                address: "10.0.0.2".into(),
            },
            video: MediaEndpoint {
                port: 5000,
                srtp: SrtpParameters::disabled(),
                ssrc: 1,
            },
            audio: MediaEndpoint {
                port: 5002,
                srtp: SrtpParameters::disabled(),
                ssrc: 2,
            },
        }
    }

    #[test]
    fn timer_expiry_sweeps_the_owning_session() {
        let camera = Arc::new(MockCamera::new(1));
        let mut controller =
            CameraController::new(vec![accessory(camera.clone())], ControllerConfig::default());
        camera
            .try_set_stream_status(0, StreamingStatus::InUse)
            .unwrap();
        controller.sessions[0] = Some(StreamingSession {
            hap_session: 3,
            session_id: [0; 16],
            phase: SessionPhase::SetUp,
            controller: endpoint(),
            accessory: endpoint(),
            initial_video: None,
            deadline: Some(Duration::from_secs(30)),
        });

        assert_eq!(
            controller.next_timer_deadline(),
            Some(Duration::from_secs(30))
        );
        controller.handle_expired_timers(Duration::from_secs(29));
        assert!(controller.sessions[0].is_some());

        controller.handle_expired_timers(Duration::from_secs(30));
        assert!(controller.sessions[0].is_none());
        assert_eq!(controller.next_timer_deadline(), None);
        assert_eq!(camera.status(0), StreamingStatus::Available);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn oversized_hap_slot_is_a_contract_violation() {
        let camera = Arc::new(MockCamera::new(1));
        let controller =
            CameraController::new(vec![accessory(camera)], ControllerConfig::default());
        controller.check_hap_session(HapSession(8));
    }
}
