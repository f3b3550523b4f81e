//! Accessory model and stream index resolution.
//!
//! Sessions live in flat pre-sized arrays shared across every accessory
//! behind a bridge. All of the index arithmetic is hidden behind
//! [`resolve_stream`]; nothing else in the crate computes offsets by hand.

use std::sync::Arc;

use crate::config::{StreamingCapabilities, SupportedRecordingConfiguration};
use crate::platform::CameraDriver;

/// Service types the engine cares about. Hosts map their attribute
/// database onto these when registering accessories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    RtpStreamManagement,
    CameraOperatingMode,
    CameraRecordingManagement,
    Other,
}

/// One service instance of an accessory, in attribute database order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Service {
    pub iid: u64,
    pub kind: ServiceKind,
}

/// A camera accessory registered with the controller.
///
/// `streams` carries one capability set per
/// [`RtpStreamManagement`](ServiceKind::RtpStreamManagement) service, in
/// the same order the services appear in `services`.
pub struct Accessory {
    pub name: String,
    pub services: Vec<Service>,
    pub streams: Vec<StreamingCapabilities>,
    pub camera: Option<Arc<dyn CameraDriver>>,
    pub recording: Option<SupportedRecordingConfiguration>,
}

impl Accessory {
    /// Number of RTP stream management services this accessory declares.
    pub fn stream_count(&self) -> usize {
        self.services
            .iter()
            .filter(|s| s.kind == ServiceKind::RtpStreamManagement)
            .count()
    }

    /// The platform camera, which must be registered for any accessory
    /// that declares camera services.
    pub fn camera(&self) -> &Arc<dyn CameraDriver> {
        match &self.camera {
            Some(camera) => camera,
            None => panic!("no camera registered for accessory {:?}", self.name),
        }
    }
}

/// A resolved stream identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedStream {
    pub accessory_index: usize,
    /// 0-based index among the accessory's own stream services.
    pub stream_index: usize,
    /// Sum of the stream counts of all preceding accessories.
    pub base_index: usize,
}

impl ResolvedStream {
    /// Flat index into the shared session array.
    pub fn session_index(&self) -> usize {
        self.base_index + self.stream_index
    }
}

/// Total stream count across all accessories; sizes the flat arrays.
pub fn total_streams(accessories: &[Accessory]) -> usize {
    accessories.iter().map(Accessory::stream_count).sum()
}

/// Map (accessory, service iid) to its flat stream identity.
///
/// Scans the accessory's services in declared order, counting only RTP
/// stream management services. An unknown accessory or service, or a
/// service of the wrong kind, is a host configuration bug and panics.
pub fn resolve_stream(
    accessories: &[Accessory],
    accessory_index: usize,
    service_iid: u64,
) -> ResolvedStream {
    let accessory = match accessories.get(accessory_index) {
        Some(a) => a,
        None => panic!("accessory index {accessory_index} out of range"),
    };
    let base_index = accessories[..accessory_index]
        .iter()
        .map(Accessory::stream_count)
        .sum();

    let mut stream_index = 0;
    for service in &accessory.services {
        if service.kind != ServiceKind::RtpStreamManagement {
            if service.iid == service_iid {
                panic!(
                    "service {service_iid} of accessory {:?} is not a stream service",
                    accessory.name
                );
            }
            continue;
        }
        if service.iid == service_iid {
            return ResolvedStream {
                accessory_index,
                stream_index,
                base_index,
            };
        }
        stream_index += 1;
    }
    panic!(
        "service {service_iid} not found on accessory {:?}",
        accessory.name
    );
}
