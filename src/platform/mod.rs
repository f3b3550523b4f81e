//! Platform camera driver boundary.
//!
//! The engine never touches pipelines, sockets or storage itself; it
//! negotiates and then drives a [`CameraDriver`]. Drivers present `&self`
//! interfaces and own their interior mutability (see
//! [`mock::MockCamera`] for a reference implementation).

pub mod mock;

use std::fmt;

use rand::Rng;

use crate::config::{
    CryptoSuite, RecordingConfiguration, SelectedAudioParameters, SelectedVideoParameters,
    VideoAttributes,
};
use crate::error::Result;

/// IP address family of a negotiated endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub const fn wire(self) -> u8 {
        match self {
            Self::V4 => 0,
            Self::V6 => 1,
        }
    }

    pub fn from_wire(raw: u8) -> crate::error::Result<Self> {
        match raw {
            0 => Ok(Self::V4),
            1 => Ok(Self::V6),
            _ => Err(crate::error::CameraError::InvalidData),
        }
    }

    /// Maximum textual address length, excluding the terminator.
    pub const fn max_address_len(self) -> usize {
        match self {
            Self::V4 => 15,
            Self::V6 => 45,
        }
    }
}

/// Textual IP address with its family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAddress {
    pub version: IpVersion,
    pub address: String,
}

/// SRTP master key material for one direction of one channel.
#[derive(Clone, PartialEq, Eq)]
pub struct SrtpParameters {
    pub suite: CryptoSuite,
    pub key: Vec<u8>,
    pub salt: Vec<u8>,
}

impl SrtpParameters {
    pub fn disabled() -> Self {
        SrtpParameters {
            suite: CryptoSuite::Disabled,
            key: Vec::new(),
            salt: Vec::new(),
        }
    }

    /// Generate fresh key material for the suite from the CSPRNG.
    pub fn generate(suite: CryptoSuite) -> Self {
        let mut key = vec![0u8; suite.key_len()];
        let mut salt = vec![0u8; suite.salt_len()];
        rand::rng().fill_bytes(&mut key);
        rand::rng().fill_bytes(&mut salt);
        SrtpParameters { suite, key, salt }
    }
}

// Key material must not leak through Debug formatting.
impl fmt::Debug for SrtpParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SrtpParameters")
            .field("suite", &self.suite)
            .field("key_len", &self.key.len())
            .field("salt_len", &self.salt.len())
            .finish()
    }
}

/// Port, SRTP material and SSRC for one media channel of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEndpoint {
    pub port: u16,
    pub srtp: SrtpParameters,
    pub ssrc: u32,
}

/// One side (controller or accessory) of a streaming session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointParameters {
    pub address: IpAddress,
    pub video: MediaEndpoint,
    pub audio: MediaEndpoint,
}

/// Streaming slot status as exposed by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingStatus {
    Available,
    InUse,
    Unavailable,
}

impl StreamingStatus {
    pub const fn wire(self) -> u8 {
        match self {
            Self::Available => 0,
            Self::InUse => 1,
            Self::Unavailable => 2,
        }
    }
}

/// Fully negotiated parameters handed to the driver on Start.
#[derive(Debug, Clone, PartialEq)]
pub struct StartConfiguration {
    pub video: SelectedVideoParameters,
    pub audio: SelectedAudioParameters,
}

/// Video parameters handed to the driver on Reconfigure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconfigureConfiguration {
    pub attributes: VideoAttributes,
    /// Maximum bit rate in kbit/s.
    pub max_bit_rate: u16,
    /// Minimum RTCP interval in seconds.
    pub min_rtcp_interval: f32,
}

/// The platform camera behind one accessory.
///
/// Stream indices are per camera, 0-based, in the order the accessory
/// declares its RTP stream management services. Methods return
/// [`Unknown`](crate::error::CameraError::Unknown) for platform failures.
pub trait CameraDriver: Send + Sync {
    fn stream_status(&self, stream_index: usize) -> StreamingStatus;

    /// Attempt a status transition; claiming a slot that is not available
    /// fails with [`InvalidState`](crate::error::CameraError::InvalidState).
    fn try_set_stream_status(&self, stream_index: usize, status: StreamingStatus) -> Result<()>;

    fn is_streaming_active(&self, stream_index: usize) -> Result<bool>;
    fn set_streaming_active(&self, stream_index: usize, active: bool) -> Result<()>;

    fn is_homekit_camera_active(&self) -> Result<bool>;
    /// Whether a non-HomeKit consumer currently uses the camera. Read
    /// back through the operating mode service; it does not gate HAP
    /// streaming.
    fn is_third_party_camera_active(&self) -> Result<bool>;
    fn is_manually_disabled(&self) -> Result<bool>;

    /// Pick the local address and RTP ports for a session towards the
    /// given controller. Returns `(address, video_port, audio_port)`.
    fn streaming_session_endpoint(
        &self,
        stream_index: usize,
        controller_address: &IpAddress,
    ) -> Result<(IpAddress, u16, u16)>;

    fn start_streaming_session(
        &self,
        stream_index: usize,
        controller: &EndpointParameters,
        accessory: &EndpointParameters,
        configuration: &StartConfiguration,
    ) -> Result<()>;

    fn suspend_streaming_session(&self, stream_index: usize) -> Result<()>;
    fn resume_streaming_session(&self, stream_index: usize) -> Result<()>;

    fn reconfigure_streaming_session(
        &self,
        stream_index: usize,
        configuration: &ReconfigureConfiguration,
    ) -> Result<()>;

    fn end_streaming_session(&self, stream_index: usize);

    fn recording_configuration(&self) -> Result<Option<RecordingConfiguration>>;
    fn set_recording_configuration(&self, configuration: &RecordingConfiguration) -> Result<()>;
    fn invalidate_recording_configuration(&self) -> Result<()>;

    fn is_recording_active(&self) -> Result<bool>;
    fn set_recording_active(&self, active: bool) -> Result<()>;

    fn is_recording_audio_active(&self) -> Result<bool>;
    fn set_recording_audio_active(&self, active: bool) -> Result<()>;
}
