//! Typed configuration model shared by streaming and recording.
//!
//! Each wire enum exists in two forms: a single selected value and a
//! bitmask set describing what the accessory supports. The wire values
//! follow HomeKit Accessory Protocol R17 (Tables 104, 1042 and friends);
//! the set bits are internal.

use crate::error::{CameraError, Result};

macro_rules! value_set {
    ($(#[$meta:meta])* $set:ident, $value:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $set(u8);

        impl $set {
            pub const EMPTY: Self = Self(0);

            pub fn of(values: &[$value]) -> Self {
                let mut set = Self(0);
                for v in values {
                    set.0 |= v.bit();
                }
                set
            }

            pub fn contains(self, value: $value) -> bool {
                self.0 & value.bit() != 0
            }

            pub fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// Whether every member of `other` is also in `self`.
            pub fn is_superset_of(self, other: $set) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn iter(self) -> impl Iterator<Item = $value> {
                <$value>::ALL.into_iter().filter(move |v| self.contains(*v))
            }
        }
    };
}

/// Video codec kinds. H.264 is the only codec HAP R17 defines for both
/// streaming and recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
}

impl VideoCodec {
    pub const fn wire(self) -> u8 {
        0
    }

    pub fn from_wire(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(VideoCodec::H264),
            _ => Err(CameraError::InvalidData),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum H264Profile {
    ConstrainedBaseline,
    Main,
    High,
}

impl H264Profile {
    pub const ALL: [Self; 3] = [Self::ConstrainedBaseline, Self::Main, Self::High];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub const fn wire(self) -> u8 {
        self as u8
    }

    pub fn from_wire(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::ConstrainedBaseline),
            1 => Ok(Self::Main),
            2 => Ok(Self::High),
            _ => Err(CameraError::InvalidData),
        }
    }
}

value_set!(
    /// Set of supported H.264 profiles.
    H264ProfileSet,
    H264Profile
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum H264Level {
    V3_1,
    V3_2,
    V4,
}

impl H264Level {
    pub const ALL: [Self; 3] = [Self::V3_1, Self::V3_2, Self::V4];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub const fn wire(self) -> u8 {
        self as u8
    }

    pub fn from_wire(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::V3_1),
            1 => Ok(Self::V3_2),
            2 => Ok(Self::V4),
            _ => Err(CameraError::InvalidData),
        }
    }

    /// Maximum frame size the level supports (ITU-T H.264 Table A-1,
    /// MaxFS × 256 pixels).
    pub const fn pixel_limit(self) -> u32 {
        match self {
            Self::V3_1 => 921_600,
            Self::V3_2 => 1_310_720,
            Self::V4 => 2_097_152,
        }
    }
}

value_set!(
    /// Set of supported H.264 profile levels.
    H264LevelSet,
    H264Level
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketizationMode {
    /// Non-interleaved mode (RFC 6184 §5.2).
    NonInterleaved,
}

impl PacketizationMode {
    pub const ALL: [Self; 1] = [Self::NonInterleaved];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub const fn wire(self) -> u8 {
        self as u8
    }

    pub fn from_wire(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::NonInterleaved),
            _ => Err(CameraError::InvalidData),
        }
    }
}

value_set!(PacketizationModeSet, PacketizationMode);

/// Audio codec kinds across streaming and recording.
///
/// The wire value differs between the streaming and recording TLV
/// vocabularies, and not every codec is valid in both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    AacLc,
    AacEld,
    Opus,
    Amr,
    AmrWb,
}

impl AudioCodec {
    pub const ALL: [Self; 5] = [Self::AacLc, Self::AacEld, Self::Opus, Self::Amr, Self::AmrWb];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub fn streaming_wire(self) -> Option<u8> {
        match self {
            Self::AacEld => Some(2),
            Self::Opus => Some(3),
            Self::Amr => Some(5),
            Self::AmrWb => Some(6),
            Self::AacLc => None,
        }
    }

    pub fn recording_wire(self) -> Option<u8> {
        match self {
            Self::AacLc => Some(0),
            Self::AacEld => Some(1),
            _ => None,
        }
    }

    pub fn from_streaming_wire(raw: u8) -> Result<Self> {
        match raw {
            2 => Ok(Self::AacEld),
            3 => Ok(Self::Opus),
            5 => Ok(Self::Amr),
            6 => Ok(Self::AmrWb),
            _ => Err(CameraError::InvalidData),
        }
    }

    pub fn from_recording_wire(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::AacLc),
            1 => Ok(Self::AacEld),
            _ => Err(CameraError::InvalidData),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitRateMode {
    Variable,
    Constant,
}

impl BitRateMode {
    pub const ALL: [Self; 2] = [Self::Variable, Self::Constant];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub const fn wire(self) -> u8 {
        self as u8
    }

    pub fn from_wire(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::Variable),
            1 => Ok(Self::Constant),
            _ => Err(CameraError::InvalidData),
        }
    }
}

value_set!(BitRateModeSet, BitRateMode);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRate {
    Khz8,
    Khz16,
    Khz24,
    Khz32,
    Khz44_1,
    Khz48,
}

impl SampleRate {
    pub const ALL: [Self; 6] = [
        Self::Khz8,
        Self::Khz16,
        Self::Khz24,
        Self::Khz32,
        Self::Khz44_1,
        Self::Khz48,
    ];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub const fn wire(self) -> u8 {
        self as u8
    }

    /// Streaming only defines 8, 16 and 24 kHz.
    pub fn from_streaming_wire(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::Khz8),
            1 => Ok(Self::Khz16),
            2 => Ok(Self::Khz24),
            _ => Err(CameraError::InvalidData),
        }
    }

    pub fn from_recording_wire(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::Khz8),
            1 => Ok(Self::Khz16),
            2 => Ok(Self::Khz24),
            3 => Ok(Self::Khz32),
            4 => Ok(Self::Khz44_1),
            5 => Ok(Self::Khz48),
            _ => Err(CameraError::InvalidData),
        }
    }
}

value_set!(SampleRateSet, SampleRate);

/// SRTP crypto suites (HAP R17 §11.68).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoSuite {
    AesCm128HmacSha1_80,
    Aes256CmHmacSha1_80,
    Disabled,
}

impl CryptoSuite {
    pub const ALL: [Self; 3] = [
        Self::AesCm128HmacSha1_80,
        Self::Aes256CmHmacSha1_80,
        Self::Disabled,
    ];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub const fn wire(self) -> u8 {
        self as u8
    }

    pub fn from_wire(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::AesCm128HmacSha1_80),
            1 => Ok(Self::Aes256CmHmacSha1_80),
            2 => Ok(Self::Disabled),
            _ => Err(CameraError::InvalidData),
        }
    }

    /// SRTP master key length in bytes.
    pub const fn key_len(self) -> usize {
        match self {
            Self::AesCm128HmacSha1_80 => 16,
            Self::Aes256CmHmacSha1_80 => 32,
            Self::Disabled => 0,
        }
    }

    /// SRTP master salt length in bytes.
    pub const fn salt_len(self) -> usize {
        match self {
            Self::Disabled => 0,
            _ => 14,
        }
    }
}

value_set!(CryptoSuiteSet, CryptoSuite);

/// Recording event triggers. The wire form is a u64 bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTrigger {
    Motion,
    Doorbell,
}

impl EventTrigger {
    pub const ALL: [Self; 2] = [Self::Motion, Self::Doorbell];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

value_set!(EventTriggerSet, EventTrigger);

impl EventTriggerSet {
    pub fn wire_bits(self) -> u64 {
        self.0 as u64
    }

    /// Decode the wire bitmask, rejecting unknown bits.
    pub fn from_wire_bits(raw: u64) -> Result<Self> {
        if raw & !0b11 != 0 {
            return Err(CameraError::InvalidData);
        }
        Ok(Self(raw as u8))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoAttributes {
    pub width: u16,
    pub height: u16,
    pub max_frame_rate: u8,
}

impl VideoAttributes {
    pub fn pixels(&self) -> u32 {
        self.width as u32 * self.height as u32
    }
}

/// H.264 parameters on the supported side: masks plus optional upper
/// bounds (zero means unconstrained).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedH264Parameters {
    pub profiles: H264ProfileSet,
    pub levels: H264LevelSet,
    pub packetization_modes: PacketizationModeSet,
    /// Maximum bit rate in kbit/s, 0 = unconstrained.
    pub max_bit_rate: u32,
    /// Maximum I-frame interval in ms, 0 = unconstrained.
    pub max_i_frame_interval: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedVideoCodec {
    H264(SupportedH264Parameters),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedVideoConfiguration {
    pub codec: SupportedVideoCodec,
    pub attributes: Vec<VideoAttributes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedAudioConfiguration {
    pub codec: AudioCodec,
    pub channels: u8,
    pub bit_rate_modes: BitRateModeSet,
    pub sample_rates: SampleRateSet,
    /// Maximum bit rate in kbit/s, 0 = unconstrained (recording only).
    pub max_bit_rate: u32,
}

/// Everything one RTP stream management service advertises.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamingCapabilities {
    pub video: Vec<SupportedVideoConfiguration>,
    pub audio: Vec<SupportedAudioConfiguration>,
    pub comfort_noise: bool,
    pub srtp_crypto_suites: CryptoSuiteSet,
}

/// H.264 parameters on the selected side: single values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedH264Parameters {
    pub profile: H264Profile,
    pub level: H264Level,
    pub packetization_mode: PacketizationMode,
    /// Target bit rate in kbit/s.
    pub bit_rate: u32,
    /// Requested I-frame interval in ms.
    pub i_frame_interval: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectedVideoCodec {
    H264(SelectedH264Parameters),
}

/// RTP parameters selected for the video channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoRtpParameters {
    pub payload_type: u8,
    pub ssrc: u32,
    /// Maximum bit rate in kbit/s.
    pub max_bit_rate: u16,
    /// Minimum RTCP interval in seconds.
    pub min_rtcp_interval: f32,
    /// Maximum MTU in bytes; 0 selects the per-IP-version default.
    pub max_mtu: u16,
}

/// RTP parameters selected for the audio channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioRtpParameters {
    pub payload_type: u8,
    pub ssrc: u32,
    pub max_bit_rate: u16,
    pub min_rtcp_interval: f32,
    /// Present iff comfort noise was selected.
    pub comfort_noise_payload_type: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedVideoParameters {
    pub codec: SelectedVideoCodec,
    pub attributes: VideoAttributes,
    pub rtp: VideoRtpParameters,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedAudioParameters {
    pub codec: AudioCodec,
    pub channels: u8,
    pub bit_rate_mode: BitRateMode,
    pub sample_rate: SampleRate,
    /// Packet time in ms; 20, 30, 40 or 60.
    pub rtp_time: u8,
    pub rtp: AudioRtpParameters,
    pub comfort_noise: bool,
}

/// Video codec configuration retained when a session starts, used to
/// re-validate Reconfigure requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionVideoConfiguration {
    pub codec: VideoCodec,
    pub profile: H264Profile,
    pub level: H264Level,
    pub packetization_mode: PacketizationMode,
}

/// Media container configuration for recordings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerConfiguration {
    FragmentedMp4 {
        /// Fragment duration in ms (an upper bound on the supported side).
        fragment_duration_ms: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedRecordingParameters {
    pub prebuffer_duration_ms: u32,
    pub event_trigger_types: EventTriggerSet,
    pub containers: Vec<ContainerConfiguration>,
}

/// Everything the accessory advertises for event recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedRecordingConfiguration {
    pub recording: SupportedRecordingParameters,
    pub video: Vec<SupportedVideoConfiguration>,
    pub audio: Vec<SupportedAudioConfiguration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingParameters {
    pub prebuffer_duration_ms: u32,
    pub event_trigger_types: EventTriggerSet,
    pub container: ContainerConfiguration,
}

/// H.264 parameters selected for recording. Unlike streaming, recording
/// carries no packetization mode, and bit rate and I-frame interval are
/// explicit TLV fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingH264Parameters {
    pub profile: H264Profile,
    pub level: H264Level,
    /// Selected bit rate in kbit/s.
    pub bit_rate: u32,
    /// Selected I-frame interval in ms.
    pub i_frame_interval: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingVideoCodec {
    H264(RecordingH264Parameters),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingVideoParameters {
    pub codec: RecordingVideoCodec,
    pub attributes: VideoAttributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingAudioParameters {
    pub codec: AudioCodec,
    pub channels: u8,
    pub bit_rate_mode: BitRateMode,
    pub sample_rate: SampleRate,
    /// Selected bit rate in kbit/s.
    pub bit_rate: u32,
}

/// A controller-selected recording configuration.
///
/// Structural equality is what makes repeated selected-configuration
/// writes idempotent, so everything here derives `PartialEq`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingConfiguration {
    pub recording: RecordingParameters,
    pub video: RecordingVideoParameters,
    pub audio: RecordingAudioParameters,
}

/// Which parts of the supported recording configuration changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingChange {
    Camera,
    Video,
    Audio,
}

impl RecordingChange {
    pub const ALL: [Self; 3] = [Self::Camera, Self::Video, Self::Audio];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

value_set!(RecordingChangeSet, RecordingChange);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_set_membership() {
        let set = H264ProfileSet::of(&[H264Profile::ConstrainedBaseline, H264Profile::Main]);
        assert!(set.contains(H264Profile::Main));
        assert!(!set.contains(H264Profile::High));
        assert_eq!(set.iter().count(), 2);
    }

    #[test]
    fn level_pixel_limits() {
        assert_eq!(H264Level::V3_1.pixel_limit(), 921_600);
        assert_eq!(H264Level::V3_2.pixel_limit(), 1_310_720);
        assert_eq!(H264Level::V4.pixel_limit(), 2_097_152);
    }

    #[test]
    fn audio_codec_wire_values_differ_per_vocabulary() {
        assert_eq!(AudioCodec::AacEld.streaming_wire(), Some(2));
        assert_eq!(AudioCodec::AacEld.recording_wire(), Some(1));
        assert_eq!(AudioCodec::AacLc.streaming_wire(), None);
        assert_eq!(AudioCodec::from_recording_wire(0).unwrap(), AudioCodec::AacLc);
        assert!(AudioCodec::from_streaming_wire(0).is_err());
    }

    #[test]
    fn sample_rate_streaming_subset() {
        assert!(SampleRate::from_streaming_wire(3).is_err());
        assert_eq!(
            SampleRate::from_recording_wire(5).unwrap(),
            SampleRate::Khz48
        );
    }

    #[test]
    fn crypto_suite_key_material_lengths() {
        assert_eq!(CryptoSuite::AesCm128HmacSha1_80.key_len(), 16);
        assert_eq!(CryptoSuite::AesCm128HmacSha1_80.salt_len(), 14);
        assert_eq!(CryptoSuite::Aes256CmHmacSha1_80.key_len(), 32);
        assert_eq!(CryptoSuite::Disabled.key_len(), 0);
        assert_eq!(CryptoSuite::Disabled.salt_len(), 0);
    }

    #[test]
    fn event_trigger_wire_bits() {
        let set = EventTriggerSet::of(&[EventTrigger::Motion, EventTrigger::Doorbell]);
        assert_eq!(set.wire_bits(), 0b11);
        assert!(EventTriggerSet::from_wire_bits(0b100).is_err());
    }
}
