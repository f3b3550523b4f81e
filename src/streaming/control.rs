//! Selected RTP Stream Configuration writes: the session control state
//! machine (End / Start / Suspend / Resume / Reconfigure).
//!
//! A protocol violation discovered mid-write aborts the bound session as
//! if End had been received, so no half-configured session can persist.
//! Two kinds of failure are rejected without teardown: ownership
//! failures (no bound session, a different HAP session) and Reconfigure
//! parse/validation failures, which leave the running session on its
//! original parameters.

use std::time::Duration;

use crate::accessory::resolve_stream;
use crate::config::{
    AudioCodec, AudioRtpParameters, BitRateMode, H264Level, H264Profile, PacketizationMode,
    SampleRate, SelectedAudioParameters, SelectedH264Parameters, SelectedVideoCodec,
    SelectedVideoParameters, SessionVideoConfiguration, VideoAttributes, VideoCodec,
    VideoRtpParameters,
};
use crate::controller::{CameraController, HapSession, RESUME_TIMEOUT, SessionPhase};
use crate::error::{CameraError, Result};
use crate::matcher;
use crate::platform::{IpVersion, ReconfigureConfiguration, StartConfiguration};
use crate::tlv::{TlvReader, read_f32, read_u8, read_u16, read_u32};

mod tag {
    pub const SESSION_CONTROL: u8 = 0x01;
    pub const VIDEO: u8 = 0x02;
    pub const AUDIO: u8 = 0x03;
}

mod control {
    pub const SESSION_ID: u8 = 0x01;
    pub const COMMAND: u8 = 0x02;
}

mod media {
    pub const CODEC_TYPE: u8 = 0x01;
    pub const CODEC_PARAMETERS: u8 = 0x02;
    pub const ATTRIBUTES: u8 = 0x03;
    pub const RTP: u8 = 0x04;
    /// Audio only; attributes are a video concept.
    pub const COMFORT_NOISE: u8 = 0x04;
    pub const AUDIO_RTP: u8 = 0x03;
}

mod h264 {
    pub const PROFILE: u8 = 0x01;
    pub const LEVEL: u8 = 0x02;
    pub const PACKETIZATION_MODE: u8 = 0x03;
}

mod attributes {
    pub const WIDTH: u8 = 0x01;
    pub const HEIGHT: u8 = 0x02;
    pub const FRAME_RATE: u8 = 0x03;
}

mod audio_params {
    pub const CHANNELS: u8 = 0x01;
    pub const BIT_RATE_MODE: u8 = 0x02;
    pub const SAMPLE_RATE: u8 = 0x03;
    pub const RTP_TIME: u8 = 0x04;
}

mod rtp {
    pub const PAYLOAD_TYPE: u8 = 0x01;
    pub const SSRC: u8 = 0x02;
    pub const MAX_BIT_RATE: u8 = 0x03;
    pub const MIN_RTCP_INTERVAL: u8 = 0x04;
    pub const MAX_MTU: u8 = 0x05;
    pub const COMFORT_NOISE_PAYLOAD_TYPE: u8 = 0x06;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    End,
    Start,
    Suspend,
    Resume,
    Reconfigure,
}

impl Command {
    fn from_wire(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::End),
            1 => Ok(Self::Start),
            2 => Ok(Self::Suspend),
            3 => Ok(Self::Resume),
            4 => Ok(Self::Reconfigure),
            _ => Err(CameraError::InvalidData),
        }
    }
}

/// Disposition of a failed session-control write.
enum ControlFailure {
    /// Protocol violation: tear the bound session down as if End had
    /// been received, then surface the error.
    Abort(CameraError),
    /// Reject the write and leave the session untouched.
    Reject(CameraError),
}

impl From<CameraError> for ControlFailure {
    fn from(err: CameraError) -> Self {
        ControlFailure::Abort(err)
    }
}

/// The negotiated I-frame interval is not carried on the wire; HAP fixes
/// it for live streaming.
const I_FRAME_INTERVAL_MS: u32 = 5000;

const DEFAULT_MTU_IPV4: u16 = 1378;
const DEFAULT_MTU_IPV6: u16 = 1228;

fn parse_attributes(value: &[u8]) -> Result<VideoAttributes> {
    let fields = TlvReader::new(value).read_all([
        attributes::WIDTH,
        attributes::HEIGHT,
        attributes::FRAME_RATE,
    ])?;
    let [Some(width), Some(height), Some(frame_rate)] = fields else {
        return Err(CameraError::InvalidData);
    };
    let max_frame_rate = read_u8(&frame_rate)?;
    if max_frame_rate == 0 {
        return Err(CameraError::InvalidData);
    }
    Ok(VideoAttributes {
        width: read_u16(&width)?,
        height: read_u16(&height)?,
        max_frame_rate,
    })
}

fn parse_min_rtcp_interval(value: &[u8]) -> Result<f32> {
    let interval = read_f32(value)?;
    if interval < 0.0 {
        return Err(CameraError::InvalidData);
    }
    Ok(interval)
}

fn parse_video_rtp(value: &[u8]) -> Result<VideoRtpParameters> {
    let fields = TlvReader::new(value).read_all([
        rtp::PAYLOAD_TYPE,
        rtp::SSRC,
        rtp::MAX_BIT_RATE,
        rtp::MIN_RTCP_INTERVAL,
        rtp::MAX_MTU,
    ])?;
    let [Some(payload_type), Some(ssrc), Some(max_bit_rate), Some(min_rtcp_interval), max_mtu] =
        fields
    else {
        return Err(CameraError::InvalidData);
    };
    Ok(VideoRtpParameters {
        payload_type: read_u8(&payload_type)?,
        ssrc: read_u32(&ssrc)?,
        max_bit_rate: read_u16(&max_bit_rate)?,
        min_rtcp_interval: parse_min_rtcp_interval(&min_rtcp_interval)?,
        max_mtu: match max_mtu {
            Some(value) => read_u16(&value)?,
            None => 0,
        },
    })
}

fn parse_audio_rtp(value: &[u8], comfort_noise: bool) -> Result<AudioRtpParameters> {
    let fields = TlvReader::new(value).read_all([
        rtp::PAYLOAD_TYPE,
        rtp::SSRC,
        rtp::MAX_BIT_RATE,
        rtp::MIN_RTCP_INTERVAL,
        rtp::COMFORT_NOISE_PAYLOAD_TYPE,
    ])?;
    let [Some(payload_type), Some(ssrc), Some(max_bit_rate), Some(min_rtcp_interval), comfort] =
        fields
    else {
        return Err(CameraError::InvalidData);
    };
    let comfort_noise_payload_type = match (comfort_noise, comfort) {
        (true, Some(value)) => Some(read_u8(&value)?),
        (false, None) => None,
        // Comfort noise selection and its payload type must agree.
        _ => return Err(CameraError::InvalidData),
    };
    Ok(AudioRtpParameters {
        payload_type: read_u8(&payload_type)?,
        ssrc: read_u32(&ssrc)?,
        max_bit_rate: read_u16(&max_bit_rate)?,
        min_rtcp_interval: parse_min_rtcp_interval(&min_rtcp_interval)?,
        comfort_noise_payload_type,
    })
}

fn parse_start_video(value: &[u8]) -> Result<SelectedVideoParameters> {
    let fields = TlvReader::new(value).read_all([
        media::CODEC_TYPE,
        media::CODEC_PARAMETERS,
        media::ATTRIBUTES,
        media::RTP,
    ])?;
    let [Some(codec_type), Some(codec_params), Some(attrs), Some(rtp_params)] = fields else {
        return Err(CameraError::InvalidData);
    };
    VideoCodec::from_wire(read_u8(&codec_type)?)?;

    let params = TlvReader::new(&codec_params).read_all([
        h264::PROFILE,
        h264::LEVEL,
        h264::PACKETIZATION_MODE,
    ])?;
    let [Some(profile), Some(level), Some(mode)] = params else {
        return Err(CameraError::InvalidData);
    };
    let rtp = parse_video_rtp(&rtp_params)?;
    Ok(SelectedVideoParameters {
        codec: SelectedVideoCodec::H264(SelectedH264Parameters {
            profile: H264Profile::from_wire(read_u8(&profile)?)?,
            level: H264Level::from_wire(read_u8(&level)?)?,
            packetization_mode: PacketizationMode::from_wire(read_u8(&mode)?)?,
            // The codec bit rate is negotiated through the RTP bound.
            bit_rate: rtp.max_bit_rate as u32,
            i_frame_interval: I_FRAME_INTERVAL_MS,
        }),
        attributes: parse_attributes(&attrs)?,
        rtp,
    })
}

fn parse_start_audio(value: &[u8]) -> Result<SelectedAudioParameters> {
    let fields = TlvReader::new(value).read_all([
        media::CODEC_TYPE,
        media::CODEC_PARAMETERS,
        media::AUDIO_RTP,
        media::COMFORT_NOISE,
    ])?;
    let [Some(codec_type), Some(codec_params), Some(rtp_params), Some(comfort)] = fields else {
        return Err(CameraError::InvalidData);
    };
    let codec = AudioCodec::from_streaming_wire(read_u8(&codec_type)?)?;
    let comfort_noise = match read_u8(&comfort)? {
        0 => false,
        1 => true,
        _ => return Err(CameraError::InvalidData),
    };

    let params = TlvReader::new(&codec_params).read_all([
        audio_params::CHANNELS,
        audio_params::BIT_RATE_MODE,
        audio_params::SAMPLE_RATE,
        audio_params::RTP_TIME,
    ])?;
    let [Some(channels), Some(mode), Some(rate), Some(rtp_time)] = params else {
        return Err(CameraError::InvalidData);
    };
    let rtp_time = read_u8(&rtp_time)?;
    if !matches!(rtp_time, 20 | 30 | 40 | 60) {
        return Err(CameraError::InvalidData);
    }
    Ok(SelectedAudioParameters {
        codec,
        channels: read_u8(&channels)?,
        bit_rate_mode: BitRateMode::from_wire(read_u8(&mode)?)?,
        sample_rate: SampleRate::from_streaming_wire(read_u8(&rate)?)?,
        rtp_time,
        rtp: parse_audio_rtp(&rtp_params, comfort_noise)?,
        comfort_noise,
    })
}

/// Parse the restricted Reconfigure video payload: codec type, codec
/// parameters, payload type and SSRC must all be absent.
fn parse_reconfigure(value: &[u8]) -> Result<ReconfigureConfiguration> {
    let fields = TlvReader::new(value).read_all([
        media::CODEC_TYPE,
        media::CODEC_PARAMETERS,
        media::ATTRIBUTES,
        media::RTP,
    ])?;
    let [None, None, Some(attrs), Some(rtp_params)] = fields else {
        return Err(CameraError::InvalidData);
    };
    let rtp_fields = TlvReader::new(&rtp_params).read_all([
        rtp::PAYLOAD_TYPE,
        rtp::SSRC,
        rtp::MAX_BIT_RATE,
        rtp::MIN_RTCP_INTERVAL,
    ])?;
    let [None, None, Some(max_bit_rate), Some(min_rtcp_interval)] = rtp_fields else {
        return Err(CameraError::InvalidData);
    };
    Ok(ReconfigureConfiguration {
        attributes: parse_attributes(&attrs)?,
        max_bit_rate: read_u16(&max_bit_rate)?,
        min_rtcp_interval: parse_min_rtcp_interval(&min_rtcp_interval)?,
    })
}

impl CameraController {
    /// Selected RTP Stream Configuration write.
    pub fn write_selected_rtp_configuration(
        &mut self,
        hap: HapSession,
        accessory_index: usize,
        service_iid: u64,
        payload: &[u8],
        now: Duration,
    ) -> Result<()> {
        self.check_hap_session(hap);
        let resolved = resolve_stream(&self.accessories, accessory_index, service_iid);
        self.ensure_streaming_enabled(accessory_index, resolved.stream_index)?;
        let global_index = resolved.session_index();

        // Ownership failures never tear anything down.
        let Some(session) = &self.sessions[global_index] else {
            return Err(CameraError::InvalidState);
        };
        if session.hap_session != hap.0 {
            tracing::debug!(
                accessory = accessory_index,
                stream = resolved.stream_index,
                hap_session = hap.0,
                owner = session.hap_session,
                "session control from a non-owning HAP session",
            );
            return Err(CameraError::InvalidState);
        }

        match self.session_control(accessory_index, resolved.stream_index, global_index, payload, now)
        {
            Ok(()) => Ok(()),
            Err(ControlFailure::Reject(err)) => Err(err),
            Err(ControlFailure::Abort(err)) => {
                tracing::debug!(
                    accessory = accessory_index,
                    stream = resolved.stream_index,
                    %err,
                    "aborting streaming session after a protocol violation",
                );
                self.invalidate_stream(global_index);
                Err(err)
            }
        }
    }

    fn session_control(
        &mut self,
        accessory_index: usize,
        stream_index: usize,
        global_index: usize,
        payload: &[u8],
        now: Duration,
    ) -> std::result::Result<(), ControlFailure> {
        let fields =
            TlvReader::new(payload).read_all([tag::SESSION_CONTROL, tag::VIDEO, tag::AUDIO])?;
        let [Some(control_value), video, audio] = fields else {
            return Err(CameraError::InvalidData.into());
        };
        let control_fields =
            TlvReader::new(&control_value).read_all([control::SESSION_ID, control::COMMAND])?;
        let [Some(id), Some(command)] = control_fields else {
            return Err(CameraError::InvalidData.into());
        };
        let id: [u8; 16] = id.try_into().map_err(|_| CameraError::InvalidData)?;
        let command = Command::from_wire(read_u8(&command)?)?;

        let Some(session) = &self.sessions[global_index] else {
            return Err(CameraError::InvalidState.into());
        };
        if id != session.session_id {
            tracing::debug!(
                accessory = accessory_index,
                stream = stream_index,
                "session identifier mismatch",
            );
            return Err(CameraError::InvalidState.into());
        }
        let phase = session.phase;
        tracing::debug!(
            accessory = accessory_index,
            stream = stream_index,
            ?command,
            ?phase,
            "session control",
        );

        match command {
            Command::End => {
                if video.is_some() || audio.is_some() {
                    return Err(CameraError::InvalidData.into());
                }
                self.invalidate_stream(global_index);
                Ok(())
            }
            Command::Start => {
                if phase != SessionPhase::SetUp {
                    return Err(CameraError::InvalidState.into());
                }
                self.handle_start(accessory_index, stream_index, global_index, video, audio)
                    .map_err(ControlFailure::Abort)
            }
            Command::Suspend => {
                if phase == SessionPhase::SetUp {
                    return Err(CameraError::InvalidState.into());
                }
                let camera = self.accessories[accessory_index].camera();
                camera.suspend_streaming_session(stream_index)?;
                let Some(session) = self.sessions[global_index].as_mut() else {
                    return Err(CameraError::InvalidState.into());
                };
                session.phase = SessionPhase::Suspended;
                session.deadline = Some(now + RESUME_TIMEOUT);
                Ok(())
            }
            Command::Resume => {
                if phase == SessionPhase::SetUp {
                    return Err(CameraError::InvalidState.into());
                }
                let camera = self.accessories[accessory_index].camera();
                camera.resume_streaming_session(stream_index)?;
                let Some(session) = self.sessions[global_index].as_mut() else {
                    return Err(CameraError::InvalidState.into());
                };
                session.phase = SessionPhase::Active;
                session.deadline = None;
                Ok(())
            }
            Command::Reconfigure => {
                if phase == SessionPhase::SetUp {
                    return Err(CameraError::InvalidState.into());
                }
                self.handle_reconfigure(
                    accessory_index,
                    stream_index,
                    global_index,
                    video,
                    audio,
                    now,
                )
            }
        }
    }

    fn handle_start(
        &mut self,
        accessory_index: usize,
        stream_index: usize,
        global_index: usize,
        video: Option<Vec<u8>>,
        audio: Option<Vec<u8>>,
    ) -> Result<()> {
        let (Some(video), Some(audio)) = (video, audio) else {
            return Err(CameraError::InvalidData);
        };
        let mut selected_video = parse_start_video(&video)?;
        let selected_audio = parse_start_audio(&audio)?;

        let capabilities = &self.accessories[accessory_index].streams[stream_index];
        if !matcher::streaming_video_supported(capabilities, &selected_video, self.policy) {
            tracing::debug!("selected video configuration is not supported");
            return Err(CameraError::InvalidData);
        }
        if !matcher::streaming_audio_supported(capabilities, &selected_audio) {
            tracing::debug!("selected audio configuration is not supported");
            return Err(CameraError::InvalidData);
        }

        let camera = self.accessories[accessory_index].camera().clone();
        let Some(session) = self.sessions[global_index].as_mut() else {
            return Err(CameraError::InvalidState);
        };
        if selected_video.rtp.max_mtu == 0 {
            selected_video.rtp.max_mtu = match session.accessory.address.version {
                IpVersion::V4 => DEFAULT_MTU_IPV4,
                IpVersion::V6 => DEFAULT_MTU_IPV6,
            };
        }
        session.controller.video.ssrc = selected_video.rtp.ssrc;
        session.controller.audio.ssrc = selected_audio.rtp.ssrc;
        let SelectedVideoCodec::H264(params) = selected_video.codec;
        session.initial_video = Some(SessionVideoConfiguration {
            codec: VideoCodec::H264,
            profile: params.profile,
            level: params.level,
            packetization_mode: params.packetization_mode,
        });
        let controller_endpoint = session.controller.clone();
        let accessory_endpoint = session.accessory.clone();

        camera.start_streaming_session(
            stream_index,
            &controller_endpoint,
            &accessory_endpoint,
            &StartConfiguration {
                video: selected_video,
                audio: selected_audio,
            },
        )?;

        let Some(session) = self.sessions[global_index].as_mut() else {
            return Err(CameraError::InvalidState);
        };
        session.phase = SessionPhase::Active;
        session.deadline = None;
        Ok(())
    }

    /// Parse and validation failures are [`ControlFailure::Reject`]: the
    /// running session keeps its original parameters. Only a platform
    /// failure aborts.
    fn handle_reconfigure(
        &mut self,
        accessory_index: usize,
        stream_index: usize,
        global_index: usize,
        video: Option<Vec<u8>>,
        audio: Option<Vec<u8>>,
        now: Duration,
    ) -> std::result::Result<(), ControlFailure> {
        if audio.is_some() {
            return Err(ControlFailure::Reject(CameraError::InvalidData));
        }
        let video = video.ok_or(ControlFailure::Reject(CameraError::InvalidData))?;
        let configuration = parse_reconfigure(&video).map_err(ControlFailure::Reject)?;

        let Some(session) = &self.sessions[global_index] else {
            return Err(CameraError::InvalidState.into());
        };
        let initial = session.initial_video.ok_or(CameraError::InvalidState)?;
        let capabilities = &self.accessories[accessory_index].streams[stream_index];
        if !matcher::reconfigure_supported(capabilities, &initial, &configuration.attributes) {
            tracing::debug!("reconfigured attributes are not supported");
            return Err(ControlFailure::Reject(CameraError::InvalidData));
        }

        let camera = self.accessories[accessory_index].camera();
        camera.reconfigure_streaming_session(stream_index, &configuration)?;

        let Some(session) = self.sessions[global_index].as_mut() else {
            return Err(CameraError::InvalidState.into());
        };
        // Renew the resume watchdog only if one is already armed.
        if session.deadline.is_some() {
            session.deadline = Some(now + RESUME_TIMEOUT);
        }
        Ok(())
    }
}
