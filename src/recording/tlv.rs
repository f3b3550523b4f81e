//! TLV serialization and parsing of recording configurations.
//!
//! The recording vocabulary differs from streaming: AAC-LC exists and the
//! codec wire values shift, bit rate and I-frame interval are explicit
//! u32 fields, and prebuffer / trigger values may arrive in shortened
//! little-endian encodings.

use bytes::Bytes;

use crate::config::{
    AudioCodec, BitRateMode, ContainerConfiguration, EventTriggerSet, H264Level, H264Profile,
    RecordingAudioParameters, RecordingConfiguration, RecordingH264Parameters,
    RecordingParameters, RecordingVideoCodec, RecordingVideoParameters, SampleRate,
    SupportedAudioConfiguration, SupportedRecordingParameters, SupportedVideoCodec,
    SupportedVideoConfiguration, VideoAttributes, VideoCodec,
};
use crate::error::{CameraError, Result};
use crate::tlv::{TlvReader, TlvWriter, read_u8, read_u16, read_uint_le};

mod camera {
    pub const PREBUFFER_DURATION: u8 = 0x01;
    pub const EVENT_TRIGGERS: u8 = 0x02;
    pub const CONTAINER_CONFIGURATION: u8 = 0x03;

    pub const CONTAINER_TYPE: u8 = 0x01;
    pub const CONTAINER_PARAMETERS: u8 = 0x02;
    pub const FRAGMENT_DURATION: u8 = 0x01;
}

mod media {
    pub const CODEC_CONFIGURATION: u8 = 0x01;
    pub const CODEC_TYPE: u8 = 0x01;
    pub const CODEC_PARAMETERS: u8 = 0x02;
    pub const ATTRIBUTES: u8 = 0x03;
}

mod h264 {
    pub const PROFILE: u8 = 0x01;
    pub const LEVEL: u8 = 0x02;
    pub const BIT_RATE: u8 = 0x03;
    pub const I_FRAME_INTERVAL: u8 = 0x04;
}

mod attributes {
    pub const WIDTH: u8 = 0x01;
    pub const HEIGHT: u8 = 0x02;
    pub const FRAME_RATE: u8 = 0x03;
}

mod audio {
    pub const CHANNELS: u8 = 0x01;
    pub const BIT_RATE_MODE: u8 = 0x02;
    pub const SAMPLE_RATE: u8 = 0x03;
    pub const BIT_RATE: u8 = 0x04;
}

mod selected {
    pub const RECORDING: u8 = 0x01;
    pub const VIDEO: u8 = 0x02;
    pub const AUDIO: u8 = 0x03;
}

const CONTAINER_TYPE_FRAGMENTED_MP4: u8 = 0;

fn write_container(writer: &mut TlvWriter, container: &ContainerConfiguration) -> Result<()> {
    let ContainerConfiguration::FragmentedMp4 {
        fragment_duration_ms,
    } = container;
    writer.append_u8(camera::CONTAINER_TYPE, CONTAINER_TYPE_FRAGMENTED_MP4)?;
    writer.nested(camera::CONTAINER_PARAMETERS, |p| {
        p.append_u32(camera::FRAGMENT_DURATION, *fragment_duration_ms)
    })
}

fn parse_container(value: &[u8]) -> Result<ContainerConfiguration> {
    let fields = TlvReader::new(value)
        .read_all([camera::CONTAINER_TYPE, camera::CONTAINER_PARAMETERS])?;
    let [Some(container_type), Some(params)] = fields else {
        return Err(CameraError::InvalidData);
    };
    if read_u8(&container_type)? != CONTAINER_TYPE_FRAGMENTED_MP4 {
        return Err(CameraError::InvalidData);
    }
    let params = TlvReader::new(&params).read_all([camera::FRAGMENT_DURATION])?;
    let [Some(fragment)] = params else {
        return Err(CameraError::InvalidData);
    };
    Ok(ContainerConfiguration::FragmentedMp4 {
        fragment_duration_ms: read_uint_le(&fragment, 4)? as u32,
    })
}

fn write_attributes(writer: &mut TlvWriter, attrs: &VideoAttributes) -> Result<()> {
    writer.append_u16(attributes::WIDTH, attrs.width)?;
    writer.append_u16(attributes::HEIGHT, attrs.height)?;
    writer.append_u8(attributes::FRAME_RATE, attrs.max_frame_rate)
}

fn parse_attributes(value: &[u8]) -> Result<VideoAttributes> {
    let fields = TlvReader::new(value).read_all([
        attributes::WIDTH,
        attributes::HEIGHT,
        attributes::FRAME_RATE,
    ])?;
    let [Some(width), Some(height), Some(frame_rate)] = fields else {
        return Err(CameraError::InvalidData);
    };
    Ok(VideoAttributes {
        width: read_u16(&width)?,
        height: read_u16(&height)?,
        max_frame_rate: read_u8(&frame_rate)?,
    })
}

fn append_separated(
    writer: &mut TlvWriter,
    tag: u8,
    values: impl IntoIterator<Item = u8>,
) -> Result<()> {
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            writer.separator()?;
        }
        writer.append_u8(tag, value)?;
    }
    Ok(())
}

pub(super) fn supported_camera_recording(
    params: &SupportedRecordingParameters,
    capacity: usize,
) -> Result<Bytes> {
    let mut writer = TlvWriter::new(capacity);
    writer.append_u32(camera::PREBUFFER_DURATION, params.prebuffer_duration_ms)?;
    writer.append_u64(camera::EVENT_TRIGGERS, params.event_trigger_types.wire_bits())?;
    for (i, container) in params.containers.iter().enumerate() {
        if i > 0 {
            writer.separator()?;
        }
        writer.nested(camera::CONTAINER_CONFIGURATION, |c| {
            write_container(c, container)
        })?;
    }
    Ok(writer.into_bytes())
}

pub(super) fn supported_video_recording(
    configs: &[SupportedVideoConfiguration],
    capacity: usize,
) -> Result<Bytes> {
    let mut writer = TlvWriter::new(capacity);
    for (i, config) in configs.iter().enumerate() {
        if i > 0 {
            writer.separator()?;
        }
        writer.nested(media::CODEC_CONFIGURATION, |codec| {
            let SupportedVideoCodec::H264(params) = &config.codec;
            codec.append_u8(media::CODEC_TYPE, VideoCodec::H264.wire())?;
            codec.nested(media::CODEC_PARAMETERS, |p| {
                append_separated(p, h264::PROFILE, params.profiles.iter().map(|v| v.wire()))?;
                append_separated(p, h264::LEVEL, params.levels.iter().map(|v| v.wire()))?;
                p.append_u32(h264::BIT_RATE, params.max_bit_rate)?;
                p.append_u32(h264::I_FRAME_INTERVAL, params.max_i_frame_interval)
            })?;
            for (j, attrs) in config.attributes.iter().enumerate() {
                if j > 0 {
                    codec.separator()?;
                }
                codec.nested(media::ATTRIBUTES, |a| write_attributes(a, attrs))?;
            }
            Ok(())
        })?;
    }
    Ok(writer.into_bytes())
}

pub(super) fn supported_audio_recording(
    configs: &[SupportedAudioConfiguration],
    capacity: usize,
) -> Result<Bytes> {
    let mut writer = TlvWriter::new(capacity);
    for (i, config) in configs.iter().enumerate() {
        if i > 0 {
            writer.separator()?;
        }
        let Some(codec_wire) = config.codec.recording_wire() else {
            panic!("{:?} is not a recording audio codec", config.codec);
        };
        writer.nested(media::CODEC_CONFIGURATION, |codec| {
            codec.append_u8(media::CODEC_TYPE, codec_wire)?;
            codec.nested(media::CODEC_PARAMETERS, |p| {
                p.append_u8(audio::CHANNELS, config.channels)?;
                append_separated(
                    p,
                    audio::BIT_RATE_MODE,
                    config.bit_rate_modes.iter().map(|v| v.wire()),
                )?;
                append_separated(
                    p,
                    audio::SAMPLE_RATE,
                    config.sample_rates.iter().map(|v| v.wire()),
                )?;
                p.append_u32(audio::BIT_RATE, config.max_bit_rate)
            })
        })?;
    }
    Ok(writer.into_bytes())
}

pub(super) fn selected_recording(
    config: &RecordingConfiguration,
    capacity: usize,
) -> Result<Bytes> {
    let mut writer = TlvWriter::new(capacity);
    writer.nested(selected::RECORDING, |r| {
        r.append_u32(
            camera::PREBUFFER_DURATION,
            config.recording.prebuffer_duration_ms,
        )?;
        r.append_u64(
            camera::EVENT_TRIGGERS,
            config.recording.event_trigger_types.wire_bits(),
        )?;
        r.nested(camera::CONTAINER_CONFIGURATION, |c| {
            write_container(c, &config.recording.container)
        })
    })?;
    writer.nested(selected::VIDEO, |v| {
        let RecordingVideoCodec::H264(params) = &config.video.codec;
        v.append_u8(media::CODEC_TYPE, VideoCodec::H264.wire())?;
        v.nested(media::CODEC_PARAMETERS, |p| {
            p.append_u8(h264::PROFILE, params.profile.wire())?;
            p.append_u8(h264::LEVEL, params.level.wire())?;
            p.append_u32(h264::BIT_RATE, params.bit_rate)?;
            p.append_u32(h264::I_FRAME_INTERVAL, params.i_frame_interval)
        })?;
        v.nested(media::ATTRIBUTES, |a| {
            write_attributes(a, &config.video.attributes)
        })
    })?;
    writer.nested(selected::AUDIO, |a| {
        let Some(codec_wire) = config.audio.codec.recording_wire() else {
            panic!("{:?} is not a recording audio codec", config.audio.codec);
        };
        a.append_u8(media::CODEC_TYPE, codec_wire)?;
        a.nested(media::CODEC_PARAMETERS, |p| {
            p.append_u8(audio::CHANNELS, config.audio.channels)?;
            p.append_u8(audio::BIT_RATE_MODE, config.audio.bit_rate_mode.wire())?;
            p.append_u8(audio::SAMPLE_RATE, config.audio.sample_rate.wire())?;
            p.append_u32(audio::BIT_RATE, config.audio.bit_rate)
        })
    })?;
    Ok(writer.into_bytes())
}

pub(super) fn parse_selected_recording(payload: &[u8]) -> Result<RecordingConfiguration> {
    let fields = TlvReader::new(payload).read_all([
        selected::RECORDING,
        selected::VIDEO,
        selected::AUDIO,
    ])?;
    let [Some(recording), Some(video), Some(audio)] = fields else {
        return Err(CameraError::InvalidData);
    };
    Ok(RecordingConfiguration {
        recording: parse_recording_parameters(&recording)?,
        video: parse_video_parameters(&video)?,
        audio: parse_audio_parameters(&audio)?,
    })
}

fn parse_recording_parameters(value: &[u8]) -> Result<RecordingParameters> {
    let fields = TlvReader::new(value).read_all([
        camera::PREBUFFER_DURATION,
        camera::EVENT_TRIGGERS,
        camera::CONTAINER_CONFIGURATION,
    ])?;
    let [Some(prebuffer), Some(triggers), Some(container)] = fields else {
        return Err(CameraError::InvalidData);
    };
    Ok(RecordingParameters {
        prebuffer_duration_ms: read_uint_le(&prebuffer, 4)? as u32,
        event_trigger_types: EventTriggerSet::from_wire_bits(read_uint_le(&triggers, 8)?)?,
        container: parse_container(&container)?,
    })
}

fn parse_video_parameters(value: &[u8]) -> Result<RecordingVideoParameters> {
    let fields = TlvReader::new(value).read_all([
        media::CODEC_TYPE,
        media::CODEC_PARAMETERS,
        media::ATTRIBUTES,
    ])?;
    let [Some(codec_type), Some(params), Some(attrs)] = fields else {
        return Err(CameraError::InvalidData);
    };
    VideoCodec::from_wire(read_u8(&codec_type)?)?;

    let params = TlvReader::new(&params).read_all([
        h264::PROFILE,
        h264::LEVEL,
        h264::BIT_RATE,
        h264::I_FRAME_INTERVAL,
    ])?;
    let [Some(profile), Some(level), Some(bit_rate), Some(i_frame_interval)] = params else {
        return Err(CameraError::InvalidData);
    };
    Ok(RecordingVideoParameters {
        codec: RecordingVideoCodec::H264(RecordingH264Parameters {
            profile: H264Profile::from_wire(read_u8(&profile)?)?,
            level: H264Level::from_wire(read_u8(&level)?)?,
            bit_rate: read_uint_le(&bit_rate, 4)? as u32,
            i_frame_interval: read_uint_le(&i_frame_interval, 4)? as u32,
        }),
        attributes: parse_attributes(&attrs)?,
    })
}

fn parse_audio_parameters(value: &[u8]) -> Result<RecordingAudioParameters> {
    let fields =
        TlvReader::new(value).read_all([media::CODEC_TYPE, media::CODEC_PARAMETERS])?;
    let [Some(codec_type), Some(params)] = fields else {
        return Err(CameraError::InvalidData);
    };
    let codec = AudioCodec::from_recording_wire(read_u8(&codec_type)?)?;

    let params = TlvReader::new(&params).read_all([
        audio::CHANNELS,
        audio::BIT_RATE_MODE,
        audio::SAMPLE_RATE,
        audio::BIT_RATE,
    ])?;
    let [Some(channels), Some(mode), Some(rate), Some(bit_rate)] = params else {
        return Err(CameraError::InvalidData);
    };
    Ok(RecordingAudioParameters {
        codec,
        channels: read_u8(&channels)?,
        bit_rate_mode: BitRateMode::from_wire(read_u8(&mode)?)?,
        sample_rate: SampleRate::from_recording_wire(read_u8(&rate)?)?,
        bit_rate: read_uint_le(&bit_rate, 4)? as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BitRateModeSet, EventTrigger, H264LevelSet, H264ProfileSet, PacketizationModeSet,
        SampleRateSet, SupportedH264Parameters,
    };
    use crate::tlv::read_u32;

    fn selected() -> RecordingConfiguration {
        RecordingConfiguration {
            recording: RecordingParameters {
                prebuffer_duration_ms: 4000,
                event_trigger_types: EventTriggerSet::of(&[EventTrigger::Motion]),
                container: ContainerConfiguration::FragmentedMp4 {
                    fragment_duration_ms: 4000,
                },
            },
            video: RecordingVideoParameters {
                codec: RecordingVideoCodec::H264(RecordingH264Parameters {
                    profile: H264Profile::Main,
                    level: H264Level::V3_1,
                    bit_rate: 2000,
                    i_frame_interval: 4000,
                }),
                attributes: VideoAttributes {
                    width: 1920,
                    height: 1080,
                    max_frame_rate: 30,
                },
            },
            audio: RecordingAudioParameters {
                codec: AudioCodec::AacLc,
                channels: 1,
                bit_rate_mode: BitRateMode::Variable,
                sample_rate: SampleRate::Khz32,
                bit_rate: 64,
            },
        }
    }

    #[test]
    fn selected_configuration_roundtrip() {
        let config = selected();
        let bytes = selected_recording(&config, 1024).unwrap();
        assert_eq!(parse_selected_recording(&bytes).unwrap(), config);
    }

    #[test]
    fn parse_accepts_shortened_integers() {
        // A controller is allowed to send prebuffer and trigger values in
        // fewer bytes than the canonical width.
        let config = selected();
        let mut writer = TlvWriter::new(1024);
        writer
            .nested(selected::RECORDING, |r| {
                r.append(camera::PREBUFFER_DURATION, &[0xA0, 0x0F])?; // 4000
                r.append(camera::EVENT_TRIGGERS, &[0x01])?;
                r.nested(camera::CONTAINER_CONFIGURATION, |c| {
                    write_container(c, &config.recording.container)
                })
            })
            .unwrap();
        let canonical = selected_recording(&config, 1024).unwrap();
        let mut reader = TlvReader::new(&canonical);
        reader.next_item().unwrap(); // skip the canonical recording block
        let video = reader.next_item().unwrap().unwrap();
        writer.append(selected::VIDEO, &video.value).unwrap();
        let audio = reader.next_item().unwrap().unwrap();
        writer.append(selected::AUDIO, &audio.value).unwrap();

        let bytes = writer.into_bytes();
        assert_eq!(parse_selected_recording(&bytes).unwrap(), config);
    }

    #[test]
    fn unknown_trigger_bits_rejected() {
        let config = selected();
        let mut writer = TlvWriter::new(1024);
        writer
            .nested(selected::RECORDING, |r| {
                r.append_u32(camera::PREBUFFER_DURATION, 4000)?;
                r.append_u64(camera::EVENT_TRIGGERS, 0b100)?;
                r.nested(camera::CONTAINER_CONFIGURATION, |c| {
                    write_container(c, &config.recording.container)
                })
            })
            .unwrap();
        let canonical = selected_recording(&config, 1024).unwrap();
        let mut reader = TlvReader::new(&canonical);
        reader.next_item().unwrap();
        let video = reader.next_item().unwrap().unwrap();
        writer.append(selected::VIDEO, &video.value).unwrap();
        let audio = reader.next_item().unwrap().unwrap();
        writer.append(selected::AUDIO, &audio.value).unwrap();

        assert_eq!(
            parse_selected_recording(&writer.into_bytes()),
            Err(CameraError::InvalidData)
        );
    }

    #[test]
    fn supported_camera_layout() {
        let params = SupportedRecordingParameters {
            prebuffer_duration_ms: 8000,
            event_trigger_types: EventTriggerSet::of(&[
                EventTrigger::Motion,
                EventTrigger::Doorbell,
            ]),
            containers: vec![ContainerConfiguration::FragmentedMp4 {
                fragment_duration_ms: 4000,
            }],
        };
        let bytes = supported_camera_recording(&params, 256).unwrap();
        let fields = TlvReader::new(&bytes)
            .read_all([
                camera::PREBUFFER_DURATION,
                camera::EVENT_TRIGGERS,
                camera::CONTAINER_CONFIGURATION,
            ])
            .unwrap();
        assert_eq!(read_u32(fields[0].as_ref().unwrap()).unwrap(), 8000);
        assert_eq!(read_uint_le(fields[1].as_ref().unwrap(), 8).unwrap(), 0b11);
        assert_eq!(
            parse_container(fields[2].as_ref().unwrap()).unwrap(),
            params.containers[0]
        );
    }

    #[test]
    fn supported_video_carries_bounds() {
        let configs = vec![SupportedVideoConfiguration {
            codec: SupportedVideoCodec::H264(SupportedH264Parameters {
                profiles: H264ProfileSet::of(&[H264Profile::Main]),
                levels: H264LevelSet::of(&[H264Level::V3_1]),
                packetization_modes: PacketizationModeSet::EMPTY,
                max_bit_rate: 2000,
                max_i_frame_interval: 5000,
            }),
            attributes: vec![VideoAttributes {
                width: 1920,
                height: 1080,
                max_frame_rate: 30,
            }],
        }];
        let bytes = supported_video_recording(&configs, 512).unwrap();
        let mut reader = TlvReader::new(&bytes);
        let config = reader.next_item().unwrap().unwrap();
        let inner = TlvReader::new(&config.value)
            .read_all([media::CODEC_TYPE, media::CODEC_PARAMETERS, media::ATTRIBUTES])
            .unwrap();
        let params = TlvReader::new(inner[1].as_ref().unwrap())
            .read_all([h264::PROFILE, h264::LEVEL, h264::BIT_RATE, h264::I_FRAME_INTERVAL])
            .unwrap();
        assert_eq!(read_u32(params[2].as_ref().unwrap()).unwrap(), 2000);
        assert_eq!(read_u32(params[3].as_ref().unwrap()).unwrap(), 5000);
    }

    #[test]
    fn supported_audio_uses_recording_codec_values() {
        let configs = vec![SupportedAudioConfiguration {
            codec: AudioCodec::AacLc,
            channels: 1,
            bit_rate_modes: BitRateModeSet::of(&[BitRateMode::Variable]),
            sample_rates: SampleRateSet::of(&[SampleRate::Khz32, SampleRate::Khz48]),
            max_bit_rate: 96,
        }];
        let bytes = supported_audio_recording(&configs, 256).unwrap();
        let mut reader = TlvReader::new(&bytes);
        let config = reader.next_item().unwrap().unwrap();
        let inner = TlvReader::new(&config.value)
            .read_all([media::CODEC_TYPE, media::CODEC_PARAMETERS])
            .unwrap();
        assert_eq!(inner[0], Some(vec![0])); // AAC-LC recording wire value
        let mut params = TlvReader::new(inner[1].as_ref().unwrap());
        assert_eq!(params.next_item().unwrap().unwrap().value, vec![1]);
        assert_eq!(params.next_item().unwrap().unwrap().value, vec![0]);
        assert_eq!(params.next_item().unwrap().unwrap().value, vec![3]); // 32 kHz
        assert_eq!(params.next_item().unwrap().unwrap().tag, 0x00);
        assert_eq!(params.next_item().unwrap().unwrap().value, vec![5]); // 48 kHz
    }
}
