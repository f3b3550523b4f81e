//! TLV serialization of the supported streaming configurations.

use bytes::Bytes;

use crate::config::{StreamingCapabilities, SupportedVideoCodec, VideoCodec};
use crate::error::Result;
use crate::tlv::TlvWriter;

mod video {
    pub const CODEC_CONFIGURATION: u8 = 0x01;
    pub const CODEC_TYPE: u8 = 0x01;
    pub const CODEC_PARAMETERS: u8 = 0x02;
    pub const ATTRIBUTES: u8 = 0x03;

    pub const PROFILE: u8 = 0x01;
    pub const LEVEL: u8 = 0x02;
    pub const PACKETIZATION_MODE: u8 = 0x03;

    pub const WIDTH: u8 = 0x01;
    pub const HEIGHT: u8 = 0x02;
    pub const FRAME_RATE: u8 = 0x03;
}

mod audio {
    pub const CODEC_CONFIGURATION: u8 = 0x01;
    pub const COMFORT_NOISE: u8 = 0x02;
    pub const CODEC_TYPE: u8 = 0x01;
    pub const CODEC_PARAMETERS: u8 = 0x02;

    pub const CHANNELS: u8 = 0x01;
    pub const BIT_RATE_MODE: u8 = 0x02;
    pub const SAMPLE_RATE: u8 = 0x03;
}

mod rtp {
    pub const CRYPTO_SUITE: u8 = 0x02;
}

/// Append one item per value, with separators between repeats.
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

pub(super) fn supported_video_configuration(
    capabilities: &StreamingCapabilities,
    capacity: usize,
) -> Result<Bytes> {
    let mut writer = TlvWriter::new(capacity);
    for (i, config) in capabilities.video.iter().enumerate() {
        if i > 0 {
            writer.separator()?;
        }
        writer.nested(video::CODEC_CONFIGURATION, |codec| {
            let SupportedVideoCodec::H264(params) = &config.codec;
            codec.append_u8(video::CODEC_TYPE, VideoCodec::H264.wire())?;
            codec.nested(video::CODEC_PARAMETERS, |p| {
                append_separated(p, video::PROFILE, params.profiles.iter().map(|v| v.wire()))?;
                append_separated(p, video::LEVEL, params.levels.iter().map(|v| v.wire()))?;
                append_separated(
                    p,
                    video::PACKETIZATION_MODE,
                    params.packetization_modes.iter().map(|v| v.wire()),
                )
            })?;
            for (j, attributes) in config.attributes.iter().enumerate() {
                if j > 0 {
                    codec.separator()?;
                }
                codec.nested(video::ATTRIBUTES, |a| {
                    a.append_u16(video::WIDTH, attributes.width)?;
                    a.append_u16(video::HEIGHT, attributes.height)?;
                    a.append_u8(video::FRAME_RATE, attributes.max_frame_rate)
                })?;
            }
            Ok(())
        })?;
    }
    Ok(writer.into_bytes())
}

pub(super) fn supported_audio_configuration(
    capabilities: &StreamingCapabilities,
    capacity: usize,
) -> Result<Bytes> {
    let mut writer = TlvWriter::new(capacity);
    for (i, config) in capabilities.audio.iter().enumerate() {
        if i > 0 {
            writer.separator()?;
        }
        let Some(codec_wire) = config.codec.streaming_wire() else {
            panic!("{:?} is not a streaming audio codec", config.codec);
        };
        writer.nested(audio::CODEC_CONFIGURATION, |codec| {
            codec.append_u8(audio::CODEC_TYPE, codec_wire)?;
            codec.nested(audio::CODEC_PARAMETERS, |p| {
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
                )
            })
        })?;
    }
    writer.append_u8(audio::COMFORT_NOISE, capabilities.comfort_noise as u8)?;
    Ok(writer.into_bytes())
}

pub(super) fn supported_rtp_configuration(
    capabilities: &StreamingCapabilities,
    capacity: usize,
) -> Result<Bytes> {
    let mut writer = TlvWriter::new(capacity);
    append_separated(
        &mut writer,
        rtp::CRYPTO_SUITE,
        capabilities.srtp_crypto_suites.iter().map(|v| v.wire()),
    )?;
    Ok(writer.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AudioCodec, BitRateMode, BitRateModeSet, CryptoSuite, CryptoSuiteSet, H264Level,
        H264LevelSet, H264Profile, H264ProfileSet, PacketizationMode, PacketizationModeSet,
        SampleRate, SampleRateSet, SupportedAudioConfiguration, SupportedH264Parameters,
        SupportedVideoConfiguration, VideoAttributes,
    };
    use crate::tlv::{TlvReader, read_u8, read_u16};

    fn capabilities() -> StreamingCapabilities {
        StreamingCapabilities {
            video: vec![SupportedVideoConfiguration {
                codec: SupportedVideoCodec::H264(SupportedH264Parameters {
                    profiles: H264ProfileSet::of(&[
                        H264Profile::ConstrainedBaseline,
                        H264Profile::Main,
                    ]),
                    levels: H264LevelSet::of(&[H264Level::V3_1]),
                    packetization_modes: PacketizationModeSet::of(&[
                        PacketizationMode::NonInterleaved,
                    ]),
                    max_bit_rate: 0,
                    max_i_frame_interval: 0,
                }),
                attributes: vec![
                    VideoAttributes {
                        width: 1920,
                        height: 1080,
                        max_frame_rate: 30,
                    },
                    VideoAttributes {
                        width: 1280,
                        height: 720,
                        max_frame_rate: 30,
                    },
                ],
            }],
            audio: vec![SupportedAudioConfiguration {
                codec: AudioCodec::AacEld,
                channels: 1,
                bit_rate_modes: BitRateModeSet::of(&[BitRateMode::Variable]),
                sample_rates: SampleRateSet::of(&[SampleRate::Khz16, SampleRate::Khz24]),
                max_bit_rate: 0,
            }],
            comfort_noise: false,
            srtp_crypto_suites: CryptoSuiteSet::of(&[
                CryptoSuite::AesCm128HmacSha1_80,
                CryptoSuite::Disabled,
            ]),
        }
    }

    #[test]
    fn video_configuration_layout() {
        let bytes = supported_video_configuration(&capabilities(), 1024).unwrap();
        let mut reader = TlvReader::new(&bytes);
        let config = reader.next_item().unwrap().unwrap();
        assert_eq!(config.tag, video::CODEC_CONFIGURATION);
        assert!(reader.next_item().unwrap().is_none());

        let mut inner = TlvReader::new(&config.value);
        let codec_type = inner.next_item().unwrap().unwrap();
        assert_eq!(codec_type.tag, video::CODEC_TYPE);
        assert_eq!(codec_type.value, vec![0]);

        let params = inner.next_item().unwrap().unwrap();
        assert_eq!(params.tag, video::CODEC_PARAMETERS);
        // Two profiles with a separator between them, then level and mode.
        let mut p = TlvReader::new(&params.value);
        assert_eq!(p.next_item().unwrap().unwrap().value, vec![0]);
        assert_eq!(p.next_item().unwrap().unwrap().tag, 0x00);
        assert_eq!(p.next_item().unwrap().unwrap().value, vec![1]);
        assert_eq!(p.next_item().unwrap().unwrap().tag, video::LEVEL);
        assert_eq!(
            p.next_item().unwrap().unwrap().tag,
            video::PACKETIZATION_MODE
        );

        let first_attrs = inner.next_item().unwrap().unwrap();
        assert_eq!(first_attrs.tag, video::ATTRIBUTES);
        let fields = TlvReader::new(&first_attrs.value)
            .read_all([video::WIDTH, video::HEIGHT, video::FRAME_RATE])
            .unwrap();
        assert_eq!(read_u16(fields[0].as_ref().unwrap()).unwrap(), 1920);
        assert_eq!(read_u16(fields[1].as_ref().unwrap()).unwrap(), 1080);
        assert_eq!(read_u8(fields[2].as_ref().unwrap()).unwrap(), 30);

        assert_eq!(inner.next_item().unwrap().unwrap().tag, 0x00);
        assert_eq!(
            inner.next_item().unwrap().unwrap().tag,
            video::ATTRIBUTES
        );
    }

    #[test]
    fn audio_configuration_layout() {
        let bytes = supported_audio_configuration(&capabilities(), 1024).unwrap();
        let mut reader = TlvReader::new(&bytes);
        let config = reader.next_item().unwrap().unwrap();
        assert_eq!(config.tag, audio::CODEC_CONFIGURATION);
        let comfort = reader.next_item().unwrap().unwrap();
        assert_eq!(comfort.tag, audio::COMFORT_NOISE);
        assert_eq!(comfort.value, vec![0]);

        let mut inner = TlvReader::new(&config.value);
        assert_eq!(inner.next_item().unwrap().unwrap().value, vec![2]); // AAC-ELD
        let params = inner.next_item().unwrap().unwrap();
        let mut p = TlvReader::new(&params.value);
        assert_eq!(p.next_item().unwrap().unwrap().value, vec![1]); // channels
        assert_eq!(p.next_item().unwrap().unwrap().value, vec![0]); // VBR
        assert_eq!(p.next_item().unwrap().unwrap().value, vec![1]); // 16 kHz
        assert_eq!(p.next_item().unwrap().unwrap().tag, 0x00);
        assert_eq!(p.next_item().unwrap().unwrap().value, vec![2]); // 24 kHz
    }

    #[test]
    fn rtp_configuration_lists_suites_with_separators() {
        let bytes = supported_rtp_configuration(&capabilities(), 64).unwrap();
        assert_eq!(&bytes[..], &[0x02, 1, 0, 0x00, 0x00, 0x02, 1, 2]);
    }
}
