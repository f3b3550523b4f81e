//! Matching of controller-selected configurations against accessory
//! capabilities.
//!
//! A selected configuration is supported when at least one advertised
//! configuration covers every selected value: bitmask membership for
//! profile, level, packetization mode, bit-rate mode and sample rate;
//! upper bounds for bit rate, I-frame interval and fragment duration
//! (a supported value of zero means unconstrained); exact width, height,
//! channel count and codec kind; supported frame rate at least the
//! requested one.

use crate::config::{
    ContainerConfiguration, RecordingConfiguration, RecordingVideoCodec, SelectedAudioParameters,
    SelectedH264Parameters, SelectedVideoCodec, SelectedVideoParameters,
    SessionVideoConfiguration, StreamingCapabilities, SupportedH264Parameters,
    SupportedRecordingConfiguration, SupportedVideoCodec, SupportedVideoConfiguration,
    VideoAttributes, VideoCodec,
};

/// Knobs for deliberately lenient checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchPolicy {
    /// Reject resolutions that exceed the pixel budget of the selected
    /// H.264 level. Off by default: controllers may request resolutions
    /// (e.g. 1536×1536) whose level HAP has no wire value for, so the
    /// check only logs unless an accessory opts in.
    pub enforce_pixel_limit: bool,
}

fn pixel_limit_ok(
    params: &SelectedH264Parameters,
    attributes: &VideoAttributes,
    policy: MatchPolicy,
) -> bool {
    if attributes.pixels() > params.level.pixel_limit() {
        tracing::warn!(
            width = attributes.width,
            height = attributes.height,
            level = ?params.level,
            "resolution exceeds the pixel budget of the selected H.264 level"
        );
        if policy.enforce_pixel_limit {
            return false;
        }
    }
    true
}

fn attributes_match(supported: &VideoAttributes, requested: &VideoAttributes) -> bool {
    supported.width == requested.width
        && supported.height == requested.height
        && supported.max_frame_rate >= requested.max_frame_rate
}

fn h264_bounds_ok(supported: &SupportedH264Parameters, bit_rate: u32, i_frame_interval: u32) -> bool {
    (supported.max_bit_rate == 0 || bit_rate <= supported.max_bit_rate)
        && (supported.max_i_frame_interval == 0 || i_frame_interval <= supported.max_i_frame_interval)
}

fn h264_config_matches(
    config: &SupportedVideoConfiguration,
    params: &SelectedH264Parameters,
    attributes: &VideoAttributes,
) -> bool {
    let SupportedVideoCodec::H264(supported) = &config.codec;
    supported.profiles.contains(params.profile)
        && supported.levels.contains(params.level)
        && supported.packetization_modes.contains(params.packetization_mode)
        && h264_bounds_ok(supported, params.bit_rate, params.i_frame_interval)
        && config.attributes.iter().any(|a| attributes_match(a, attributes))
}

/// Whether the selected video parameters of a Start command are covered
/// by the stream's advertised configurations.
pub fn streaming_video_supported(
    capabilities: &StreamingCapabilities,
    selected: &SelectedVideoParameters,
    policy: MatchPolicy,
) -> bool {
    let SelectedVideoCodec::H264(params) = &selected.codec;
    if !pixel_limit_ok(params, &selected.attributes, policy) {
        return false;
    }
    capabilities
        .video
        .iter()
        .any(|config| h264_config_matches(config, params, &selected.attributes))
}

/// Whether the selected audio parameters of a Start command are covered
/// by the stream's advertised configurations.
pub fn streaming_audio_supported(
    capabilities: &StreamingCapabilities,
    selected: &SelectedAudioParameters,
) -> bool {
    capabilities.audio.iter().any(|config| {
        config.codec == selected.codec
            && config.channels == selected.channels
            && config.bit_rate_modes.contains(selected.bit_rate_mode)
            && config.sample_rates.contains(selected.sample_rate)
    })
}

/// Whether reconfigured video attributes remain compatible with the codec
/// configuration negotiated when the session started.
pub fn reconfigure_supported(
    capabilities: &StreamingCapabilities,
    initial: &SessionVideoConfiguration,
    attributes: &VideoAttributes,
) -> bool {
    if initial.codec != VideoCodec::H264 {
        return false;
    }
    capabilities.video.iter().any(|config| {
        let SupportedVideoCodec::H264(supported) = &config.codec;
        supported.profiles.contains(initial.profile)
            && supported.levels.contains(initial.level)
            && supported.packetization_modes.contains(initial.packetization_mode)
            && config.attributes.iter().any(|a| attributes_match(a, attributes))
    })
}

/// Whether a selected recording configuration is covered by the supported
/// recording configuration.
pub fn recording_supported(
    supported: &SupportedRecordingConfiguration,
    selected: &RecordingConfiguration,
) -> bool {
    if selected.recording.prebuffer_duration_ms > supported.recording.prebuffer_duration_ms {
        return false;
    }
    if !supported
        .recording
        .event_trigger_types
        .is_superset_of(selected.recording.event_trigger_types)
    {
        return false;
    }

    let container_ok = supported.recording.containers.iter().any(|container| {
        match (container, &selected.recording.container) {
            (
                ContainerConfiguration::FragmentedMp4 {
                    fragment_duration_ms: max,
                },
                ContainerConfiguration::FragmentedMp4 {
                    fragment_duration_ms: requested,
                },
            ) => requested <= max,
        }
    });
    if !container_ok {
        return false;
    }

    let RecordingVideoCodec::H264(params) = &selected.video.codec;
    let video_ok = supported.video.iter().any(|config| {
        let SupportedVideoCodec::H264(h264) = &config.codec;
        h264.profiles.contains(params.profile)
            && h264.levels.contains(params.level)
            && h264_bounds_ok(h264, params.bit_rate, params.i_frame_interval)
            && config
                .attributes
                .iter()
                .any(|a| attributes_match(a, &selected.video.attributes))
    });
    if !video_ok {
        return false;
    }

    supported.audio.iter().any(|config| {
        config.codec == selected.audio.codec
            && config.channels == selected.audio.channels
            && config.bit_rate_modes.contains(selected.audio.bit_rate_mode)
            && config.sample_rates.contains(selected.audio.sample_rate)
            && (config.max_bit_rate == 0 || selected.audio.bit_rate <= config.max_bit_rate)
    })
}
