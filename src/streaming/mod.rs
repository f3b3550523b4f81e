//! RTP streaming negotiation: supported-configuration reads, the
//! Setup-Endpoints transaction and the session control state machine.
//!
//! Handlers are methods on [`CameraController`]; the host routes
//! characteristic reads and writes of the RTP stream management service
//! here with the raw TLV payloads.

mod control;
mod serialize;
mod setup;

use bytes::Bytes;

use crate::accessory::resolve_stream;
use crate::controller::{CameraController, ChangeEvent};
use crate::error::{CameraError, Result};
use crate::tlv::TlvWriter;

mod status {
    pub const STATUS: u8 = 0x01;
}

impl CameraController {
    /// Streaming Status read: TLV `{1: status}`.
    pub fn read_streaming_status(&self, accessory_index: usize, service_iid: u64) -> Result<Bytes> {
        let resolved = resolve_stream(&self.accessories, accessory_index, service_iid);
        let camera = self.accessories[accessory_index].camera();
        let current = camera.stream_status(resolved.stream_index);
        let mut writer = TlvWriter::new(self.tlv_capacity);
        writer.append_u8(status::STATUS, current.wire())?;
        Ok(writer.into_bytes())
    }

    /// Supported Video Stream Configuration read.
    pub fn read_supported_video_configuration(
        &self,
        accessory_index: usize,
        service_iid: u64,
    ) -> Result<Bytes> {
        let resolved = resolve_stream(&self.accessories, accessory_index, service_iid);
        let capabilities = &self.accessories[accessory_index].streams[resolved.stream_index];
        serialize::supported_video_configuration(capabilities, self.tlv_capacity)
    }

    /// Supported Audio Stream Configuration read.
    pub fn read_supported_audio_configuration(
        &self,
        accessory_index: usize,
        service_iid: u64,
    ) -> Result<Bytes> {
        let resolved = resolve_stream(&self.accessories, accessory_index, service_iid);
        let capabilities = &self.accessories[accessory_index].streams[resolved.stream_index];
        serialize::supported_audio_configuration(capabilities, self.tlv_capacity)
    }

    /// Supported RTP Configuration read.
    pub fn read_supported_rtp_configuration(
        &self,
        accessory_index: usize,
        service_iid: u64,
    ) -> Result<Bytes> {
        let resolved = resolve_stream(&self.accessories, accessory_index, service_iid);
        let capabilities = &self.accessories[accessory_index].streams[resolved.stream_index];
        serialize::supported_rtp_configuration(capabilities, self.tlv_capacity)
    }

    /// Selected RTP Stream Configuration read: precondition check only,
    /// the characteristic has no meaningful read payload.
    pub fn read_selected_rtp_configuration(
        &self,
        accessory_index: usize,
        service_iid: u64,
    ) -> Result<Bytes> {
        let resolved = resolve_stream(&self.accessories, accessory_index, service_iid);
        self.ensure_streaming_enabled(accessory_index, resolved.stream_index)?;
        Ok(Bytes::new())
    }

    /// Active characteristic write. Toggling a stream off tears down any
    /// bound session and clears staged setups for that stream across all
    /// HAP sessions.
    pub fn write_streaming_active(
        &mut self,
        accessory_index: usize,
        service_iid: u64,
        active: bool,
    ) -> Result<()> {
        let resolved = resolve_stream(&self.accessories, accessory_index, service_iid);
        let camera = self.accessories[accessory_index].camera().clone();
        if camera.is_streaming_active(resolved.stream_index)? == active {
            return Ok(());
        }
        camera.set_streaming_active(resolved.stream_index, active)?;
        if !active {
            tracing::debug!(
                accessory = accessory_index,
                stream = resolved.stream_index,
                "stream deactivated, sweeping session and setups",
            );
            let global_index = resolved.session_index();
            self.invalidate_stream(global_index);
            for hap in 0..self.max_hap_sessions {
                self.setups[hap * self.num_streams + global_index] = None;
            }
        }
        self.events.push_back(ChangeEvent::StreamingActive {
            accessory: accessory_index,
            service_iid,
        });
        Ok(())
    }

    /// Third Party Camera Active read (camera operating mode). Reported
    /// only; third-party use never blocks HAP streaming.
    pub fn read_third_party_camera_active(&self, accessory_index: usize) -> Result<bool> {
        self.accessories[accessory_index]
            .camera()
            .is_third_party_camera_active()
    }

    /// Streaming is enabled iff the stream's Active characteristic is on,
    /// HomeKit camera use is on, and the physical privacy switch is off.
    pub(crate) fn ensure_streaming_enabled(
        &self,
        accessory_index: usize,
        stream_index: usize,
    ) -> Result<()> {
        let camera = self.accessories[accessory_index].camera();
        let enabled = camera.is_streaming_active(stream_index)?
            && camera.is_homekit_camera_active()?
            && !camera.is_manually_disabled()?;
        if enabled {
            Ok(())
        } else {
            tracing::debug!(
                accessory = accessory_index,
                stream = stream_index,
                "streaming is disabled",
            );
            Err(CameraError::InvalidState)
        }
    }
}
