//! Recording configuration negotiation: supported reads, selected
//! read/write with an idempotence guard, and supported-change handling.

mod tlv;

use bytes::Bytes;

use crate::config::{RecordingChange, RecordingChangeSet, SupportedRecordingConfiguration};
use crate::controller::{CameraController, ChangeEvent};
use crate::error::{CameraError, Result};
use crate::matcher;

impl CameraController {
    /// Fetch the accessory's supported recording configuration.
    ///
    /// The underlying source completes asynchronously on the platform
    /// side, so at most one fetch may be outstanding; issuing a second
    /// one is a programming error, not a field condition.
    fn fetch_supported_recording(&self, accessory_index: usize) -> SupportedRecordingConfiguration {
        assert!(
            !self.recording_fetch_in_flight.replace(true),
            "supported recording configuration fetch is already in flight",
        );
        let accessory = &self.accessories[accessory_index];
        let supported = match &accessory.recording {
            Some(supported) => supported.clone(),
            None => panic!(
                "no recording configuration registered for accessory {:?}",
                accessory.name
            ),
        };
        // Clear before handing the result to the caller, so the caller
        // may issue a follow-up fetch.
        self.recording_fetch_in_flight.set(false);
        supported
    }

    /// Supported Camera Recording Configuration read.
    pub fn read_supported_camera_recording_configuration(
        &self,
        accessory_index: usize,
    ) -> Result<Bytes> {
        let supported = self.fetch_supported_recording(accessory_index);
        tlv::supported_camera_recording(&supported.recording, self.tlv_capacity)
    }

    /// Supported Video Recording Configuration read.
    pub fn read_supported_video_recording_configuration(
        &self,
        accessory_index: usize,
    ) -> Result<Bytes> {
        let supported = self.fetch_supported_recording(accessory_index);
        tlv::supported_video_recording(&supported.video, self.tlv_capacity)
    }

    /// Supported Audio Recording Configuration read.
    pub fn read_supported_audio_recording_configuration(
        &self,
        accessory_index: usize,
    ) -> Result<Bytes> {
        let supported = self.fetch_supported_recording(accessory_index);
        tlv::supported_audio_recording(&supported.audio, self.tlv_capacity)
    }

    /// Selected Camera Recording Configuration read. An accessory with no
    /// selected configuration answers with an empty payload.
    pub fn read_selected_recording_configuration(&self, accessory_index: usize) -> Result<Bytes> {
        let camera = self.accessories[accessory_index].camera();
        match camera.recording_configuration()? {
            Some(configuration) => tlv::selected_recording(&configuration, self.tlv_capacity),
            None => Ok(Bytes::new()),
        }
    }

    /// Selected Camera Recording Configuration write. Re-selecting the
    /// configuration the camera already holds is a no-op: no driver call,
    /// no change event.
    pub fn write_selected_recording_configuration(
        &mut self,
        accessory_index: usize,
        payload: &[u8],
    ) -> Result<()> {
        let selected = tlv::parse_selected_recording(payload)?;
        let supported = self.fetch_supported_recording(accessory_index);
        if !matcher::recording_supported(&supported, &selected) {
            tracing::debug!(
                accessory = accessory_index,
                "selected recording configuration is not supported",
            );
            return Err(CameraError::InvalidData);
        }

        let camera = self.accessories[accessory_index].camera().clone();
        if camera.recording_configuration()?.as_ref() == Some(&selected) {
            tracing::debug!(
                accessory = accessory_index,
                "selected recording configuration unchanged",
            );
            return Ok(());
        }
        camera.set_recording_configuration(&selected)?;
        tracing::debug!(accessory = accessory_index, "recording configuration stored");
        self.events
            .push_back(ChangeEvent::SelectedRecordingConfiguration {
                accessory: accessory_index,
            });
        Ok(())
    }

    /// The accessory's supported recording configuration changed. If the
    /// persisted selection is no longer covered it is invalidated, and
    /// change events are raised for each changed supported characteristic.
    pub fn handle_supported_recording_change(
        &mut self,
        accessory_index: usize,
        changes: RecordingChangeSet,
    ) -> Result<()> {
        let supported = self.fetch_supported_recording(accessory_index);
        let camera = self.accessories[accessory_index].camera().clone();
        if let Some(current) = camera.recording_configuration()? {
            if !matcher::recording_supported(&supported, &current) {
                tracing::debug!(
                    accessory = accessory_index,
                    "persisted recording configuration no longer supported",
                );
                camera.invalidate_recording_configuration()?;
                self.events
                    .push_back(ChangeEvent::SelectedRecordingConfiguration {
                        accessory: accessory_index,
                    });
            }
        }
        for change in changes.iter() {
            self.events.push_back(match change {
                RecordingChange::Camera => ChangeEvent::SupportedCameraRecordingConfiguration {
                    accessory: accessory_index,
                },
                RecordingChange::Video => ChangeEvent::SupportedVideoRecordingConfiguration {
                    accessory: accessory_index,
                },
                RecordingChange::Audio => ChangeEvent::SupportedAudioRecordingConfiguration {
                    accessory: accessory_index,
                },
            });
        }
        Ok(())
    }

    /// Recording management Active read.
    pub fn read_recording_active(&self, accessory_index: usize) -> Result<bool> {
        self.accessories[accessory_index].camera().is_recording_active()
    }

    /// Recording management Active write, with a change event on
    /// transitions. Disabling recording is handled by the driver; the
    /// engine only stores and notifies.
    pub fn write_recording_active(&mut self, accessory_index: usize, active: bool) -> Result<()> {
        let camera = self.accessories[accessory_index].camera().clone();
        if camera.is_recording_active()? == active {
            return Ok(());
        }
        tracing::debug!(
            accessory = accessory_index,
            active,
            "camera event recordings toggled",
        );
        camera.set_recording_active(active)?;
        self.events.push_back(ChangeEvent::RecordingActive {
            accessory: accessory_index,
        });
        Ok(())
    }

    /// Recording Audio Active read.
    pub fn read_recording_audio_active(&self, accessory_index: usize) -> Result<bool> {
        self.accessories[accessory_index]
            .camera()
            .is_recording_audio_active()
    }

    /// Recording Audio Active write, with a change event on transitions.
    pub fn write_recording_audio_active(
        &mut self,
        accessory_index: usize,
        active: bool,
    ) -> Result<()> {
        let camera = self.accessories[accessory_index].camera().clone();
        if camera.is_recording_audio_active()? == active {
            return Ok(());
        }
        camera.set_recording_audio_active(active)?;
        self.events.push_back(ChangeEvent::RecordingAudioActive {
            accessory: accessory_index,
        });
        Ok(())
    }
}
