//! In-memory camera driver for tests and demos.

use parking_lot::Mutex;

use crate::config::RecordingConfiguration;
use crate::error::{CameraError, Result};
use crate::platform::{
    CameraDriver, EndpointParameters, IpAddress, IpVersion, ReconfigureConfiguration,
    StartConfiguration, StreamingStatus,
};

/// Media pipeline phase of one mock stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Started,
    Suspended,
}

#[derive(Debug)]
struct StreamState {
    status: StreamingStatus,
    streaming_active: bool,
    phase: Option<StreamPhase>,
    start_count: usize,
    last_start: Option<StartConfiguration>,
    last_reconfigure: Option<ReconfigureConfiguration>,
}

impl StreamState {
    fn new() -> Self {
        StreamState {
            status: StreamingStatus::Available,
            streaming_active: true,
            phase: None,
            start_count: 0,
            last_start: None,
            last_reconfigure: None,
        }
    }
}

#[derive(Debug)]
struct Inner {
    streams: Vec<StreamState>,
    homekit_camera_active: bool,
    third_party_camera_active: bool,
    manually_disabled: bool,
    recording: Option<RecordingConfiguration>,
    recording_store_count: usize,
    recording_active: bool,
    recording_audio_active: bool,
    address: IpAddress,
    fail_next_start: bool,
    fail_recording_fetch: bool,
}

/// A camera whose pipeline is a pile of booleans.
///
/// All toggles default to a healthy, enabled camera with every stream
/// available. Failure injection and state inspection happen through the
/// inherent methods.
#[derive(Debug)]
pub struct MockCamera {
    inner: Mutex<Inner>,
}

impl MockCamera {
    pub fn new(num_streams: usize) -> Self {
        MockCamera {
            inner: Mutex::new(Inner {
                streams: (0..num_streams).map(|_| StreamState::new()).collect(),
                homekit_camera_active: true,
                third_party_camera_active: false,
                manually_disabled: false,
                recording: None,
                recording_store_count: 0,
                recording_active: true,
                recording_audio_active: false,
                address: IpAddress {
                    version: IpVersion::V4,
                    address: "192.168.1.40".into(),
                },
                fail_next_start: false,
                fail_recording_fetch: false,
            }),
        }
    }

    pub fn set_homekit_camera_active(&self, active: bool) {
        self.inner.lock().homekit_camera_active = active;
    }

    pub fn set_manually_disabled(&self, disabled: bool) {
        self.inner.lock().manually_disabled = disabled;
    }

    pub fn set_third_party_camera_active(&self, active: bool) {
        self.inner.lock().third_party_camera_active = active;
    }

    pub fn set_address(&self, address: IpAddress) {
        self.inner.lock().address = address;
    }

    /// Make the next `start_streaming_session` call fail.
    pub fn fail_next_start(&self) {
        self.inner.lock().fail_next_start = true;
    }

    /// Make `recording_configuration` fail until cleared.
    pub fn fail_recording_fetch(&self, fail: bool) {
        self.inner.lock().fail_recording_fetch = fail;
    }

    pub fn phase(&self, stream_index: usize) -> Option<StreamPhase> {
        self.inner.lock().streams[stream_index].phase
    }

    pub fn status(&self, stream_index: usize) -> StreamingStatus {
        self.inner.lock().streams[stream_index].status
    }

    pub fn start_count(&self, stream_index: usize) -> usize {
        self.inner.lock().streams[stream_index].start_count
    }

    pub fn last_start(&self, stream_index: usize) -> Option<StartConfiguration> {
        self.inner.lock().streams[stream_index].last_start.clone()
    }

    pub fn last_reconfigure(&self, stream_index: usize) -> Option<ReconfigureConfiguration> {
        self.inner.lock().streams[stream_index].last_reconfigure
    }

    pub fn stored_recording(&self) -> Option<RecordingConfiguration> {
        self.inner.lock().recording.clone()
    }

    /// Number of `set_recording_configuration` calls, for idempotence checks.
    pub fn recording_store_count(&self) -> usize {
        self.inner.lock().recording_store_count
    }
}

impl CameraDriver for MockCamera {
    fn stream_status(&self, stream_index: usize) -> StreamingStatus {
        self.inner.lock().streams[stream_index].status
    }

    fn try_set_stream_status(&self, stream_index: usize, status: StreamingStatus) -> Result<()> {
        let mut inner = self.inner.lock();
        let stream = &mut inner.streams[stream_index];
        if status == StreamingStatus::InUse && stream.status != StreamingStatus::Available {
            return Err(CameraError::InvalidState);
        }
        stream.status = status;
        Ok(())
    }

    fn is_streaming_active(&self, stream_index: usize) -> Result<bool> {
        Ok(self.inner.lock().streams[stream_index].streaming_active)
    }

    fn set_streaming_active(&self, stream_index: usize, active: bool) -> Result<()> {
        self.inner.lock().streams[stream_index].streaming_active = active;
        Ok(())
    }

    fn is_homekit_camera_active(&self) -> Result<bool> {
        Ok(self.inner.lock().homekit_camera_active)
    }

    fn is_third_party_camera_active(&self) -> Result<bool> {
        Ok(self.inner.lock().third_party_camera_active)
    }

    fn is_manually_disabled(&self) -> Result<bool> {
        Ok(self.inner.lock().manually_disabled)
    }

    fn streaming_session_endpoint(
        &self,
        stream_index: usize,
        _controller_address: &IpAddress,
    ) -> Result<(IpAddress, u16, u16)> {
        let inner = self.inner.lock();
        let base = 50000 + (stream_index as u16) * 4;
        Ok((inner.address.clone(), base, base + 2))
    }

    fn start_streaming_session(
        &self,
        stream_index: usize,
        _controller: &EndpointParameters,
        _accessory: &EndpointParameters,
        configuration: &StartConfiguration,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_next_start {
            inner.fail_next_start = false;
            return Err(CameraError::Unknown);
        }
        let stream = &mut inner.streams[stream_index];
        stream.phase = Some(StreamPhase::Started);
        stream.start_count += 1;
        stream.last_start = Some(configuration.clone());
        Ok(())
    }

    fn suspend_streaming_session(&self, stream_index: usize) -> Result<()> {
        self.inner.lock().streams[stream_index].phase = Some(StreamPhase::Suspended);
        Ok(())
    }

    fn resume_streaming_session(&self, stream_index: usize) -> Result<()> {
        self.inner.lock().streams[stream_index].phase = Some(StreamPhase::Started);
        Ok(())
    }

    fn reconfigure_streaming_session(
        &self,
        stream_index: usize,
        configuration: &ReconfigureConfiguration,
    ) -> Result<()> {
        self.inner.lock().streams[stream_index].last_reconfigure = Some(*configuration);
        Ok(())
    }

    fn end_streaming_session(&self, stream_index: usize) {
        self.inner.lock().streams[stream_index].phase = None;
    }

    fn recording_configuration(&self) -> Result<Option<RecordingConfiguration>> {
        let inner = self.inner.lock();
        if inner.fail_recording_fetch {
            return Err(CameraError::Unknown);
        }
        Ok(inner.recording.clone())
    }

    fn set_recording_configuration(&self, configuration: &RecordingConfiguration) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.recording = Some(configuration.clone());
        inner.recording_store_count += 1;
        Ok(())
    }

    fn invalidate_recording_configuration(&self) -> Result<()> {
        self.inner.lock().recording = None;
        Ok(())
    }

    fn is_recording_active(&self) -> Result<bool> {
        Ok(self.inner.lock().recording_active)
    }

    fn set_recording_active(&self, active: bool) -> Result<()> {
        self.inner.lock().recording_active = active;
        Ok(())
    }

    fn is_recording_audio_active(&self) -> Result<bool> {
        Ok(self.inner.lock().recording_audio_active)
    }

    fn set_recording_audio_active(&self, active: bool) -> Result<()> {
        self.inner.lock().recording_audio_active = active;
        Ok(())
    }
}
