//! The two-phase Setup-Endpoints transaction: a write stages the
//! controller's endpoint proposal, the following read commits it by
//! claiming the stream slot and answering with the accessory endpoint.

use std::time::Duration;

use bytes::Bytes;
use rand::RngExt;

use crate::accessory::resolve_stream;
use crate::config::CryptoSuite;
use crate::controller::{
    CameraController, HapSession, SessionPhase, SessionSetup, START_TIMEOUT, StreamingSession,
};
use crate::error::{CameraError, Result};
use crate::platform::{
    EndpointParameters, IpAddress, IpVersion, MediaEndpoint, SrtpParameters, StreamingStatus,
};
use crate::tlv::{TlvReader, TlvWriter, read_u8, read_u16};

mod tag {
    pub const SESSION_ID: u8 = 0x01;
    pub const STATUS: u8 = 0x02;
    pub const ADDRESS: u8 = 0x03;
    pub const SRTP_VIDEO: u8 = 0x04;
    pub const SRTP_AUDIO: u8 = 0x05;
    pub const VIDEO_SSRC: u8 = 0x06;
    pub const AUDIO_SSRC: u8 = 0x07;
}

mod address {
    pub const VERSION: u8 = 0x01;
    pub const IP_ADDRESS: u8 = 0x02;
    pub const VIDEO_PORT: u8 = 0x03;
    pub const AUDIO_PORT: u8 = 0x04;
}

mod srtp {
    pub const SUITE: u8 = 0x01;
    pub const KEY: u8 = 0x02;
    pub const SALT: u8 = 0x03;
}

const STATUS_SUCCESS: u8 = 0;
const STATUS_BUSY: u8 = 1;
const STATUS_ERROR: u8 = 2;

fn parse_address(value: &[u8]) -> Result<(IpAddress, u16, u16)> {
    let fields = TlvReader::new(value).read_all([
        address::VERSION,
        address::IP_ADDRESS,
        address::VIDEO_PORT,
        address::AUDIO_PORT,
    ])?;
    let [Some(version), Some(ip), Some(video_port), Some(audio_port)] = fields else {
        return Err(CameraError::InvalidData);
    };
    let version = IpVersion::from_wire(read_u8(&version)?)?;
    if ip.is_empty() || ip.len() > version.max_address_len() {
        return Err(CameraError::InvalidData);
    }
    let ip = String::from_utf8(ip).map_err(|_| CameraError::InvalidData)?;
    Ok((
        IpAddress {
            version,
            address: ip,
        },
        read_u16(&video_port)?,
        read_u16(&audio_port)?,
    ))
}

fn parse_srtp(value: &[u8]) -> Result<SrtpParameters> {
    let fields = TlvReader::new(value).read_all([srtp::SUITE, srtp::KEY, srtp::SALT])?;
    let [Some(suite), key, salt] = fields else {
        return Err(CameraError::InvalidData);
    };
    let suite = CryptoSuite::from_wire(read_u8(&suite)?)?;
    let key = key.unwrap_or_default();
    let salt = salt.unwrap_or_default();
    if key.len() != suite.key_len() || salt.len() != suite.salt_len() {
        tracing::debug!(
            suite = ?suite,
            key_len = key.len(),
            salt_len = salt.len(),
            "SRTP key material has the wrong length for the suite",
        );
        return Err(CameraError::InvalidData);
    }
    Ok(SrtpParameters { suite, key, salt })
}

fn write_srtp(writer: &mut TlvWriter, params: &SrtpParameters) -> Result<()> {
    writer.append_u8(srtp::SUITE, params.suite.wire())?;
    writer.append(srtp::KEY, &params.key)?;
    writer.append(srtp::SALT, &params.salt)
}

impl CameraController {
    /// Setup-Endpoints write: stage the controller's endpoint proposal.
    /// A second write for the same (HAP session, stream) replaces the
    /// first.
    pub fn write_setup_endpoints(
        &mut self,
        hap: HapSession,
        accessory_index: usize,
        service_iid: u64,
        payload: &[u8],
    ) -> Result<()> {
        self.check_hap_session(hap);
        let resolved = resolve_stream(&self.accessories, accessory_index, service_iid);
        self.ensure_streaming_enabled(accessory_index, resolved.stream_index)?;

        let fields = TlvReader::new(payload).read_all([
            tag::SESSION_ID,
            tag::ADDRESS,
            tag::SRTP_VIDEO,
            tag::SRTP_AUDIO,
        ])?;
        let [Some(id), Some(address), Some(video_srtp), Some(audio_srtp)] = fields else {
            return Err(CameraError::InvalidData);
        };
        let session_id: [u8; 16] = id.try_into().map_err(|_| CameraError::InvalidData)?;
        let (controller_address, video_port, audio_port) = parse_address(&address)?;
        let video_srtp = parse_srtp(&video_srtp)?;
        let audio_srtp = parse_srtp(&audio_srtp)?;

        let suites = self.accessories[accessory_index].streams[resolved.stream_index]
            .srtp_crypto_suites;
        if !suites.contains(video_srtp.suite) || !suites.contains(audio_srtp.suite) {
            tracing::debug!(
                video_suite = ?video_srtp.suite,
                audio_suite = ?audio_srtp.suite,
                "requested SRTP crypto suite is not advertised",
            );
            return Err(CameraError::InvalidData);
        }

        let setup_slot = self.setup_index(hap, resolved.session_index());
        self.setups[setup_slot] = Some(SessionSetup {
            session_id,
            controller_address,
            video_port,
            audio_port,
            video_srtp,
            audio_srtp,
        });
        Ok(())
    }

    /// Setup-Endpoints read: consume the staged proposal and, if the
    /// slot can be claimed, bind a session and answer with the accessory
    /// endpoint, SRTP material and SSRCs. Failure modes answer with a
    /// Busy or Error status payload rather than a handler error.
    pub fn read_setup_endpoints(
        &mut self,
        hap: HapSession,
        accessory_index: usize,
        service_iid: u64,
        now: Duration,
    ) -> Result<Bytes> {
        self.check_hap_session(hap);
        let resolved = resolve_stream(&self.accessories, accessory_index, service_iid);
        self.ensure_streaming_enabled(accessory_index, resolved.stream_index)?;
        let global_index = resolved.session_index();
        let stream_index = resolved.stream_index;

        let mut writer = TlvWriter::new(self.tlv_capacity);
        let setup_slot = self.setup_index(hap, global_index);
        let Some(setup) = self.setups[setup_slot].take() else {
            writer.append_u8(tag::STATUS, STATUS_ERROR)?;
            return Ok(writer.into_bytes());
        };

        let camera = self.accessories[accessory_index].camera().clone();
        if camera.stream_status(stream_index) != StreamingStatus::Available {
            tracing::debug!(
                accessory = accessory_index,
                stream = stream_index,
                "stream slot is busy",
            );
            writer.append(tag::SESSION_ID, &setup.session_id)?;
            writer.append_u8(tag::STATUS, STATUS_BUSY)?;
            return Ok(writer.into_bytes());
        }
        if camera
            .try_set_stream_status(stream_index, StreamingStatus::InUse)
            .is_err()
        {
            writer.append(tag::SESSION_ID, &setup.session_id)?;
            writer.append_u8(tag::STATUS, STATUS_ERROR)?;
            return Ok(writer.into_bytes());
        }

        let endpoint = camera.streaming_session_endpoint(stream_index, &setup.controller_address);
        let (accessory_address, video_port, audio_port) = match endpoint {
            Ok(endpoint) => endpoint,
            Err(err) => {
                tracing::error!(
                    accessory = accessory_index,
                    stream = stream_index,
                    %err,
                    "streaming endpoint lookup failed",
                );
                self.invalidate_stream(global_index);
                writer.append(tag::SESSION_ID, &setup.session_id)?;
                writer.append_u8(tag::STATUS, STATUS_ERROR)?;
                return Ok(writer.into_bytes());
            }
        };

        if setup.video_port < 1024 || setup.audio_port < 1024 {
            tracing::warn!(
                video_port = setup.video_port,
                audio_port = setup.audio_port,
                "controller requested a privileged RTP port",
            );
        }

        // Accessory-side key material, on the suites the controller chose.
        let video_srtp = SrtpParameters::generate(setup.video_srtp.suite);
        let audio_srtp = SrtpParameters::generate(setup.audio_srtp.suite);
        let mut rng = rand::rng();
        let video_ssrc: u32 = rng.random();
        let audio_ssrc = loop {
            let candidate: u32 = rng.random();
            if candidate != video_ssrc {
                break candidate;
            }
        };

        let reply = (|| -> Result<Bytes> {
            writer.append(tag::SESSION_ID, &setup.session_id)?;
            writer.append_u8(tag::STATUS, STATUS_SUCCESS)?;
            writer.nested(tag::ADDRESS, |a| {
                a.append_u8(address::VERSION, accessory_address.version.wire())?;
                a.append(address::IP_ADDRESS, accessory_address.address.as_bytes())?;
                a.append_u16(address::VIDEO_PORT, video_port)?;
                a.append_u16(address::AUDIO_PORT, audio_port)
            })?;
            writer.nested(tag::SRTP_VIDEO, |s| write_srtp(s, &video_srtp))?;
            writer.nested(tag::SRTP_AUDIO, |s| write_srtp(s, &audio_srtp))?;
            writer.append_u32(tag::VIDEO_SSRC, video_ssrc)?;
            writer.append_u32(tag::AUDIO_SSRC, audio_ssrc)?;
            Ok(writer.into_bytes())
        })();
        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                // Don't leave a claimed slot behind a failed reply.
                if let Err(release) =
                    camera.try_set_stream_status(stream_index, StreamingStatus::Available)
                {
                    tracing::error!(%release, "failed to release stream slot");
                }
                return Err(err);
            }
        };

        self.sessions[global_index] = Some(StreamingSession {
            hap_session: hap.0,
            session_id: setup.session_id,
            phase: SessionPhase::SetUp,
            controller: EndpointParameters {
                address: setup.controller_address,
                video: MediaEndpoint {
                    port: setup.video_port,
                    srtp: setup.video_srtp,
                    // Controller SSRCs arrive with the Start command.
                    ssrc: 0,
                },
                audio: MediaEndpoint {
                    port: setup.audio_port,
                    srtp: setup.audio_srtp,
                    ssrc: 0,
                },
            },
            accessory: EndpointParameters {
                address: accessory_address,
                video: MediaEndpoint {
                    port: video_port,
                    srtp: video_srtp,
                    ssrc: video_ssrc,
                },
                audio: MediaEndpoint {
                    port: audio_port,
                    srtp: audio_srtp,
                    ssrc: audio_ssrc,
                },
            },
            initial_video: None,
            deadline: Some(now + START_TIMEOUT),
        });
        tracing::debug!(
            accessory = accessory_index,
            stream = stream_index,
            hap_session = hap.0,
            "streaming session set up",
        );
        Ok(reply)
    }
}

/// Build a Setup-Endpoints write payload the way a controller would.
#[cfg(test)]
pub(crate) fn setup_write_payload(
    session_id: [u8; 16],
    controller: &IpAddress,
    video_port: u16,
    audio_port: u16,
    suite: CryptoSuite,
) -> Bytes {
    let mut writer = TlvWriter::new(512);
    writer.append(tag::SESSION_ID, &session_id).unwrap();
    writer
        .nested(tag::ADDRESS, |a| {
            a.append_u8(address::VERSION, controller.version.wire())?;
            a.append(address::IP_ADDRESS, controller.address.as_bytes())?;
            a.append_u16(address::VIDEO_PORT, video_port)?;
            a.append_u16(address::AUDIO_PORT, audio_port)
        })
        .unwrap();
    let params = SrtpParameters::generate(suite);
    for tag in [tag::SRTP_VIDEO, tag::SRTP_AUDIO] {
        writer.nested(tag, |s| write_srtp(s, &params)).unwrap();
    }
    writer.into_bytes()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::accessory::{Accessory, Service, ServiceKind};
    use crate::config::{CryptoSuiteSet, StreamingCapabilities};
    use crate::controller::ControllerConfig;
    use crate::platform::CameraDriver;
    use crate::platform::mock::MockCamera;
    use crate::tlv::read_u32;

    fn controller_with(camera: Arc<MockCamera>) -> CameraController {
        let capabilities = StreamingCapabilities {
            srtp_crypto_suites: CryptoSuiteSet::of(&[
                CryptoSuite::AesCm128HmacSha1_80,
                CryptoSuite::Disabled,
            ]),
            ..StreamingCapabilities::default()
        };
        CameraController::new(
            vec![Accessory {
                name: "cam".into(),
                services: vec![Service {
                    iid: 10,
                    kind: ServiceKind::RtpStreamManagement,
                }],
                streams: vec![capabilities],
                camera: Some(camera),
                recording: None,
            }],
            ControllerConfig::default(),
        )
    }

    fn controller_ip() -> IpAddress {
        IpAddress {
            version: IpVersion::V4,
            address: "10.0.0.7".into(),
        }
    }

    #[test]
    fn read_without_staged_setup_answers_error_status() {
        let camera = Arc::new(MockCamera::new(1));
        let mut engine = controller_with(camera);
        let reply = engine
            .read_setup_endpoints(HapSession(0), 0, 10, Duration::ZERO)
            .unwrap();
        let fields = TlvReader::new(&reply)
            .read_all([tag::SESSION_ID, tag::STATUS])
            .unwrap();
        assert!(fields[0].is_none());
        assert_eq!(fields[1], Some(vec![STATUS_ERROR]));
    }

    #[test]
    fn successful_commit_claims_slot_and_answers_endpoint() {
        let camera = Arc::new(MockCamera::new(1));
        let mut engine = controller_with(camera.clone());
        let payload = setup_write_payload(
            [7; 16],
            &controller_ip(),
            5000,
            5002,
            CryptoSuite::AesCm128HmacSha1_80,
        );
        engine
            .write_setup_endpoints(HapSession(0), 0, 10, &payload)
            .unwrap();
        let reply = engine
            .read_setup_endpoints(HapSession(0), 0, 10, Duration::ZERO)
            .unwrap();

        assert_eq!(camera.status(0), StreamingStatus::InUse);
        let fields = TlvReader::new(&reply)
            .read_all([
                tag::SESSION_ID,
                tag::STATUS,
                tag::ADDRESS,
                tag::SRTP_VIDEO,
                tag::SRTP_AUDIO,
                tag::VIDEO_SSRC,
                tag::AUDIO_SSRC,
            ])
            .unwrap();
        assert_eq!(fields[0], Some(vec![7; 16]));
        assert_eq!(fields[1], Some(vec![STATUS_SUCCESS]));
        let video_ssrc = read_u32(fields[5].as_ref().unwrap()).unwrap();
        let audio_ssrc = read_u32(fields[6].as_ref().unwrap()).unwrap();
        assert_ne!(video_ssrc, audio_ssrc);

        let srtp = parse_srtp(fields[3].as_ref().unwrap()).unwrap();
        assert_eq!(srtp.suite, CryptoSuite::AesCm128HmacSha1_80);
        assert_eq!(srtp.key.len(), 16);
        assert_eq!(srtp.salt.len(), 14);

        // The staged setup was consumed and the 30 s watchdog is armed.
        assert_eq!(engine.next_timer_deadline(), Some(START_TIMEOUT));
    }

    #[test]
    fn busy_slot_answers_busy_and_consumes_the_setup() {
        let camera = Arc::new(MockCamera::new(1));
        let mut engine = controller_with(camera.clone());
        camera
            .try_set_stream_status(0, StreamingStatus::InUse)
            .unwrap();

        let payload = setup_write_payload(
            [9; 16],
            &controller_ip(),
            5000,
            5002,
            CryptoSuite::Disabled,
        );
        engine
            .write_setup_endpoints(HapSession(1), 0, 10, &payload)
            .unwrap();
        let reply = engine
            .read_setup_endpoints(HapSession(1), 0, 10, Duration::ZERO)
            .unwrap();
        let fields = TlvReader::new(&reply)
            .read_all([tag::SESSION_ID, tag::STATUS])
            .unwrap();
        assert_eq!(fields[0], Some(vec![9; 16]));
        assert_eq!(fields[1], Some(vec![STATUS_BUSY]));

        // Second read finds nothing staged.
        let reply = engine
            .read_setup_endpoints(HapSession(1), 0, 10, Duration::ZERO)
            .unwrap();
        let fields = TlvReader::new(&reply)
            .read_all([tag::SESSION_ID, tag::STATUS])
            .unwrap();
        assert_eq!(fields[1], Some(vec![STATUS_ERROR]));
    }

    #[test]
    fn write_rejects_unadvertised_suite() {
        let camera = Arc::new(MockCamera::new(1));
        let mut engine = controller_with(camera);
        let payload = setup_write_payload(
            [1; 16],
            &controller_ip(),
            5000,
            5002,
            CryptoSuite::Aes256CmHmacSha1_80,
        );
        assert_eq!(
            engine.write_setup_endpoints(HapSession(0), 0, 10, &payload),
            Err(CameraError::InvalidData)
        );
    }

    #[test]
    fn disabled_stream_rejects_setup() {
        let camera = Arc::new(MockCamera::new(1));
        camera.set_manually_disabled(true);
        let mut engine = controller_with(camera);
        let payload = setup_write_payload(
            [1; 16],
            &controller_ip(),
            5000,
            5002,
            CryptoSuite::Disabled,
        );
        assert_eq!(
            engine.write_setup_endpoints(HapSession(0), 0, 10, &payload),
            Err(CameraError::InvalidState)
        );
    }
}
