//! Error types for the camera negotiation library.

/// Errors surfaced by characteristic handlers and platform driver calls.
///
/// The variants map one-to-one onto the HAP status codes the host reports
/// to the controller:
///
/// - [`InvalidData`](Self::InvalidData) — malformed or unsupported request
///   payload (HAP status -70410, Invalid value).
/// - [`InvalidState`](Self::InvalidState) — request not allowed in the
///   current state, e.g. streaming disabled or a stream owned by another
///   controller (HAP status -70412).
/// - [`OutOfResources`](Self::OutOfResources) — a response or timer budget
///   was exhausted (HAP status -70407).
/// - [`Unknown`](Self::Unknown) — the platform camera driver failed.
///
/// Accessory-side contract violations (unregistered camera, storage sized
/// wrong) are not represented here; they panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    /// Request payload is malformed or requests an unsupported configuration.
    #[error("invalid data")]
    InvalidData,

    /// Request is not allowed in the current state.
    #[error("not allowed in the current state")]
    InvalidState,

    /// A buffer or timer budget was exhausted.
    #[error("out of resources")]
    OutOfResources,

    /// The platform camera driver reported a failure.
    #[error("platform error")]
    Unknown,
}

/// Convenience alias for `Result<T, CameraError>`.
pub type Result<T> = std::result::Result<T, CameraError>;
