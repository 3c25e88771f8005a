//! Error taxonomy shared across the engine.
//!
//! Mirrors the kinds named in the engine's error-handling design: each
//! variant carries a human-readable message built with `format!()`, the
//! way every other surface in this workspace constructs its errors.

use thiserror::Error;

pub type HopsResult<T> = Result<T, HopsError>;

#[derive(Error, Debug, Clone)]
pub enum HopsError {
    /// Policy parse/validate failure.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Missing kernel/initfs/rootfs image.
    #[error("environment error: {0}")]
    Environment(String),

    /// Container table entry already exists.
    #[error("capacity error: {0}")]
    Capacity(String),

    /// Operation on an unknown container id.
    #[error("state error: {0}")]
    State(String),

    /// Insecure mount or forbidden path.
    #[error("isolation error: {0}")]
    Isolation(String),

    /// Resource limit out of range, or exceeded at runtime.
    #[error("resource error: {0}")]
    Resource(String),

    /// Socket, file-copy, or rootfs-provisioning I/O failure.
    #[error("io error: {0}")]
    Io(String),

    /// Container create/start/wait failure.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Programmer-error conditions that should never happen in practice.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HopsError {
    /// Short machine-readable kind, used in the wire error string and in
    /// log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            HopsError::Configuration(_) => "ConfigurationError",
            HopsError::Environment(_) => "EnvironmentError",
            HopsError::Capacity(_) => "CapacityError",
            HopsError::State(_) => "StateError",
            HopsError::Isolation(_) => "IsolationError",
            HopsError::Resource(_) => "ResourceError",
            HopsError::Io(_) => "IOError",
            HopsError::Runtime(_) => "RuntimeError",
            HopsError::Internal(_) => "InternalError",
        }
    }
}

impl From<std::io::Error> for HopsError {
    fn from(e: std::io::Error) -> Self {
        HopsError::Io(e.to_string())
    }
}
