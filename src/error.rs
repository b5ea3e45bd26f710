use hickory_proto::error::ProtoError;
use thiserror::Error;

/// Fatal, non-DNS-data errors. Transport-level outcomes (NXDOMAIN, SERVFAIL,
/// TIMEOUT, NODATA) are never represented here -- they are recorded as
/// addresses on a [`crate::model::Name`] instead, per the tracer's error
/// handling design.
#[derive(Error, Debug)]
pub enum TracerError {
    #[error("unknown record type in answer section: {0}")]
    UnknownRecordType(String),

    #[error("malformed serialized graph: {0}")]
    Codec(String),

    #[error("refusing to recurse past depth {0}")]
    RecursionLimit(u32),

    #[error("no nameservers available to query")]
    NoNameservers,

    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("protocol error")]
    Proto(#[from] ProtoError),

    #[error("could not resolve bootstrap root server {0}: {1}")]
    RootBootstrap(String, String),

    #[error("{0}")]
    Unconfigured(String),
}

impl From<serde_yaml::Error> for TracerError {
    fn from(e: serde_yaml::Error) -> Self {
        TracerError::Codec(e.to_string())
    }
}

impl From<serde_json::Error> for TracerError {
    fn from(e: serde_json::Error) -> Self {
        TracerError::Codec(e.to_string())
    }
}
