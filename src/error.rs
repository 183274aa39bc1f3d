//! Error types for the STRING-db client.
//!
//! Every fallible operation in the crate returns [Result] with one of
//! the variants below.  A [Error::Fetch] carries the [RemoteCall] that
//! failed so callers can tell the three STRING endpoints apart.

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// The remote STRING-db call that a [Error::Fetch] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCall {
    /// `get_string_ids` - identifier resolution
    ResolveIds,
    /// `network` - interaction lookup
    Network,
    /// `enrichment` - functional enrichment table
    Enrichment,
    /// `enrichmentfigure` - remote-rendered enrichment figure
    EnrichmentFigure,
    /// `network` with image output - remote-rendered network figure
    NetworkImage,
}

impl RemoteCall {
    pub fn method(&self) -> &'static str {
        match self {
            RemoteCall::ResolveIds => "get_string_ids",
            RemoteCall::Network => "network",
            RemoteCall::Enrichment => "enrichment",
            RemoteCall::EnrichmentFigure => "enrichmentfigure",
            RemoteCall::NetworkImage => "network (image)",
        }
    }
}

impl std::fmt::Display for RemoteCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.method())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// The species name or taxonomy code matched no entry in the
    /// registry
    #[error("unknown species: '{0}' - expected a common name like \"human\" or an NCBI taxonomy code")]
    UnknownSpecies(String),

    /// Bad caller arguments, surfaced before any request is issued
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A remote STRING-db call failed (transport, HTTP status or a
    /// malformed response)
    #[error("STRING request '{call}' failed: {reason}")]
    Fetch { call: RemoteCall, reason: String },

    /// A state-dependent operation was invoked before the step that
    /// produces its prerequisite
    #[error("missing prerequisite: {0} - call construct_network() (and extract_subnets() for subnetworks) first")]
    RequireNetwork(String),

    /// Rendering a plot artifact failed, typically because there was
    /// nothing to render
    #[error("plotting failed: {0}")]
    Plotting(String),

    /// Reading or writing the annotation cache file failed
    #[error("annotation cache error: {0}")]
    Cache(String),

    /// `construct_network()` failed; wraps the upstream error
    #[error("network construction failed: {0}")]
    Construct(#[source] Box<Error>),
}

impl Error {
    pub(crate) fn fetch(call: RemoteCall, reason: impl Into<String>) -> Error {
        Error::Fetch { call, reason: reason.into() }
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Error {
        Error::Cache(err.to_string())
    }
}
