//! Error types for vmregistry
//!
//! Step-specific lifecycle failures carry the underlying cause and the
//! list of resources already committed when the sequence stopped.

use crate::orchestrator::{Commit, Step};
use thiserror::Error;

/// Result type alias for vmregistry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for vmregistry
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing request fields
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No VM matches the query
    #[error("Not found: {0}")]
    NotFound(String),

    /// A domain could not be located by name
    #[error("Lookup failed: {0}")]
    LookupFailed(String),

    /// A backend could not be reached or enumerated
    #[error("Backend unavailable ({backend}): {message}")]
    BackendUnavailable {
        /// Backend name
        backend: String,
        /// Error message
        message: String,
    },

    /// A backend rejected an operation
    #[error("Backend error ({backend}): {message}")]
    Backend {
        /// Backend name
        backend: String,
        /// Error message
        message: String,
    },

    /// Domain XML could not be decoded
    #[error("Malformed domain XML: {0}")]
    MalformedDomainXml(String),

    /// Domain XML could not be read, parsed, or carries no IP
    #[error("Domain description unavailable for {name}: {reason}")]
    DomainDescriptionUnavailable {
        /// Domain name
        name: String,
        /// Why the description is unusable
        reason: String,
    },

    /// Every allocation attempt collided with an existing VM
    #[error("Failed to allocate an address after {attempts} attempts")]
    AddressPoolExhausted {
        /// Number of candidates tried
        attempts: usize,
        /// Resources committed before allocation
        committed: Vec<Commit>,
    },

    /// Volume creation or image clone failed
    #[error("Storage provisioning failed for {name}: {source}")]
    StorageProvisioningFailed {
        /// VM name
        name: String,
        /// Resources committed before the failure
        committed: Vec<Commit>,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// Domain define or start failed
    #[error("Domain creation failed for {name}: {source}")]
    DomainCreationFailed {
        /// VM name
        name: String,
        /// Resources committed before the failure
        committed: Vec<Commit>,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// DNS record registration or removal failed
    #[error("DNS update failed for {name}: {source}")]
    DnsUpdateFailed {
        /// VM name
        name: String,
        /// Resources committed before the failure
        committed: Vec<Commit>,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// Domain undefine failed; storage was left in place
    #[error("Domain removal failed for {name}: {source}")]
    DomainRemovalFailed {
        /// VM name
        name: String,
        /// Resources committed before the failure
        committed: Vec<Commit>,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// Volume removal failed after the domain was undefined
    #[error("Storage removal failed for {name}: {source}")]
    StorageRemovalFailed {
        /// VM name
        name: String,
        /// Resources committed before the failure
        committed: Vec<Commit>,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// Domain template could not be rendered
    #[error("Template error: {0}")]
    Template(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication errors (from backend APIs)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The caller cancelled the operation between steps
    #[error("Operation cancelled before {step}")]
    Cancelled {
        /// The step that was not started
        step: Step,
        /// Resources committed before cancellation
        committed: Vec<Commit>,
    },
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a lookup error
    pub fn lookup_failed(msg: impl Into<String>) -> Self {
        Self::LookupFailed(msg.into())
    }

    /// Create a backend-unavailable error
    pub fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a backend operation error
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a malformed XML error
    pub fn malformed_xml(msg: impl Into<String>) -> Self {
        Self::MalformedDomainXml(msg.into())
    }

    /// Create a template error
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Resources committed before a lifecycle sequence stopped
    ///
    /// Empty for errors that are not raised by a lifecycle step.
    pub fn committed(&self) -> &[Commit] {
        match self {
            Self::AddressPoolExhausted { committed, .. }
            | Self::StorageProvisioningFailed { committed, .. }
            | Self::DomainCreationFailed { committed, .. }
            | Self::DnsUpdateFailed { committed, .. }
            | Self::DomainRemovalFailed { committed, .. }
            | Self::StorageRemovalFailed { committed, .. }
            | Self::Cancelled { committed, .. } => committed,
            _ => &[],
        }
    }

    /// Whether the caller caused the error and retrying the same request is pointless
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::NotFound(_) | Self::LookupFailed(_)
        )
    }

    /// Whether the caller may retry the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable { .. } | Self::AddressPoolExhausted { .. }
        )
    }
}
