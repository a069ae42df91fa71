//! Crate-level error

use crate::manifest::ManifestError;
use crate::oracle::{ActivationError, ProtocolError};
use std::fmt;

/// Result type for crate-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which check a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contract {
    /// Manifest or module activation
    ModuleActivation,
    /// Port discovery, TLS, ALPN or HTTP/2 transport
    ProtocolHandshake,
    /// Response status or body
    ContentAssertion,
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Contract::ModuleActivation => "module activation",
            Contract::ProtocolHandshake => "protocol handshake",
            Contract::ContentAssertion => "content assertion",
        })
    }
}

/// Any failure of a scenario
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Module activation failed: {0}")]
    ModuleActivation(#[from] ActivationError),

    #[error("Protocol check failed: {0}")]
    Protocol(#[from] ProtocolError),
}

impl Error {
    /// Which contract failed; timeouts and transport failures count as
    /// handshake failures
    pub fn contract(&self) -> Contract {
        match self {
            Error::Manifest(_) | Error::ModuleActivation(_) => Contract::ModuleActivation,
            Error::Protocol(e) if e.is_content_assertion() => Contract::ContentAssertion,
            Error::Protocol(_) => Contract::ProtocolHandshake,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::DiscoveryError;

    #[test]
    fn test_contract_classification() {
        let missing: Error = ProtocolError::from(DiscoveryError::Missing("boot.https.port".into())).into();
        assert_eq!(missing.contract(), Contract::ProtocolHandshake);

        let alpn: Error = ProtocolError::UnexpectedProtocol(Some("http/1.1".into())).into();
        assert_eq!(alpn.contract(), Contract::ProtocolHandshake);

        let timeout: Error = ProtocolError::Timeout(std::time::Duration::from_secs(30)).into();
        assert_eq!(timeout.contract(), Contract::ProtocolHandshake);
        let transport: Error = ProtocolError::Transport("connection refused".into()).into();
        assert_eq!(transport.contract(), Contract::ProtocolHandshake);

        let body: Error = ProtocolError::BodyMismatch {
            fragment: "JSTL Example".into(),
            body: String::new(),
        }
        .into();
        assert_eq!(body.contract(), Contract::ContentAssertion);

        let inactive: Error = ActivationError::NotInstalled("org.conscrypt".into()).into();
        assert_eq!(inactive.contract(), Contract::ModuleActivation);
    }
}
