//! What a TLS handshake negotiated
//!
//! Collected once, right after the handshake, so failures can be reported
//! with the version, cipher and ALPN result that were actually in effect.

use openssl::nid::Nid;
use openssl::ssl::{NameType, SslRef};
use std::fmt;

/// TLS variables available after handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsVars {
    /// Negotiated TLS version (e.g., "TLSv1.3")
    pub version: String,

    /// Negotiated cipher suite
    pub cipher: String,

    /// SNI servername
    pub servername: Option<String>,

    /// Negotiated ALPN protocol
    pub alpn: Option<String>,

    /// Common name of the peer certificate
    pub peer_subject: Option<String>,
}

impl TlsVars {
    /// Read the negotiated parameters from an established connection
    pub fn from_ssl(ssl: &SslRef) -> Self {
        let peer_subject = ssl.peer_certificate().and_then(|cert| {
            cert.subject_name()
                .entries_by_nid(Nid::COMMONNAME)
                .next()
                .and_then(|entry| entry.data().as_utf8().ok())
                .map(|s| s.to_string())
        });

        TlsVars {
            version: ssl.version_str().to_string(),
            cipher: ssl
                .current_cipher()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "<undef>".to_string()),
            servername: ssl.servername(NameType::HOST_NAME).map(|s| s.to_string()),
            alpn: ssl
                .selected_alpn_protocol()
                .map(|p| String::from_utf8_lossy(p).into_owned()),
            peer_subject,
        }
    }
}

impl fmt::Display for TlsVars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} alpn={}",
            self.version,
            self.cipher,
            self.alpn.as_deref().unwrap_or("<none>")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_without_alpn() {
        let vars = TlsVars {
            version: "TLSv1.3".to_string(),
            cipher: "TLS_AES_128_GCM_SHA256".to_string(),
            servername: None,
            alpn: None,
            peer_subject: None,
        };
        assert_eq!(vars.to_string(), "TLSv1.3 TLS_AES_128_GCM_SHA256 alpn=<none>");
    }
}
