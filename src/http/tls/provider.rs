//! TLS engine selection
//!
//! A scenario picks the TLS engine by name. Only names listed in
//! `NamedProvider` are representable, so an unknown provider is rejected
//! when the name is parsed rather than when a context is built.

use super::config::{TlsError, TlsVersion};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// TLS engine used by the assembled server and by the probe client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TlsProvider {
    /// The platform's default engine
    Default,
    /// An engine selected by name
    Named(NamedProvider),
}

/// Engines that can be selected by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedProvider {
    /// BoringSSL-based engine shipped as a wrapped native module
    Conscrypt,
}

impl NamedProvider {
    /// Provider name as published in host properties
    pub fn as_str(&self) -> &'static str {
        match self {
            NamedProvider::Conscrypt => "Conscrypt",
        }
    }
}

impl FromStr for NamedProvider {
    type Err = TlsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("conscrypt") {
            Ok(NamedProvider::Conscrypt)
        } else {
            Err(TlsError::UnknownProvider(s.to_string()))
        }
    }
}

impl fmt::Display for NamedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TlsProvider {
    /// Provider name, `None` for the default engine
    pub fn name(&self) -> Option<&'static str> {
        match self {
            TlsProvider::Default => None,
            TlsProvider::Named(named) => Some(named.as_str()),
        }
    }

    /// Client-side protocol and cipher profile for this engine
    pub fn profile(&self) -> ProviderProfile {
        match self {
            TlsProvider::Default => ProviderProfile {
                min_version: TlsVersion::Tls12,
                max_version: None,
                cipher_list: None,
            },
            // AEAD-only suites, as BoringSSL negotiates them for HTTP/2
            TlsProvider::Named(NamedProvider::Conscrypt) => ProviderProfile {
                min_version: TlsVersion::Tls12,
                max_version: Some(TlsVersion::Tls13),
                cipher_list: Some(
                    "ECDHE-ECDSA-AES128-GCM-SHA256:ECDHE-RSA-AES128-GCM-SHA256:\
                     ECDHE-ECDSA-AES256-GCM-SHA384:ECDHE-RSA-AES256-GCM-SHA384:\
                     ECDHE-ECDSA-CHACHA20-POLY1305:ECDHE-RSA-CHACHA20-POLY1305",
                ),
            },
        }
    }
}

impl FromStr for TlsProvider {
    type Err = TlsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.eq_ignore_ascii_case("default") {
            Ok(TlsProvider::Default)
        } else {
            s.parse().map(TlsProvider::Named)
        }
    }
}

impl fmt::Display for TlsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().unwrap_or("default"))
    }
}

/// Settings a provider imposes on a TLS context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub min_version: TlsVersion,
    pub max_version: Option<TlsVersion>,
    pub cipher_list: Option<&'static str>,
}
