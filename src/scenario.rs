//! Scenario configuration
//!
//! A `ScenarioConfig` names the TLS engine, the ALPN protocols offered, the
//! ports the assembled server binds and the properties injected into the
//! host before activation. It is built once per scenario and not mutated
//! afterwards; both the manifest builder and the probe read from it.

use crate::http::tls::{NamedProvider, TlsProvider};
use crate::http::{ALPN_H2, ALPN_HTTP11};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// ALPN protocol identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlpnProtocol {
    H2,
    Http11,
    Other(String),
}

impl AlpnProtocol {
    pub fn as_str(&self) -> &str {
        match self {
            AlpnProtocol::H2 => ALPN_H2,
            AlpnProtocol::Http11 => ALPN_HTTP11,
            AlpnProtocol::Other(id) => id,
        }
    }

    pub fn is_h2(&self) -> bool {
        matches!(self, AlpnProtocol::H2)
    }
}

impl From<&str> for AlpnProtocol {
    fn from(id: &str) -> Self {
        match id {
            ALPN_H2 => AlpnProtocol::H2,
            ALPN_HTTP11 => AlpnProtocol::Http11,
            other => AlpnProtocol::Other(other.to_string()),
        }
    }
}

impl fmt::Display for AlpnProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Port a connector binds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortSpec {
    Fixed(u16),
    /// Chosen by the OS; published after binding
    Ephemeral,
}

impl PortSpec {
    /// Value handed to the host (`0` asks for an ephemeral port)
    pub fn as_property(&self) -> String {
        match self {
            PortSpec::Fixed(port) => port.to_string(),
            PortSpec::Ephemeral => "0".to_string(),
        }
    }
}

/// Log level forwarded to the host and to local tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(format!("unknown log level: {}", s)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered key/value properties
///
/// Iteration order is the key order, so two equal maps always render the
/// same way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemProperties(BTreeMap<String, String>);

impl SystemProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Copy every entry of `other` over this map
    pub fn extend_from(&mut self, other: &SystemProperties) {
        for (key, value) in other.iter() {
            self.set(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The web bundle deployed last
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadBundle {
    pub group_id: String,
    pub artifact_id: String,
    pub classifier: String,
    /// Whether the bundle serves JSP pages
    pub uses_jsp: bool,
}

impl PayloadBundle {
    /// The Jetty demo web application
    pub fn test_webapp() -> Self {
        PayloadBundle {
            group_id: "org.eclipse.jetty".to_string(),
            artifact_id: "test-jetty-webapp".to_string(),
            classifier: "webbundle".to_string(),
            uses_jsp: true,
        }
    }
}

/// Everything that distinguishes one assembled system from another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub tls_provider: TlsProvider,
    pub application_protocols: Vec<AlpnProtocol>,
    pub http_port: PortSpec,
    pub tls_port: PortSpec,
    pub system_properties: SystemProperties,
    pub log_level: LogLevel,
    pub payload: PayloadBundle,
}

impl ScenarioConfig {
    /// Start from the default engine offering only HTTP/1.1
    pub fn builder() -> ScenarioConfigBuilder {
        ScenarioConfigBuilder::new()
    }

    /// HTTP/2 over the Conscrypt engine, offering `h2` then `http/1.1`
    pub fn conscrypt_h2() -> Self {
        ScenarioConfig::builder()
            .tls_provider(TlsProvider::Named(NamedProvider::Conscrypt))
            .protocols(&["h2", "http/1.1"])
            .build()
    }

    /// Whether any offered protocol is HTTP/2
    pub fn offers_h2(&self) -> bool {
        self.application_protocols.iter().any(AlpnProtocol::is_h2)
    }

    /// Offered protocols as strings, in order
    pub fn protocol_ids(&self) -> Vec<&str> {
        self.application_protocols.iter().map(AlpnProtocol::as_str).collect()
    }
}

/// Builder for `ScenarioConfig`
#[derive(Debug, Clone)]
pub struct ScenarioConfigBuilder {
    config: ScenarioConfig,
}

impl ScenarioConfigBuilder {
    fn new() -> Self {
        ScenarioConfigBuilder {
            config: ScenarioConfig {
                tls_provider: TlsProvider::Default,
                application_protocols: vec![AlpnProtocol::Http11],
                http_port: PortSpec::Ephemeral,
                tls_port: PortSpec::Ephemeral,
                system_properties: SystemProperties::new(),
                log_level: LogLevel::Warn,
                payload: PayloadBundle::test_webapp(),
            },
        }
    }

    pub fn tls_provider(mut self, provider: TlsProvider) -> Self {
        self.config.tls_provider = provider;
        self
    }

    /// Offered protocols, most preferred first; duplicates are dropped
    pub fn protocols(mut self, protocols: &[&str]) -> Self {
        let mut ordered: Vec<AlpnProtocol> = Vec::with_capacity(protocols.len());
        for id in protocols {
            let protocol = AlpnProtocol::from(*id);
            if !ordered.contains(&protocol) {
                ordered.push(protocol);
            }
        }
        self.config.application_protocols = ordered;
        self
    }

    pub fn http_port(mut self, port: PortSpec) -> Self {
        self.config.http_port = port;
        self
    }

    pub fn tls_port(mut self, port: PortSpec) -> Self {
        self.config.tls_port = port;
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.system_properties.set(key, value);
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    pub fn payload(mut self, payload: PayloadBundle) -> Self {
        self.config.payload = payload;
        self
    }

    pub fn build(self) -> ScenarioConfig {
        self.config
    }
}
