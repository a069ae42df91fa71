//! Out-of-band port discovery
//!
//! The assembled server binds an ephemeral port and publishes it under a
//! well-known key. The probe reads that key once, before touching the
//! network.

use crate::scenario::SystemProperties;

/// Key the host publishes its TLS port under
pub const HTTPS_PORT_KEY: &str = "boot.https.port";

/// Read-only key/value lookup
pub trait PropertySource {
    fn property(&self, key: &str) -> Option<String>;
}

impl PropertySource for SystemProperties {
    fn property(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }
}

/// Process environment, with `boot.https.port` looked up as `BOOT_HTTPS_PORT`
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl ProcessEnv {
    pub fn env_name(key: &str) -> String {
        key.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }
}

impl PropertySource for ProcessEnv {
    fn property(&self, key: &str) -> Option<String> {
        std::env::var(Self::env_name(key)).ok()
    }
}

/// Why a port could not be read
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("property {0} is not set")]
    Missing(String),

    #[error("property {key} is not a port: {value:?}")]
    NotAPort { key: String, value: String },
}

/// Read a port from `source`, trimming surrounding whitespace
pub fn read_port(source: &dyn PropertySource, key: &str) -> Result<u16, DiscoveryError> {
    let value = source
        .property(key)
        .ok_or_else(|| DiscoveryError::Missing(key.to_string()))?;

    match value.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(DiscoveryError::NotAPort {
            key: key.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_port_trims() {
        let props = SystemProperties::new().with(HTTPS_PORT_KEY, " 8443\n");
        assert_eq!(read_port(&props, HTTPS_PORT_KEY).unwrap(), 8443);
    }

    #[test]
    fn test_missing_port() {
        let props = SystemProperties::new();
        assert_eq!(
            read_port(&props, HTTPS_PORT_KEY),
            Err(DiscoveryError::Missing(HTTPS_PORT_KEY.to_string()))
        );
    }

    #[test]
    fn test_non_numeric_port() {
        for value in ["https", "", "70000", "0", "-1"] {
            let props = SystemProperties::new().with(HTTPS_PORT_KEY, value);
            assert!(matches!(
                read_port(&props, HTTPS_PORT_KEY),
                Err(DiscoveryError::NotAPort { .. })
            ));
        }
    }

    #[test]
    fn test_env_name() {
        assert_eq!(ProcessEnv::env_name("boot.https.port"), "BOOT_HTTPS_PORT");
    }
}
