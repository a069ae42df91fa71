//! Keystore fixture
//!
//! The probe trusts, and authenticates with, a key store supplied out of
//! band: a PKCS#12 or PEM file plus a password that may be stored in the
//! obfuscated `OBF:` form used by Jetty configuration files.
//!
//! Credentials are a scoped resource. `KeystoreFixture::open` loads them,
//! the caller configures a TLS context from them and drops them; the
//! password is never logged.

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, SubjectAlternativeName, SubjectKeyIdentifier,
};
use openssl::x509::{X509NameBuilder, X509Ref, X509};
use std::fmt;
use std::path::{Path, PathBuf};

/// Prefix of an obfuscated password
pub const OBFUSCATION_PREFIX: &str = "OBF:";

/// Keystore errors
#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    #[error("cannot read keystore {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write keystore {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed obfuscated password: {0}")]
    Obfuscation(String),

    #[error("keystore {path} does not contain {missing}")]
    Incomplete { path: PathBuf, missing: &'static str },

    #[error("keystore {path} could not be decoded: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: openssl::error::ErrorStack,
    },

    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
}

/// A keystore password held in clear only for the lifetime of the value
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    /// Accept either a clear password or an `OBF:` encoded one
    pub fn parse(raw: &str) -> Result<Self, KeystoreError> {
        match raw.strip_prefix(OBFUSCATION_PREFIX) {
            Some(encoded) => deobfuscate(encoded).map(Password),
            None => Ok(Password(raw.to_string())),
        }
    }

    /// Wrap a clear password
    pub fn clear(raw: impl Into<String>) -> Self {
        Password(raw.into())
    }

    /// Render in the `OBF:` form
    pub fn obfuscated(&self) -> String {
        format!("{}{}", OBFUSCATION_PREFIX, obfuscate(&self.0))
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    loop {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
        if value == 0 {
            break;
        }
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Jetty password obfuscation. Each byte is mixed with its mirror byte and
/// written as four base-36 digits; bytes outside ASCII use a `U` escape.
fn obfuscate(clear: &str) -> String {
    let bytes = clear.as_bytes();
    let mut out = String::with_capacity(bytes.len() * 4);
    for i in 0..bytes.len() {
        let b1 = bytes[i];
        let b2 = bytes[bytes.len() - (i + 1)];
        if b1 > 0x7f || b2 > 0x7f {
            let value = u32::from(b1) * 256 + u32::from(b2);
            out.push('U');
            out.push_str(&format!("{:0>4}", to_base36(value)));
        } else {
            let i1 = 127 + u32::from(b1) + u32::from(b2);
            let i2 = 127 + u32::from(b1) - u32::from(b2);
            let value = i1 * 256 + i2;
            out.push_str(&format!("{:0>4}", to_base36(value)));
        }
    }
    out
}

fn deobfuscate(encoded: &str) -> Result<String, KeystoreError> {
    let malformed = || KeystoreError::Obfuscation(encoded.to_string());
    let chars = encoded.as_bytes();
    let mut bytes = Vec::with_capacity(chars.len() / 4);
    let mut pos = 0;

    while pos < chars.len() {
        let escaped = chars[pos] == b'U';
        if escaped {
            pos += 1;
        }
        let chunk = encoded.get(pos..pos + 4).ok_or_else(malformed)?;
        let value = u32::from_str_radix(chunk, 36).map_err(|_| malformed())?;
        let byte = if escaped {
            value >> 8
        } else {
            let i1 = value / 256;
            let i2 = value % 256;
            (i1 + i2).checked_sub(254).ok_or_else(malformed)? / 2
        };
        bytes.push(u8::try_from(byte).map_err(|_| malformed())?);
        pos += 4;
    }

    String::from_utf8(bytes).map_err(|_| malformed())
}

/// Location and password of a key/trust store
#[derive(Debug, Clone)]
pub struct KeystoreFixture {
    path: PathBuf,
    password: Password,
}

impl KeystoreFixture {
    /// Describe a keystore file; `password` may be obfuscated
    pub fn new(path: impl Into<PathBuf>, password: &str) -> Result<Self, KeystoreError> {
        Ok(KeystoreFixture {
            path: path.into(),
            password: Password::parse(password)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load key, certificate and chain
    pub fn open(&self) -> Result<Credentials, KeystoreError> {
        let bytes = std::fs::read(&self.path).map_err(|source| KeystoreError::Read {
            path: self.path.clone(),
            source,
        })?;

        if bytes.starts_with(b"-----BEGIN") {
            self.open_pem(&bytes)
        } else {
            self.open_pkcs12(&bytes)
        }
    }

    fn open_pkcs12(&self, der: &[u8]) -> Result<Credentials, KeystoreError> {
        let decode = |source| KeystoreError::Decode {
            path: self.path.clone(),
            source,
        };
        let parsed = Pkcs12::from_der(der)
            .map_err(decode)?
            .parse2(self.password.expose())
            .map_err(decode)?;

        let certificate = parsed.cert.ok_or_else(|| self.incomplete("a certificate"))?;
        let key = parsed.pkey.ok_or_else(|| self.incomplete("a private key"))?;
        let chain = parsed
            .ca
            .map(|stack| stack.into_iter().collect())
            .unwrap_or_default();

        Ok(Credentials { certificate, key, chain })
    }

    fn open_pem(&self, pem: &[u8]) -> Result<Credentials, KeystoreError> {
        let decode = |source| KeystoreError::Decode {
            path: self.path.clone(),
            source,
        };
        let mut certs = X509::stack_from_pem(pem).map_err(decode)?.into_iter();
        let certificate = certs.next().ok_or_else(|| self.incomplete("a certificate"))?;
        let key = if self.password.expose().is_empty() {
            PKey::private_key_from_pem(pem)
        } else {
            PKey::private_key_from_pem_passphrase(pem, self.password.expose().as_bytes())
        }
        .map_err(decode)?;

        Ok(Credentials {
            certificate,
            key,
            chain: certs.collect(),
        })
    }

    fn incomplete(&self, missing: &'static str) -> KeystoreError {
        KeystoreError::Incomplete {
            path: self.path.clone(),
            missing,
        }
    }

    /// Write a self-signed PKCS#12 store for `common_name` and describe it
    pub fn generate_self_signed(
        path: impl Into<PathBuf>,
        password: &str,
        common_name: &str,
    ) -> Result<Self, KeystoreError> {
        let fixture = KeystoreFixture::new(path, password)?;
        let (certificate, key) = self_signed(common_name)?;

        let mut builder = Pkcs12::builder();
        builder.name(common_name).pkey(&key).cert(&certificate);
        let der = builder.build2(fixture.password.expose())?.to_der()?;

        std::fs::write(&fixture.path, der).map_err(|source| KeystoreError::Write {
            path: fixture.path.clone(),
            source,
        })?;
        Ok(fixture)
    }
}

fn self_signed(common_name: &str) -> Result<(X509, PKey<Private>), KeystoreError> {
    let key = PKey::from_rsa(Rsa::generate(2048)?)?;

    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_text("CN", common_name)?;
    let name = name.build();

    let mut serial = BigNum::new()?;
    serial.rand(64, MsbOption::MAYBE_ZERO, false)?;

    let mut builder = X509::builder()?;
    builder.set_version(2)?;
    builder.set_serial_number(serial.to_asn1_integer()?.as_ref())?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_pubkey(&key)?;
    builder.set_not_before(Asn1Time::days_from_now(0)?.as_ref())?;
    builder.set_not_after(Asn1Time::days_from_now(365)?.as_ref())?;
    builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
    let subject_key_id =
        SubjectKeyIdentifier::new().build(&builder.x509v3_context(None, None))?;
    builder.append_extension(subject_key_id)?;
    let authority_key_id = AuthorityKeyIdentifier::new()
        .keyid(false)
        .build(&builder.x509v3_context(None, None))?;
    builder.append_extension(authority_key_id)?;
    let san = SubjectAlternativeName::new()
        .dns(common_name)
        .ip("127.0.0.1")
        .build(&builder.x509v3_context(None, None))?;
    builder.append_extension(san)?;
    builder.sign(&key, MessageDigest::sha256())?;

    Ok((builder.build(), key))
}

/// Key material loaded from a keystore
pub struct Credentials {
    certificate: X509,
    key: PKey<Private>,
    chain: Vec<X509>,
}

impl Credentials {
    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    pub fn private_key(&self) -> &PKeyRef<Private> {
        &self.key
    }

    pub fn chain(&self) -> &[X509] {
        &self.chain
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JETTY_TEST_PASSWORD: &str = "OBF:1vny1zlo1x8e1vnw1vn61x8g1zlu1vn4";

    #[test]
    fn test_deobfuscate_jetty_test_password() {
        let password = Password::parse(JETTY_TEST_PASSWORD).unwrap();
        assert_eq!(password.expose(), "storepwd");
    }

    #[test]
    fn test_obfuscate_matches_jetty() {
        assert_eq!(Password::clear("storepwd").obfuscated(), JETTY_TEST_PASSWORD);
    }

    #[test]
    fn test_non_ascii_uses_escape() {
        let password = Password::clear("päss");
        let encoded = password.obfuscated();
        assert!(encoded.contains('U'));
        assert_eq!(Password::parse(&encoded).unwrap(), password);
    }

    #[test]
    fn test_clear_password_passthrough() {
        assert_eq!(Password::parse("secret").unwrap().expose(), "secret");
    }

    #[test]
    fn test_malformed_obfuscation() {
        assert!(matches!(Password::parse("OBF:1vn"), Err(KeystoreError::Obfuscation(_))));
        assert!(matches!(Password::parse("OBF:!!!!"), Err(KeystoreError::Obfuscation(_))));
    }

    #[test]
    fn test_password_debug_is_redacted() {
        let rendered = format!("{:?}", Password::clear("storepwd"));
        assert!(!rendered.contains("storepwd"));
    }

    #[test]
    fn test_generate_and_open_pkcs12() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystore.p12");

        let fixture =
            KeystoreFixture::generate_self_signed(&path, JETTY_TEST_PASSWORD, "localhost").unwrap();
        let credentials = fixture.open().unwrap();

        let cn = credentials
            .certificate()
            .subject_name()
            .entries_by_nid(openssl::nid::Nid::COMMONNAME)
            .next()
            .unwrap()
            .data()
            .as_utf8()
            .unwrap()
            .to_string();
        assert_eq!(cn, "localhost");
        assert!(credentials.chain().is_empty());
    }

    #[test]
    fn test_wrong_password_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystore.p12");
        KeystoreFixture::generate_self_signed(&path, "right", "localhost").unwrap();

        let fixture = KeystoreFixture::new(&path, "wrong").unwrap();
        assert!(matches!(fixture.open(), Err(KeystoreError::Decode { .. })));
    }

    #[test]
    fn test_open_pem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.pem");
        let (cert, key) = self_signed("localhost").unwrap();
        let mut pem = cert.to_pem().unwrap();
        pem.extend(key.private_key_to_pem_pkcs8().unwrap());
        std::fs::write(&path, pem).unwrap();

        let credentials = KeystoreFixture::new(&path, "").unwrap().open().unwrap();
        assert!(credentials.certificate().public_key().unwrap().public_eq(&key));
    }

    #[test]
    fn test_missing_file() {
        let fixture = KeystoreFixture::new("/nonexistent/keystore.p12", "x").unwrap();
        assert!(matches!(fixture.open(), Err(KeystoreError::Read { .. })));
    }
}
