//! h2harness - module composition and HTTP/2 verification harness
//!
//! This crate declares the runtime modules needed to stand up a modular
//! HTTP/2 server behind a pluggable TLS engine, and checks the assembled
//! system: that the declared modules activated, and that an HTTP/2 client
//! negotiates `h2` over TLS and gets the expected page back.
//!
//! - `scenario`: what distinguishes one assembled system from another
//! - `manifest`: the declarative module list handed to the resolution engine
//! - `oracle`: the activation check and the protocol check
//! - `http`: the TLS and HTTP/2 transport the protocol check runs on
//! - `fixture`: a loopback server and an in-memory module host

pub mod error;
pub mod fixture;
pub mod http;
pub mod logging;
pub mod manifest;
pub mod oracle;
pub mod scenario;

pub use error::{Contract, Error, Result};
pub use manifest::{build_manifest, Manifest, ManifestBuilder};
pub use oracle::{Expectation, Http2Probe, ScenarioRun, VerificationResult};
pub use scenario::ScenarioConfig;
