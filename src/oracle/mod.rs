//! Verification oracle
//!
//! Two checks run against an assembled system:
//!
//! - **Activation** (`activation`): every required module of the manifest
//!   is active in the host, with per-module diagnostics when one is not
//! - **Protocol** (`probe`): a TLS client offering the scenario's ALPN
//!   list negotiates `h2` and fetches a page with the expected status and
//!   content
//!
//! The host and the property channel are injected as trait objects, so
//! the checks run the same against a real module host or the loopback
//! fixture.
//!
//! # Examples
//!
//! ```no_run
//! use h2harness::http::tls::KeystoreFixture;
//! use h2harness::oracle::{Expectation, Http2Probe, ProcessEnv};
//! use h2harness::scenario::ScenarioConfig;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scenario = ScenarioConfig::conscrypt_h2();
//! let keystore = KeystoreFixture::new("src/test/config/etc/keystore", "OBF:1vny1zlo1x8e1vnw1vn61x8g1zlu1vn4")?;
//!
//! let probe = Http2Probe::new(&scenario, keystore);
//! let outcome = probe.verify(&ProcessEnv, &Expectation::get("/jsp/jstl.jsp").body_contains("JSTL Example"))?;
//! println!("{}", outcome.handshake);
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod discovery;
pub mod pool;
pub mod probe;
pub mod run;

pub use activation::{
    assert_modules_resolved, assert_services_registered, ActivationError, ModuleDiagnostic, ModuleHost,
    ModuleReport, ModuleState, ModuleStates,
};
pub use discovery::{read_port, DiscoveryError, ProcessEnv, PropertySource, HTTPS_PORT_KEY};
pub use pool::WorkerPool;
pub use probe::{
    BodyAssertion, Expectation, HandshakeOutcome, Http2Probe, HttpOutcome, ProtocolError, ProtocolOutcome,
};
pub use run::{ActivationPolicy, RunFailure, ScenarioRun, VerificationResult};
