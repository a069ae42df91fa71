//! Scenario runs
//!
//! Runs the activation check and then the protocol check against one
//! assembled system and collects both into a `VerificationResult`.

use super::activation::{assert_modules_resolved, ModuleHost, ModuleStates};
use super::discovery::PropertySource;
use super::probe::{Expectation, HandshakeOutcome, Http2Probe, HttpOutcome};
use crate::error::Error;
use crate::manifest::Manifest;

/// How a run treats the activation check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationPolicy {
    /// Inactive required modules fail the run before any network I/O
    #[default]
    Mandatory,
    /// Inactive modules are logged and recorded; the protocol check still runs
    DiagnosticOnly,
}

/// Everything observed during one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationResult {
    pub module_states: ModuleStates,
    pub handshake: Option<HandshakeOutcome>,
    pub http: Option<HttpOutcome>,
}

/// A failed run: what was observed before the failure, and the failure
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RunFailure {
    pub partial: VerificationResult,
    #[source]
    pub error: Error,
}

/// One verification run against a live host
pub struct ScenarioRun<'a> {
    host: &'a dyn ModuleHost,
    properties: &'a dyn PropertySource,
    manifest: &'a Manifest,
    policy: ActivationPolicy,
}

impl<'a> ScenarioRun<'a> {
    pub fn new(host: &'a dyn ModuleHost, properties: &'a dyn PropertySource, manifest: &'a Manifest) -> Self {
        ScenarioRun {
            host,
            properties,
            manifest,
            policy: ActivationPolicy::default(),
        }
    }

    pub fn policy(mut self, policy: ActivationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run the activation check, then the protocol check
    pub fn verify(&self, probe: &Http2Probe, expectation: &Expectation) -> Result<VerificationResult, RunFailure> {
        let mut result = VerificationResult::default();

        match assert_modules_resolved(self.host, self.manifest) {
            Ok(states) => result.module_states = states,
            Err(err) => {
                if let super::ActivationError::NotActive { states, .. } = &err {
                    result.module_states = states.clone();
                }
                match self.policy {
                    ActivationPolicy::Mandatory => {
                        return Err(RunFailure {
                            partial: result,
                            error: err.into(),
                        })
                    }
                    ActivationPolicy::DiagnosticOnly => {
                        tracing::warn!(error = %err, "Continuing past activation failure");
                    }
                }
            }
        }

        match probe.verify(self.properties, expectation) {
            Ok(outcome) => {
                result.handshake = Some(outcome.handshake);
                result.http = Some(outcome.http);
                Ok(result)
            }
            Err(err) => {
                result.handshake = err.handshake_outcome();
                Err(RunFailure {
                    partial: result,
                    error: err.into(),
                })
            }
        }
    }
}
