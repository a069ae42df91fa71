//! Module activation check
//!
//! One synchronous look at the host after resolution: every module the
//! manifest marks as required must be active. On failure each offending
//! module's report is logged and carried in the error so the composition
//! problem can be diagnosed without re-running.

use crate::manifest::{Manifest, ModuleCoordinates};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of a module in the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleState {
    Uninstalled,
    Installed,
    Resolved,
    Starting,
    Active,
    Stopping,
}

impl ModuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Uninstalled => "UNINSTALLED",
            ModuleState::Installed => "INSTALLED",
            ModuleState::Resolved => "RESOLVED",
            ModuleState::Starting => "STARTING",
            ModuleState::Active => "ACTIVE",
            ModuleState::Stopping => "STOPPING",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the host knows about one installed module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleReport {
    pub symbolic_name: String,
    pub state: ModuleState,
    /// Modules this one is wired to, nearest first
    pub dependency_chain: Vec<String>,
    /// Import clauses no exporter satisfied
    pub unsatisfied_imports: Vec<String>,
}

impl ModuleReport {
    pub fn new(symbolic_name: impl Into<String>, state: ModuleState) -> Self {
        ModuleReport {
            symbolic_name: symbolic_name.into(),
            state,
            dependency_chain: Vec::new(),
            unsatisfied_imports: Vec::new(),
        }
    }
}

/// Live view of the module host
pub trait ModuleHost {
    /// Report for an installed module, `None` if it is not installed
    fn module_report(&self, module: &ModuleCoordinates) -> Option<ModuleReport>;

    /// Report for a module looked up by symbolic name
    fn report_by_name(&self, symbolic_name: &str) -> Option<ModuleReport>;

    /// Services registered by the named module, `None` if it is not installed
    fn registered_services(&self, symbolic_name: &str) -> Option<usize>;
}

/// Observed state per module identity
pub type ModuleStates = BTreeMap<ModuleCoordinates, ModuleState>;

/// Why one required module is not active
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDiagnostic {
    pub module: ModuleCoordinates,
    /// `None` when the host never installed the module
    pub report: Option<ModuleReport>,
}

impl fmt::Display for ModuleDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.report {
            None => write!(f, "{} is not installed", self.module),
            Some(report) => {
                write!(f, "{} ({}) is {}", self.module, report.symbolic_name, report.state)?;
                if !report.unsatisfied_imports.is_empty() {
                    write!(f, "; unsatisfied imports: {}", report.unsatisfied_imports.join(", "))?;
                }
                if !report.dependency_chain.is_empty() {
                    write!(f, "; via {}", report.dependency_chain.join(" -> "))?;
                }
                Ok(())
            }
        }
    }
}

/// Activation check failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum ActivationError {
    #[error("{} required module(s) not active: {}", .diagnostics.len(), summary(.diagnostics))]
    NotActive {
        diagnostics: Vec<ModuleDiagnostic>,
        /// States of every manifest module, including the healthy ones
        states: ModuleStates,
    },

    #[error("module {0} is not installed")]
    NotInstalled(String),

    #[error("module {symbolic_name} registered no services")]
    NoServices { symbolic_name: String },
}

impl ActivationError {
    pub fn diagnostics(&self) -> &[ModuleDiagnostic] {
        match self {
            ActivationError::NotActive { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}

fn summary(diagnostics: &[ModuleDiagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.module.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Check that every required module of `manifest` is active
///
/// Modules declared `NoStart` are reported in the returned states but do
/// not fail the check.
pub fn assert_modules_resolved(host: &dyn ModuleHost, manifest: &Manifest) -> Result<ModuleStates, ActivationError> {
    let mut states = ModuleStates::new();
    let mut diagnostics = Vec::new();

    for module in &manifest.modules {
        let report = host.module_report(&module.coordinates);
        let state = report.as_ref().map_or(ModuleState::Uninstalled, |r| r.state);
        states.insert(module.coordinates.clone(), state);

        tracing::debug!(module = %module.coordinates, state = %state, required = module.is_required(), "Module state");

        if module.is_required() && state != ModuleState::Active {
            diagnostics.push(ModuleDiagnostic {
                module: module.coordinates.clone(),
                report,
            });
        }
    }

    if diagnostics.is_empty() {
        tracing::info!(modules = states.len(), "All required modules active");
        return Ok(states);
    }

    for diagnostic in &diagnostics {
        tracing::error!("Module not active: {}", diagnostic);
    }
    Err(ActivationError::NotActive { diagnostics, states })
}

/// Check that a named module is installed and has registered services
///
/// A module that is present but not active is diagnosed at `warn` before
/// its services are counted.
pub fn assert_services_registered(host: &dyn ModuleHost, symbolic_name: &str) -> Result<usize, ActivationError> {
    let report = host
        .report_by_name(symbolic_name)
        .ok_or_else(|| ActivationError::NotInstalled(symbolic_name.to_string()))?;

    if report.state != ModuleState::Active && report.state != ModuleState::Resolved {
        tracing::warn!(
            module = symbolic_name,
            state = %report.state,
            unsatisfied = ?report.unsatisfied_imports,
            "Module neither active nor resolved"
        );
    }

    match host.registered_services(symbolic_name) {
        Some(count) if count > 0 => Ok(count),
        Some(_) => Err(ActivationError::NoServices {
            symbolic_name: symbolic_name.to_string(),
        }),
        None => Err(ActivationError::NotInstalled(symbolic_name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::maven;
    use crate::scenario::SystemProperties;
    use std::collections::HashMap;
    use tracing_test::traced_test;

    struct MapHost {
        reports: HashMap<String, ModuleReport>,
        services: HashMap<String, usize>,
    }

    impl ModuleHost for MapHost {
        fn module_report(&self, module: &ModuleCoordinates) -> Option<ModuleReport> {
            self.reports.get(&module.artifact_id).cloned()
        }

        fn report_by_name(&self, symbolic_name: &str) -> Option<ModuleReport> {
            self.reports.values().find(|r| r.symbolic_name == symbolic_name).cloned()
        }

        fn registered_services(&self, symbolic_name: &str) -> Option<usize> {
            self.services.get(symbolic_name).copied()
        }
    }

    fn manifest() -> Manifest {
        Manifest {
            modules: vec![
                maven("org.eclipse.jetty", "jetty-server"),
                maven("org.eclipse.jetty.osgi", "jetty-osgi-alpn").no_start(),
                maven("org.eclipse.jetty", "jetty-alpn-conscrypt-server"),
            ],
            boot_delegation: Vec::new(),
            system_packages: Vec::new(),
            system_properties: SystemProperties::new(),
        }
    }

    fn host(states: &[(&str, ModuleState)]) -> MapHost {
        let reports = states
            .iter()
            .map(|(artifact, state)| {
                let name = format!("org.eclipse.jetty.{}", artifact.replace('-', "."));
                (artifact.to_string(), ModuleReport::new(name, *state))
            })
            .collect();
        MapHost {
            reports,
            services: HashMap::new(),
        }
    }

    #[test]
    fn test_all_required_active() {
        let host = host(&[
            ("jetty-server", ModuleState::Active),
            ("jetty-osgi-alpn", ModuleState::Resolved),
            ("jetty-alpn-conscrypt-server", ModuleState::Active),
        ]);
        let states = assert_modules_resolved(&host, &manifest()).unwrap();
        assert_eq!(states.len(), 3);
        assert_eq!(
            states[&ModuleCoordinates::new("org.eclipse.jetty.osgi", "jetty-osgi-alpn")],
            ModuleState::Resolved
        );
    }

    #[test]
    fn test_no_start_module_may_be_missing() {
        let host = host(&[
            ("jetty-server", ModuleState::Active),
            ("jetty-alpn-conscrypt-server", ModuleState::Active),
        ]);
        let states = assert_modules_resolved(&host, &manifest()).unwrap();
        assert_eq!(
            states[&ModuleCoordinates::new("org.eclipse.jetty.osgi", "jetty-osgi-alpn")],
            ModuleState::Uninstalled
        );
    }

    #[test]
    #[traced_test]
    fn test_inactive_module_is_diagnosed() {
        let mut host = host(&[
            ("jetty-server", ModuleState::Active),
            ("jetty-osgi-alpn", ModuleState::Resolved),
            ("jetty-alpn-conscrypt-server", ModuleState::Installed),
        ]);
        if let Some(report) = host.reports.get_mut("jetty-alpn-conscrypt-server") {
            report.unsatisfied_imports.push("org.conscrypt;version=1.0.0.RC11".to_string());
            report.dependency_chain.push("org.eclipse.jetty.alpn.server".to_string());
        }

        let err = assert_modules_resolved(&host, &manifest()).unwrap_err();
        let diagnostics = err.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].module.artifact_id, "jetty-alpn-conscrypt-server");
        assert!(err.to_string().contains("jetty-alpn-conscrypt-server"));

        assert!(logs_contain("Module not active"));
        assert!(logs_contain("unsatisfied imports: org.conscrypt;version=1.0.0.RC11"));
    }

    #[test]
    fn test_uninstalled_required_module() {
        let host = host(&[("jetty-server", ModuleState::Active)]);
        let err = assert_modules_resolved(&host, &manifest()).unwrap_err();
        let diagnostics = err.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].report.is_none());
        assert!(diagnostics[0].to_string().ends_with("is not installed"));
    }

    #[test]
    fn test_services_registered() {
        let mut host = host(&[("jetty-alpn-conscrypt-server", ModuleState::Active)]);
        let name = "org.eclipse.jetty.jetty.alpn.conscrypt.server";
        host.services.insert(name.to_string(), 1);
        assert_eq!(assert_services_registered(&host, name).unwrap(), 1);

        host.services.insert(name.to_string(), 0);
        assert!(matches!(
            assert_services_registered(&host, name),
            Err(ActivationError::NoServices { .. })
        ));

        assert!(matches!(
            assert_services_registered(&host, "org.example.missing"),
            Err(ActivationError::NotInstalled(_))
        ));
    }
}
