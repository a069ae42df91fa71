//! In-memory module host
//!
//! Stands in for a live module framework: every module of a manifest is
//! installed with the state a healthy framework would report, and tests
//! override individual modules to simulate composition failures.

use crate::manifest::{Manifest, ModuleCoordinates};
use crate::oracle::{ModuleHost, ModuleReport, ModuleState};
use std::collections::{BTreeMap, HashMap};

/// `ModuleHost` backed by a map
#[derive(Debug, Clone, Default)]
pub struct StaticHost {
    modules: BTreeMap<ModuleCoordinates, ModuleReport>,
    services: HashMap<String, usize>,
}

/// Symbolic name a module of the given coordinates registers under
///
/// `org.eclipse.jetty:jetty-alpn-server` becomes
/// `org.eclipse.jetty.alpn.server`; `org.eclipse.jetty.http2:http2-server`
/// becomes `org.eclipse.jetty.http2.server`.
pub fn symbolic_name(coordinates: &ModuleCoordinates) -> String {
    let artifact = coordinates.artifact_id.replace('-', ".");
    if let Some(rest) = artifact.strip_prefix("jetty.") {
        return format!("org.eclipse.jetty.{}", rest);
    }
    let group_tail = coordinates.group_id.rsplit('.').next().unwrap_or_default();
    match artifact.split_once('.') {
        Some((head, rest)) if head == group_tail => format!("{}.{}", coordinates.group_id, rest),
        _ if artifact == group_tail => coordinates.group_id.clone(),
        _ => format!("{}.{}", coordinates.group_id, artifact),
    }
}

impl StaticHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install every module of `manifest`: required modules active with one
    /// registered service, `NoStart` modules resolved
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut host = StaticHost::new();
        for module in &manifest.modules {
            let name = symbolic_name(&module.coordinates);
            let state = if module.is_required() {
                host.services.insert(name.clone(), 1);
                ModuleState::Active
            } else {
                ModuleState::Resolved
            };
            host.modules
                .insert(module.coordinates.clone(), ModuleReport::new(name, state));
        }
        host
    }

    pub fn install(&mut self, coordinates: ModuleCoordinates, report: ModuleReport) {
        self.modules.insert(coordinates, report);
    }

    /// Remove every module with this artifact id
    pub fn uninstall(&mut self, artifact_id: &str) {
        let removed: Vec<ModuleCoordinates> = self
            .modules
            .keys()
            .filter(|c| c.artifact_id == artifact_id)
            .cloned()
            .collect();
        for coordinates in removed {
            if let Some(report) = self.modules.remove(&coordinates) {
                self.services.remove(&report.symbolic_name);
            }
        }
    }

    /// Override the state of every module with this artifact id
    pub fn set_state(&mut self, artifact_id: &str, state: ModuleState) -> &mut Self {
        for report in self.reports_mut(artifact_id) {
            report.state = state;
        }
        self
    }

    pub fn add_unsatisfied_import(&mut self, artifact_id: &str, clause: &str) -> &mut Self {
        for report in self.reports_mut(artifact_id) {
            report.unsatisfied_imports.push(clause.to_string());
        }
        self
    }

    pub fn add_dependency(&mut self, artifact_id: &str, symbolic_name: &str) -> &mut Self {
        for report in self.reports_mut(artifact_id) {
            report.dependency_chain.push(symbolic_name.to_string());
        }
        self
    }

    pub fn set_services(&mut self, symbolic_name: &str, count: usize) -> &mut Self {
        self.services.insert(symbolic_name.to_string(), count);
        self
    }

    fn reports_mut<'a>(&'a mut self, artifact_id: &'a str) -> impl Iterator<Item = &'a mut ModuleReport> + 'a {
        self.modules
            .iter_mut()
            .filter(move |(c, _)| c.artifact_id == artifact_id)
            .map(|(_, report)| report)
    }
}

impl ModuleHost for StaticHost {
    fn module_report(&self, module: &ModuleCoordinates) -> Option<ModuleReport> {
        self.modules.get(module).cloned()
    }

    fn report_by_name(&self, symbolic_name: &str) -> Option<ModuleReport> {
        self.modules
            .values()
            .find(|r| r.symbolic_name == symbolic_name)
            .cloned()
    }

    fn registered_services(&self, symbolic_name: &str) -> Option<usize> {
        if self.report_by_name(symbolic_name).is_none() {
            return None;
        }
        Some(self.services.get(symbolic_name).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::build_manifest;
    use crate::oracle::assert_modules_resolved;
    use crate::scenario::ScenarioConfig;

    #[test]
    fn test_symbolic_names() {
        let name = |g: &str, a: &str| symbolic_name(&ModuleCoordinates::new(g, a));
        assert_eq!(
            name("org.eclipse.jetty", "jetty-alpn-conscrypt-server"),
            "org.eclipse.jetty.alpn.conscrypt.server"
        );
        assert_eq!(name("org.eclipse.jetty.osgi", "jetty-osgi-boot"), "org.eclipse.jetty.osgi.boot");
        assert_eq!(name("org.eclipse.jetty.http2", "http2-server"), "org.eclipse.jetty.http2.server");
        assert_eq!(name("org.conscrypt", "conscrypt-openjdk-uber"), "org.conscrypt.openjdk.uber");
        assert_eq!(name("org.ow2.asm", "asm"), "org.ow2.asm");
    }

    #[test]
    fn test_healthy_host_passes() {
        let manifest = build_manifest(&ScenarioConfig::conscrypt_h2());
        let host = StaticHost::from_manifest(&manifest);
        let states = assert_modules_resolved(&host, &manifest).unwrap();
        assert_eq!(states.len(), manifest.modules.len());
        assert_eq!(
            host.registered_services("org.eclipse.jetty.alpn.conscrypt.server"),
            Some(1)
        );
    }

    #[test]
    fn test_overrides() {
        let manifest = build_manifest(&ScenarioConfig::conscrypt_h2());
        let mut host = StaticHost::from_manifest(&manifest);
        host.set_state("jetty-alpn-conscrypt-server", ModuleState::Installed)
            .add_unsatisfied_import("jetty-alpn-conscrypt-server", "org.conscrypt");
        host.uninstall("http2-hpack");

        let err = assert_modules_resolved(&host, &manifest).unwrap_err();
        let failing: Vec<&str> = err
            .diagnostics()
            .iter()
            .map(|d| d.module.artifact_id.as_str())
            .collect();
        assert_eq!(failing, vec!["jetty-alpn-conscrypt-server", "http2-hpack"]);
        assert_eq!(host.registered_services("org.eclipse.jetty.http2.hpack"), None);
    }
}
