//! Module descriptors
//!
//! A descriptor names one artifact the host must install, how eagerly it
//! is started, and the package contract it declares. Third-party jars that
//! carry no module metadata are declared `wrapped`, with the import and
//! export clauses the host would otherwise read from the jar itself.

use super::ManifestError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Group/artifact/classifier identity of a module
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleCoordinates {
    pub group_id: String,
    pub artifact_id: String,
    pub classifier: Option<String>,
}

impl ModuleCoordinates {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        ModuleCoordinates {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            classifier: None,
        }
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }
}

impl fmt::Display for ModuleCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group_id, self.artifact_id)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{}", classifier)?;
        }
        Ok(())
    }
}

/// Version of a module
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleVersion {
    Literal(String),
    /// Whatever version the enclosing project builds
    AsInProject,
}

impl ModuleVersion {
    pub fn resolve<'a>(&'a self, project_version: &'a str) -> &'a str {
        match self {
            ModuleVersion::Literal(version) => version,
            ModuleVersion::AsInProject => project_version,
        }
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleVersion::Literal(version) => f.write_str(version),
            ModuleVersion::AsInProject => f.write_str("<project>"),
        }
    }
}

/// How the host activates a module once installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StartEagerness {
    /// Installed and resolved only (fragments, optional modules)
    NoStart,
    Start,
    StartLevel(u32),
}

impl StartEagerness {
    /// Whether the module must reach the active state
    pub fn is_required(&self) -> bool {
        !matches!(self, StartEagerness::NoStart)
    }
}

/// One package clause of an import or export header
///
/// Renders as `name[;version=<v>]`, e.g. `org.conscrypt;version=1.0.0.RC11`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageClause {
    /// Package name or pattern (`*`, `org.xml.*`)
    pub name: String,
    /// Version or version range
    pub version: Option<String>,
    /// Package is backed by native code (exports only)
    pub native: bool,
}

impl PackageClause {
    pub fn new(name: impl Into<String>) -> Self {
        PackageClause {
            name: name.into(),
            version: None,
            native: false,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn native(mut self) -> Self {
        self.native = true;
        self
    }

    /// Parse a single clause such as `org.conscrypt;version=1.0.0.RC11`
    pub fn parse(clause: &str) -> Result<Self, ManifestError> {
        let mut parts = clause.split(';').map(str::trim);
        let name = parts.next().unwrap_or_default();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(ManifestError::InvalidPackageClause(clause.to_string()));
        }

        let mut parsed = PackageClause::new(name);
        for attribute in parts {
            match attribute.split_once('=') {
                Some(("version", value)) => {
                    let value = value.trim().trim_matches('"');
                    if value.is_empty() {
                        return Err(ManifestError::InvalidPackageClause(clause.to_string()));
                    }
                    parsed.version = Some(value.to_string());
                }
                _ => return Err(ManifestError::InvalidPackageClause(clause.to_string())),
            }
        }
        Ok(parsed)
    }

    /// Parse a comma-separated header, e.g. `javax.net.ssl,*`
    ///
    /// Commas inside quoted version ranges do not split clauses.
    pub fn parse_list(header: &str) -> Result<Vec<Self>, ManifestError> {
        let mut clauses = Vec::new();
        let mut quoted = false;
        let mut start = 0;
        for (i, c) in header.char_indices() {
            match c {
                '"' => quoted = !quoted,
                ',' if !quoted => {
                    clauses.push(Self::parse(&header[start..i])?);
                    start = i + 1;
                }
                _ => {}
            }
        }
        if quoted {
            return Err(ManifestError::InvalidPackageClause(header.to_string()));
        }
        clauses.push(Self::parse(&header[start..])?);
        Ok(clauses)
    }
}

impl fmt::Display for PackageClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        match &self.version {
            Some(v) if v.contains(',') => write!(f, ";version=\"{}\"", v),
            Some(v) => write!(f, ";version={}", v),
            None => Ok(()),
        }
    }
}

/// Operating system and architecture a native library is built for
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Platform {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform this crate was compiled for
    pub fn host() -> Self {
        Platform::from_target(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Classifier naming for a Rust target; unknown targets keep their own names
    pub fn from_target(os: &str, arch: &str) -> Self {
        let os = match os {
            "macos" => "osx",
            other => other,
        };
        let arch = match arch {
            "aarch64" => "aarch_64",
            "x86" => "x86_32",
            other => other,
        };
        Platform::new(os, arch)
    }

    /// Shared library file extension
    pub fn library_extension(&self) -> &'static str {
        match self.os.as_str() {
            "osx" => "dylib",
            "windows" => "dll",
            _ => "so",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

/// Native libraries bundled inside a module, per platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<NativeLibrary>", from = "Vec<NativeLibrary>")]
pub struct NativeCodeBinding {
    pub libraries: BTreeMap<Platform, String>,
}

/// Serialized form of one binding entry; JSON object keys must be strings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeLibrary {
    pub platform: Platform,
    pub path: String,
}

impl From<NativeCodeBinding> for Vec<NativeLibrary> {
    fn from(binding: NativeCodeBinding) -> Self {
        binding
            .libraries
            .into_iter()
            .map(|(platform, path)| NativeLibrary { platform, path })
            .collect()
    }
}

impl From<Vec<NativeLibrary>> for NativeCodeBinding {
    fn from(entries: Vec<NativeLibrary>) -> Self {
        NativeCodeBinding {
            libraries: entries.into_iter().map(|e| (e.platform, e.path)).collect(),
        }
    }
}

impl NativeCodeBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, platform: Platform, path: impl Into<String>) -> Self {
        self.libraries.insert(platform, path.into());
        self
    }

    pub fn library_for(&self, platform: &Platform) -> Option<&str> {
        self.libraries.get(platform).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}

/// One module of the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub coordinates: ModuleCoordinates,
    pub version: ModuleVersion,
    pub start: StartEagerness,
    pub imports: Vec<PackageClause>,
    pub exports: Vec<PackageClause>,
    pub native_code: Option<NativeCodeBinding>,
    pub wrapped: bool,
}

/// Start a descriptor for `group:artifact`, project version, started
pub fn maven(group_id: &str, artifact_id: &str) -> ModuleDescriptor {
    ModuleDescriptor {
        coordinates: ModuleCoordinates::new(group_id, artifact_id),
        version: ModuleVersion::AsInProject,
        start: StartEagerness::Start,
        imports: Vec::new(),
        exports: Vec::new(),
        native_code: None,
        wrapped: false,
    }
}

impl ModuleDescriptor {
    pub fn version(mut self, version: &str) -> Self {
        self.version = ModuleVersion::Literal(version.to_string());
        self
    }

    pub fn version_as_in_project(mut self) -> Self {
        self.version = ModuleVersion::AsInProject;
        self
    }

    pub fn classifier(mut self, classifier: &str) -> Self {
        self.coordinates.classifier = Some(classifier.to_string());
        self
    }

    pub fn start(mut self) -> Self {
        self.start = StartEagerness::Start;
        self
    }

    pub fn no_start(mut self) -> Self {
        self.start = StartEagerness::NoStart;
        self
    }

    pub fn start_level(mut self, level: u32) -> Self {
        self.start = StartEagerness::StartLevel(level);
        self
    }

    pub fn wrapped(mut self) -> Self {
        self.wrapped = true;
        self
    }

    /// Add import clauses; a clause already present is kept once
    pub fn imports<I>(mut self, clauses: I) -> Self
    where
        I: IntoIterator<Item = PackageClause>,
    {
        push_unique(&mut self.imports, clauses);
        self
    }

    /// Add export clauses; a clause already present is kept once
    pub fn exports<I>(mut self, clauses: I) -> Self
    where
        I: IntoIterator<Item = PackageClause>,
    {
        push_unique(&mut self.exports, clauses);
        self
    }

    pub fn native_code(mut self, binding: NativeCodeBinding) -> Self {
        self.native_code = Some(binding);
        self
    }

    /// Whether the host must bring this module to the active state
    pub fn is_required(&self) -> bool {
        self.start.is_required()
    }

    /// Check the package contract invariants
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.wrapped && (self.exports.is_empty() || self.imports.is_empty()) {
            return Err(ManifestError::WrappedWithoutContract(self.coordinates.clone()));
        }

        let native_exports = self.exports.iter().any(|e| e.native);
        let has_binding = self.native_code.as_ref().map_or(false, |b| !b.is_empty());
        if native_exports && !has_binding {
            return Err(ManifestError::NativeExportWithoutBinding(self.coordinates.clone()));
        }

        if let Some(binding) = &self.native_code {
            if let Some((platform, _)) = binding.libraries.iter().find(|(_, path)| path.trim().is_empty()) {
                return Err(ManifestError::EmptyNativePath {
                    module: self.coordinates.clone(),
                    platform: platform.clone(),
                });
            }
        }
        Ok(())
    }
}

fn push_unique<I>(set: &mut Vec<PackageClause>, clauses: I)
where
    I: IntoIterator<Item = PackageClause>,
{
    for clause in clauses {
        if !set.iter().any(|c| c.name == clause.name && c.version == clause.version) {
            set.push(clause);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_clause_parse() {
        let clause = PackageClause::parse("org.conscrypt;version=1.0.0.RC11").unwrap();
        assert_eq!(clause.name, "org.conscrypt");
        assert_eq!(clause.version.as_deref(), Some("1.0.0.RC11"));
        assert_eq!(clause.to_string(), "org.conscrypt;version=1.0.0.RC11");
    }

    #[test]
    fn test_package_list_parse() {
        let clauses = PackageClause::parse_list("javax.net.ssl,*").unwrap();
        let names: Vec<&str> = clauses.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["javax.net.ssl", "*"]);

        let ranged = PackageClause::parse_list("javax.servlet;version=\"[3.1,4)\",org.xml.*").unwrap();
        assert_eq!(ranged.len(), 2);
        assert_eq!(ranged[0].version.as_deref(), Some("[3.1,4)"));
        assert_eq!(ranged[0].to_string(), "javax.servlet;version=\"[3.1,4)\"");
    }

    #[test]
    fn test_package_clause_rejects_garbage() {
        assert!(PackageClause::parse("").is_err());
        assert!(PackageClause::parse("org.foo;resolution:=optional").is_err());
        assert!(PackageClause::parse_list("a;version=\"[1,2)").is_err());
    }

    #[test]
    fn test_duplicate_clauses_collapse() {
        let module = maven("g", "a").imports(vec![
            PackageClause::new("javax.net.ssl"),
            PackageClause::new("*"),
            PackageClause::new("javax.net.ssl"),
        ]);
        assert_eq!(module.imports.len(), 2);
    }

    #[test]
    fn test_wrapped_requires_contract() {
        let bare = maven("org.conscrypt", "conscrypt-openjdk-uber").version("1.0.0.RC11").wrapped();
        assert!(matches!(bare.validate(), Err(ManifestError::WrappedWithoutContract(_))));

        let declared = bare
            .imports(vec![PackageClause::new("*")])
            .exports(vec![PackageClause::new("org.conscrypt")]);
        assert!(declared.validate().is_ok());
    }

    #[test]
    fn test_native_export_requires_binding() {
        let module = maven("g", "a").exports(vec![PackageClause::new("org.native").native()]);
        assert!(matches!(module.validate(), Err(ManifestError::NativeExportWithoutBinding(_))));

        let bound = module.native_code(NativeCodeBinding::new().with(Platform::new("linux", "x86_64"), "lib/x.so"));
        assert!(bound.validate().is_ok());
    }

    #[test]
    fn test_empty_native_path_rejected() {
        let module = maven("g", "a").native_code(NativeCodeBinding::new().with(Platform::new("linux", "x86_64"), " "));
        assert!(matches!(module.validate(), Err(ManifestError::EmptyNativePath { .. })));
    }

    #[test]
    fn test_no_start_is_not_required() {
        assert!(!maven("g", "a").no_start().is_required());
        assert!(maven("g", "a").start_level(4).is_required());
    }

    #[test]
    fn test_version_resolution() {
        assert_eq!(ModuleVersion::AsInProject.resolve("9.4.12"), "9.4.12");
        assert_eq!(ModuleVersion::Literal("1.0.0.RC11".into()).resolve("9.4.12"), "1.0.0.RC11");
    }

    #[test]
    fn test_coordinates_display() {
        let coords = ModuleCoordinates::new("org.eclipse.jetty", "test-jetty-webapp").with_classifier("webbundle");
        assert_eq!(coords.to_string(), "org.eclipse.jetty:test-jetty-webapp:webbundle");
    }

    #[test]
    fn test_platform_from_target() {
        assert_eq!(Platform::from_target("macos", "aarch64"), Platform::new("osx", "aarch_64"));
        assert_eq!(Platform::from_target("windows", "x86"), Platform::new("windows", "x86_32"));
        assert_eq!(Platform::from_target("linux", "x86_64"), Platform::new("linux", "x86_64"));
        assert_eq!(Platform::from_target("freebsd", "riscv64"), Platform::new("freebsd", "riscv64"));
        assert_eq!(Platform::from_target("linux", "s390x").library_extension(), "so");
        assert_eq!(
            Platform::host(),
            Platform::from_target(std::env::consts::OS, std::env::consts::ARCH)
        );
    }
}
