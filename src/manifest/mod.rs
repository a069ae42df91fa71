//! Module manifest
//!
//! The manifest is the declarative input handed to the external module
//! resolution engine: an ordered list of module descriptors plus the
//! process-wide declarations (boot delegation, system packages, system
//! properties) that shape resolution without being modules themselves.
//!
//! # Architecture
//!
//! - **Descriptors** (`descriptor`): identity, version, start eagerness,
//!   package contract and native bindings of one module
//! - **Builder** (`builder`): pure construction of a `Manifest` from a
//!   `ScenarioConfig`; same input, same output
//!
//! # Examples
//!
//! ```
//! use h2harness::manifest::build_manifest;
//! use h2harness::scenario::ScenarioConfig;
//!
//! let manifest = build_manifest(&ScenarioConfig::conscrypt_h2());
//! assert!(manifest.validate().is_ok());
//! assert_eq!(manifest.system_properties.get("jetty.alpn.protocols"), Some("h2,http/1.1"));
//! ```

pub mod builder;
pub mod descriptor;

pub use builder::{build_manifest, ManifestBuilder};
pub use descriptor::{
    maven, ModuleCoordinates, ModuleDescriptor, ModuleVersion, NativeCodeBinding, PackageClause,
    Platform, StartEagerness,
};

use crate::scenario::SystemProperties;
use serde::{Deserialize, Serialize};

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, ManifestError>;

/// Manifest errors
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("wrapped module {0} must declare imports and exports")]
    WrappedWithoutContract(ModuleCoordinates),

    #[error("module {0} exports native packages but has no native code binding")]
    NativeExportWithoutBinding(ModuleCoordinates),

    #[error("module {module} binds an empty native library path for {platform}")]
    EmptyNativePath {
        module: ModuleCoordinates,
        platform: Platform,
    },

    #[error("module {0} is declared more than once")]
    DuplicateModule(ModuleCoordinates),

    #[error("invalid package clause: {0}")]
    InvalidPackageClause(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Everything the resolution engine needs to assemble one system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Modules in installation order
    pub modules: Vec<ModuleDescriptor>,
    /// Packages loaded from the boot class path by every module
    pub boot_delegation: Vec<String>,
    /// Packages the framework itself exports
    pub system_packages: Vec<String>,
    /// Properties set before activation
    pub system_properties: SystemProperties,
}

impl Manifest {
    /// Re-check every descriptor and reject duplicate identities
    pub fn validate(&self) -> Result<()> {
        for (i, module) in self.modules.iter().enumerate() {
            module.validate()?;
            if self.modules[..i].iter().any(|m| m.coordinates == module.coordinates) {
                return Err(ManifestError::DuplicateModule(module.coordinates.clone()));
            }
        }
        Ok(())
    }

    pub fn find(&self, coordinates: &ModuleCoordinates) -> Option<&ModuleDescriptor> {
        self.modules.iter().find(|m| &m.coordinates == coordinates)
    }

    /// Find a module by artifact id alone
    pub fn find_artifact(&self, artifact_id: &str) -> Option<&ModuleDescriptor> {
        self.modules.iter().find(|m| m.coordinates.artifact_id == artifact_id)
    }

    /// Modules that must reach the active state
    pub fn required_modules(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.iter().filter(|m| m.is_required())
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
