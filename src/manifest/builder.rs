//! Manifest construction
//!
//! Blocks are appended in a fixed order: core runtime, TLS provider,
//! HTTP/2 transport, JSP support, payload. Boot delegation and system
//! packages go on the manifest itself.

use super::descriptor::{maven, ModuleDescriptor, NativeCodeBinding, PackageClause, Platform};
use super::Manifest;
use crate::http::tls::{NamedProvider, TlsProvider};
use crate::scenario::{ScenarioConfig, SystemProperties};

const JETTY: &str = "org.eclipse.jetty";
const JETTY_OSGI: &str = "org.eclipse.jetty.osgi";
const JETTY_HTTP2: &str = "org.eclipse.jetty.http2";

const CONSCRYPT_VERSION: &str = "1.0.0.RC11";

const BOOT_DELEGATION: &[&str] = &["org.xml.sax", "org.xml.*", "org.w3c.*", "javax.xml.*", "javax.activation.*"];

const SYSTEM_PACKAGES: &[&str] = &[
    "com.sun.org.apache.xalan.internal.res",
    "com.sun.org.apache.xml.internal.utils",
    "com.sun.org.apache.xml.internal.utils",
    "com.sun.org.apache.xpath.internal",
    "com.sun.org.apache.xpath.internal.jaxp",
    "com.sun.org.apache.xpath.internal.objects",
    "sun.security",
    "sun.security.x509",
    "sun.security.ssl",
];

/// Host properties that carry the log level
pub const LOG_LEVEL_PROPERTIES: &[&str] = &["org.ops4j.pax.logging.DefaultServiceLog.level", "org.eclipse.jetty.LEVEL"];

/// Builds a `Manifest` for one scenario
#[derive(Debug, Clone)]
pub struct ManifestBuilder<'a> {
    scenario: &'a ScenarioConfig,
    target: Platform,
}

/// Build the manifest for the platform this crate runs on
pub fn build_manifest(scenario: &ScenarioConfig) -> Manifest {
    ManifestBuilder::new(scenario).build()
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(scenario: &'a ScenarioConfig) -> Self {
        ManifestBuilder {
            scenario,
            target: Platform::host(),
        }
    }

    /// Platform native code bindings are keyed by
    pub fn target(mut self, platform: Platform) -> Self {
        self.target = platform;
        self
    }

    pub fn build(self) -> Manifest {
        let mut modules = core_modules();

        match self.scenario.tls_provider {
            TlsProvider::Named(NamedProvider::Conscrypt) => modules.extend(conscrypt_modules(&self.target)),
            TlsProvider::Default => modules.extend(default_alpn_modules()),
        }

        if self.scenario.offers_h2() {
            modules.extend(http2_modules());
        }

        if self.scenario.payload.uses_jsp {
            modules.extend(jsp_modules());
        }

        let payload = &self.scenario.payload;
        modules.push(
            maven(&payload.group_id, &payload.artifact_id)
                .classifier(&payload.classifier)
                .version_as_in_project(),
        );

        let manifest = Manifest {
            modules,
            boot_delegation: ordered_unique(BOOT_DELEGATION),
            system_packages: ordered_unique(SYSTEM_PACKAGES),
            system_properties: self.system_properties(),
        };

        tracing::debug!(
            modules = manifest.modules.len(),
            provider = %self.scenario.tls_provider,
            target = %self.target,
            "Assembled module manifest"
        );
        manifest
    }

    fn system_properties(&self) -> SystemProperties {
        let scenario = self.scenario;
        let mut props = SystemProperties::new();
        props.set("jetty.alpn.protocols", scenario.protocol_ids().join(","));
        props.set("jetty.http.port", scenario.http_port.as_property());
        props.set("jetty.ssl.port", scenario.tls_port.as_property());
        if let Some(provider) = scenario.tls_provider.name() {
            props.set("jetty.sslContext.provider", provider);
        }
        for key in LOG_LEVEL_PROPERTIES {
            props.set(*key, scenario.log_level.as_str());
        }
        props.extend_from(&scenario.system_properties);
        props
    }
}

fn core_modules() -> Vec<ModuleDescriptor> {
    let mut modules = vec![
        maven("org.ops4j.pax.logging", "pax-logging-api").version("1.10.1"),
        maven("org.ops4j.pax.logging", "pax-logging-service").version("1.10.1"),
        maven("javax.servlet", "javax.servlet-api").version("3.1.0"),
        maven("javax.annotation", "javax.annotation-api").version("1.2"),
        maven("org.apache.geronimo.specs", "geronimo-jta_1.1_spec").version("1.1.1"),
        maven("org.ow2.asm", "asm").version("6.2"),
        maven("org.ow2.asm", "asm-commons").version("6.2"),
        maven("org.ow2.asm", "asm-tree").version("6.2"),
    ];

    for artifact in [
        "jetty-util",
        "jetty-io",
        "jetty-http",
        "jetty-server",
        "jetty-security",
        "jetty-servlet",
        "jetty-xml",
        "jetty-webapp",
        "jetty-deploy",
        "jetty-jndi",
        "jetty-plus",
        "jetty-annotations",
    ] {
        modules.push(maven(JETTY, artifact).version_as_in_project().start());
    }

    modules.push(maven(JETTY_OSGI, "jetty-osgi-boot").version_as_in_project().start());
    modules
}

fn conscrypt_modules(target: &Platform) -> Vec<ModuleDescriptor> {
    let library = format!(
        "META-INF/native/libconscrypt_openjdk_jni-{}.{}",
        target,
        target.library_extension()
    );

    vec![
        maven("org.conscrypt", "conscrypt-openjdk-uber")
            .version(CONSCRYPT_VERSION)
            .wrapped()
            .imports(vec![PackageClause::new("javax.net.ssl"), PackageClause::new("*")])
            .exports(vec![PackageClause::new("org.conscrypt").version(CONSCRYPT_VERSION).native()])
            .native_code(NativeCodeBinding::new().with(target.clone(), library))
            .start(),
        maven(JETTY_OSGI, "jetty-osgi-alpn").version_as_in_project().no_start(),
        maven(JETTY, "jetty-alpn-conscrypt-server").version_as_in_project().start(),
        maven(JETTY, "jetty-alpn-server").version_as_in_project().start(),
        maven(JETTY, "jetty-alpn-conscrypt-client").version_as_in_project().start(),
        maven(JETTY, "jetty-alpn-client").version_as_in_project().start(),
    ]
}

fn default_alpn_modules() -> Vec<ModuleDescriptor> {
    vec![
        maven(JETTY_OSGI, "jetty-osgi-alpn").version_as_in_project().no_start(),
        maven(JETTY, "jetty-alpn-java-server").version_as_in_project().start(),
        maven(JETTY, "jetty-alpn-server").version_as_in_project().start(),
        maven(JETTY, "jetty-alpn-java-client").version_as_in_project().start(),
        maven(JETTY, "jetty-alpn-client").version_as_in_project().start(),
    ]
}

fn http2_modules() -> Vec<ModuleDescriptor> {
    [
        "http2-common",
        "http2-hpack",
        "http2-server",
        "http2-client",
        "http2-http-client-transport",
    ]
    .iter()
    .map(|artifact| maven(JETTY_HTTP2, artifact).version_as_in_project().start())
    .collect()
}

fn jsp_modules() -> Vec<ModuleDescriptor> {
    vec![
        maven("org.eclipse.jdt", "ecj").version("3.14.0"),
        maven("org.mortbay.jasper", "apache-el").version("8.5.24.2"),
        maven("org.mortbay.jasper", "apache-jsp").version("8.5.24.2"),
        maven(JETTY, "apache-jsp").version_as_in_project().start(),
        maven("org.glassfish.web", "javax.servlet.jsp.jstl").version("1.2.2"),
        maven(JETTY, "apache-jstl").version_as_in_project().start(),
        // fragment of jetty-osgi-boot; resolves but never activates
        maven(JETTY_OSGI, "jetty-osgi-boot-jsp").version_as_in_project().no_start(),
    ]
}

fn ordered_unique(items: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.iter().any(|o| o == item) {
            out.push(item.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::StartEagerness;
    use crate::scenario::{LogLevel, PortSpec};

    fn linux() -> Platform {
        Platform::new("linux", "x86_64")
    }

    fn artifacts(manifest: &Manifest) -> Vec<&str> {
        manifest.modules.iter().map(|m| m.coordinates.artifact_id.as_str()).collect()
    }

    #[test]
    fn test_build_is_deterministic() {
        let scenario = ScenarioConfig::conscrypt_h2();
        let first = ManifestBuilder::new(&scenario).target(linux()).build();
        let second = ManifestBuilder::new(&scenario).target(linux()).build();
        assert_eq!(first, second);
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }

    #[test]
    fn test_conscrypt_manifest_validates() {
        let manifest = ManifestBuilder::new(&ScenarioConfig::conscrypt_h2()).target(linux()).build();
        manifest.validate().unwrap();

        let conscrypt = manifest.find_artifact("conscrypt-openjdk-uber").unwrap();
        assert!(conscrypt.wrapped);
        assert_eq!(conscrypt.exports[0].to_string(), "org.conscrypt;version=1.0.0.RC11");
        assert!(conscrypt.exports[0].native);
        let imports: Vec<String> = conscrypt.imports.iter().map(ToString::to_string).collect();
        assert_eq!(imports, vec!["javax.net.ssl", "*"]);
        assert_eq!(
            conscrypt.native_code.as_ref().unwrap().library_for(&linux()),
            Some("META-INF/native/libconscrypt_openjdk_jni-linux-x86_64.so")
        );
    }

    #[test]
    fn test_native_binding_follows_target() {
        let mac = Platform::new("osx", "x86_64");
        let manifest = ManifestBuilder::new(&ScenarioConfig::conscrypt_h2()).target(mac.clone()).build();
        let conscrypt = manifest.find_artifact("conscrypt-openjdk-uber").unwrap();
        let binding = conscrypt.native_code.as_ref().unwrap();
        assert_eq!(
            binding.library_for(&mac),
            Some("META-INF/native/libconscrypt_openjdk_jni-osx-x86_64.dylib")
        );
        assert_eq!(binding.library_for(&linux()), None);
    }

    #[test]
    fn test_block_order() {
        let manifest = ManifestBuilder::new(&ScenarioConfig::conscrypt_h2()).target(linux()).build();
        let names = artifacts(&manifest);
        let pos = |name: &str| names.iter().position(|n| *n == name).unwrap();

        assert_eq!(names[0], "pax-logging-api");
        assert!(pos("jetty-osgi-boot") < pos("conscrypt-openjdk-uber"));
        assert!(pos("jetty-alpn-client") < pos("http2-common"));
        assert!(pos("http2-http-client-transport") < pos("apache-jsp"));
        assert_eq!(*names.last().unwrap(), "test-jetty-webapp");
        assert_eq!(
            manifest.modules.last().unwrap().coordinates.classifier.as_deref(),
            Some("webbundle")
        );
    }

    #[test]
    fn test_http2_block_is_started() {
        let manifest = build_manifest(&ScenarioConfig::conscrypt_h2());
        let http2: Vec<_> = manifest
            .modules
            .iter()
            .filter(|m| m.coordinates.group_id == JETTY_HTTP2)
            .collect();
        assert_eq!(http2.len(), 5);
        assert!(http2.iter().all(|m| m.start == StartEagerness::Start));
    }

    #[test]
    fn test_http11_only_has_no_http2_block() {
        let scenario = ScenarioConfig::builder().protocols(&["http/1.1"]).build();
        let manifest = build_manifest(&scenario);
        assert!(manifest.modules.iter().all(|m| m.coordinates.group_id != JETTY_HTTP2));
        assert!(manifest.find_artifact("jetty-alpn-java-server").is_some());
        assert!(manifest.find_artifact("conscrypt-openjdk-uber").is_none());
        assert_eq!(manifest.system_properties.get("jetty.sslContext.provider"), None);
    }

    #[test]
    fn test_alpn_fragment_is_not_started() {
        let manifest = build_manifest(&ScenarioConfig::conscrypt_h2());
        let alpn = manifest.find_artifact("jetty-osgi-alpn").unwrap();
        assert!(!alpn.is_required());
        assert!(manifest.required_modules().all(|m| m.coordinates.artifact_id != "jetty-osgi-alpn"));
    }

    #[test]
    fn test_process_wide_declarations() {
        let manifest = build_manifest(&ScenarioConfig::conscrypt_h2());
        assert_eq!(manifest.boot_delegation[0], "org.xml.sax");
        assert_eq!(manifest.system_packages.len(), 8);
        assert!(manifest.system_packages.iter().any(|p| p == "sun.security.ssl"));
        assert!(manifest.modules.iter().all(|m| m.coordinates.artifact_id != "sun.security"));
    }

    #[test]
    fn test_system_properties() {
        let scenario = ScenarioConfig::builder()
            .tls_provider(TlsProvider::Named(NamedProvider::Conscrypt))
            .protocols(&["h2", "http/1.1"])
            .tls_port(PortSpec::Fixed(8443))
            .log_level(LogLevel::Debug)
            .property("jetty.http.port", "9090")
            .build();
        let props = build_manifest(&scenario).system_properties;

        assert_eq!(props.get("jetty.alpn.protocols"), Some("h2,http/1.1"));
        assert_eq!(props.get("jetty.ssl.port"), Some("8443"));
        assert_eq!(props.get("jetty.sslContext.provider"), Some("Conscrypt"));
        assert_eq!(props.get("org.eclipse.jetty.LEVEL"), Some("DEBUG"));
        assert_eq!(props.get("org.ops4j.pax.logging.DefaultServiceLog.level"), Some("DEBUG"));
        // caller-supplied values win
        assert_eq!(props.get("jetty.http.port"), Some("9090"));
    }

    #[test]
    fn test_json_round_trip() {
        let manifest = ManifestBuilder::new(&ScenarioConfig::conscrypt_h2()).target(linux()).build();
        let json = manifest.to_json().unwrap();
        assert!(json.contains("libconscrypt_openjdk_jni-linux-x86_64.so"));
        assert_eq!(Manifest::from_json(&json).unwrap(), manifest);
    }

    #[test]
    fn test_duplicate_module_rejected() {
        let mut manifest = build_manifest(&ScenarioConfig::conscrypt_h2());
        let first = manifest.modules[0].clone();
        manifest.modules.push(first);
        assert!(matches!(manifest.validate(), Err(crate::manifest::ManifestError::DuplicateModule(_))));
    }
}
