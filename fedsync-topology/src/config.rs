//! Federation configuration.
//!
//! A federation is described either by one TOML file:
//!
//! ```toml
//! secure_connection = false
//! hub = "Hub org"
//! output_dir = "misps"
//!
//! [readiness]
//! interval_ms = 1000
//! max_attempts = 600
//!
//! [[instances]]
//! admin_orgname = "Hub org"
//! baseurl = "https://localhost:4430"
//! admin_key = "..."
//! email_site_admin = "hub@site-admin.local"
//! email_orgadmin = "hub@org-admin.local"
//! email_user = "hub@user.local"
//! ```
//!
//! or by a directory holding one sub-directory per instance, each with a
//! `config.json` carrying the same per-instance keys.

use crate::error::{TopologyError, TopologyResult};
use crate::readiness::ReadinessPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Per-instance file name used by directory discovery.
pub const INSTANCE_CONFIG_FILE: &str = "config.json";

/// Connection and identity settings of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Name of the organisation hosting the instance; also the instance name.
    pub admin_orgname: String,
    /// URL the harness uses to reach the instance.
    pub baseurl: String,
    /// URL other instances use to reach it. Defaults to `baseurl`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_baseurl: Option<String>,
    /// Bootstrap key, used once during provisioning.
    pub admin_key: String,
    pub email_site_admin: String,
    pub email_orgadmin: String,
    pub email_user: String,
}

impl InstanceConfig {
    pub fn name(&self) -> &str {
        &self.admin_orgname
    }

    pub fn external_baseurl(&self) -> &str {
        self.external_baseurl.as_deref().unwrap_or(&self.baseurl)
    }
}

fn default_secure() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Everything needed to set up a federation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Verify TLS certificates of the instances.
    #[serde(default = "default_secure")]
    pub secure_connection: bool,
    /// Name of the hub instance.
    pub hub: String,
    /// Where credential exports are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub readiness: ReadinessPolicy,
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

impl FederationConfig {
    /// Parses and validates a TOML federation file.
    pub fn from_toml_str(contents: &str) -> TopologyResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML federation file.
    pub fn load(path: &Path) -> TopologyResult<Self> {
        debug!("Loading federation config from {}", path.display());
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Builds a configuration from per-instance directories under `root`.
    ///
    /// `root/<hub_dir>/config.json` describes the hub; every other directory
    /// whose name starts with `spoke_prefix` describes a spoke, in name order.
    /// Exports are written to `root`.
    pub fn discover(
        root: &Path,
        hub_dir: &str,
        spoke_prefix: &str,
        secure_connection: bool,
    ) -> TopologyResult<Self> {
        let hub = read_instance_config(&root.join(hub_dir))?;

        let mut spoke_dirs: Vec<PathBuf> = std::fs::read_dir(root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(spoke_prefix) && n != hub_dir)
            })
            .collect();
        spoke_dirs.sort();

        let mut instances = vec![hub.clone()];
        for dir in &spoke_dirs {
            instances.push(read_instance_config(dir)?);
        }

        let config = Self {
            secure_connection,
            hub: hub.admin_orgname,
            output_dir: root.to_path_buf(),
            readiness: ReadinessPolicy::default(),
            instances,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that the hub is configured and instance names are unique.
    pub fn validate(&self) -> TopologyResult<()> {
        let mut names = HashSet::new();
        for instance in &self.instances {
            if !names.insert(instance.name()) {
                return Err(TopologyError::Config(format!(
                    "instance {} is configured twice",
                    instance.name()
                )));
            }
        }
        if !names.contains(self.hub.as_str()) {
            return Err(TopologyError::Config(format!(
                "hub {} is not among the configured instances",
                self.hub
            )));
        }
        if self.readiness.max_attempts == 0 {
            return Err(TopologyError::Config(
                "readiness.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn hub(&self) -> TopologyResult<&InstanceConfig> {
        self.instance(&self.hub)
    }

    /// Every instance except the hub, in configuration order.
    pub fn spokes(&self) -> impl Iterator<Item = &InstanceConfig> {
        self.instances.iter().filter(|i| i.name() != self.hub)
    }

    pub fn instance(&self, name: &str) -> TopologyResult<&InstanceConfig> {
        self.instances
            .iter()
            .find(|i| i.name() == name)
            .ok_or_else(|| TopologyError::UnknownInstance(name.to_string()))
    }
}

fn read_instance_config(dir: &Path) -> TopologyResult<InstanceConfig> {
    let path = dir.join(INSTANCE_CONFIG_FILE);
    debug!("Reading instance config {}", path.display());
    let contents = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const FEDERATION: &str = r#"
secure_connection = false
hub = "Hub org"
output_dir = "misps"

[readiness]
interval_ms = 250
max_attempts = 20

[[instances]]
admin_orgname = "Hub org"
baseurl = "https://localhost:4430/"
admin_key = "hub-key"
email_site_admin = "hub@site-admin.local"
email_orgadmin = "hub@org-admin.local"
email_user = "hub@user.local"

[[instances]]
admin_orgname = "First org"
baseurl = "https://localhost:4431/"
external_baseurl = "https://misp01.local"
admin_key = "first-key"
email_site_admin = "first@site-admin.local"
email_orgadmin = "first@org-admin.local"
email_user = "first@user.local"
"#;

    #[test]
    fn parse_federation_toml() {
        let config = FederationConfig::from_toml_str(FEDERATION).unwrap();
        assert!(!config.secure_connection);
        assert_eq!(config.output_dir, PathBuf::from("misps"));
        assert_eq!(config.readiness.interval(), Duration::from_millis(250));
        assert_eq!(config.hub().unwrap().admin_key, "hub-key");
        let spokes: Vec<&str> = config.spokes().map(|s| s.name()).collect();
        assert_eq!(spokes, vec!["First org"]);
    }

    #[test]
    fn external_baseurl_defaults_to_baseurl() {
        let config = FederationConfig::from_toml_str(FEDERATION).unwrap();
        assert_eq!(
            config.hub().unwrap().external_baseurl(),
            "https://localhost:4430/"
        );
        assert_eq!(
            config.instance("First org").unwrap().external_baseurl(),
            "https://misp01.local"
        );
    }

    #[test]
    fn defaults_apply_when_sections_are_missing() {
        let config: FederationConfig = toml::from_str(r#"hub = "x""#).unwrap();
        assert!(config.secure_connection);
        assert_eq!(config.readiness, ReadinessPolicy::default());
        assert!(config.instances.is_empty());
    }

    #[test]
    fn unknown_hub_is_rejected() {
        let err = FederationConfig::from_toml_str(&FEDERATION.replace(
            r#"hub = "Hub org""#,
            r#"hub = "Nobody""#,
        ))
        .unwrap_err();
        assert!(matches!(err, TopologyError::Config(_)));
    }

    #[test]
    fn duplicate_instance_is_rejected() {
        let doubled = format!(
            "{}{}",
            FEDERATION,
            r#"
[[instances]]
admin_orgname = "First org"
baseurl = "https://localhost:4439/"
admin_key = "k"
email_site_admin = "a@b"
email_orgadmin = "c@d"
email_user = "e@f"
"#
        );
        let err = FederationConfig::from_toml_str(&doubled).unwrap_err();
        assert!(matches!(err, TopologyError::Config(_)));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let err = FederationConfig::from_toml_str("this is not valid toml {{{{").unwrap_err();
        assert!(matches!(err, TopologyError::Toml(_)));
    }

    fn write_instance(root: &Path, dir: &str, name: &str, port: u16) {
        let path = root.join(dir);
        std::fs::create_dir_all(&path).unwrap();
        let config = InstanceConfig {
            admin_orgname: name.to_string(),
            baseurl: format!("https://localhost:{port}/"),
            external_baseurl: None,
            admin_key: format!("{dir}-key"),
            email_site_admin: format!("{dir}@site-admin.local"),
            email_orgadmin: format!("{dir}@org-admin.local"),
            email_user: format!("{dir}@user.local"),
        };
        std::fs::write(
            path.join(INSTANCE_CONFIG_FILE),
            serde_json::to_string_pretty(&config).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn discover_reads_hub_and_prefixed_spokes() {
        let dir = tempfile::tempdir().unwrap();
        write_instance(dir.path(), "misp-central", "Hub org", 4430);
        write_instance(dir.path(), "misp02", "Second org", 4432);
        write_instance(dir.path(), "misp01", "First org", 4431);
        std::fs::create_dir_all(dir.path().join("unrelated")).unwrap();

        let config = FederationConfig::discover(dir.path(), "misp-central", "misp", true).unwrap();
        assert_eq!(config.hub, "Hub org");
        assert_eq!(config.output_dir, dir.path());
        let spokes: Vec<&str> = config.spokes().map(|s| s.name()).collect();
        assert_eq!(spokes, vec!["First org", "Second org"]);
    }

    #[test]
    fn discover_without_hub_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = FederationConfig::discover(dir.path(), "misp-central", "misp", true).unwrap_err();
        assert!(matches!(err, TopologyError::Io(_)));
    }
}
