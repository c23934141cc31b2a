//! Settings for the reference CI pipeline.

use crate::actions::{ImageRef, Severity};
use crate::context::EnvironmentSnapshot;
use crate::errors::{CiflowError, ContractErrorInfo, PipelineValidationError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Overrides [`CiConfig::image_name`].
pub const IMAGE_NAME_VAR: &str = "CIFLOW_IMAGE_NAME";
/// Overrides [`CiConfig::registry`].
pub const REGISTRY_VAR: &str = "CIFLOW_REGISTRY";
/// Overrides [`CiConfig::image_tag`].
pub const IMAGE_TAG_VAR: &str = "CIFLOW_IMAGE_TAG";
/// Build counter used as the image tag when no explicit tag is set.
pub const BUILD_NUMBER_VAR: &str = "BUILD_NUMBER";

fn default_image_tag() -> String {
    "latest".to_string()
}

const fn default_lockfile_strict() -> bool {
    true
}

const fn default_daemon_ready_attempts() -> usize {
    5
}

const fn default_daemon_ready_interval_ms() -> u64 {
    2000
}

fn default_test_report_glob() -> String {
    "reports/junit/**/*.xml".to_string()
}

fn default_scan_report_glob() -> String {
    "reports/security/**".to_string()
}

fn default_scan_report_path() -> String {
    "reports/security/scan.json".to_string()
}

fn default_dist_glob() -> String {
    "dist/**".to_string()
}

fn default_username_var() -> String {
    "REGISTRY_USERNAME".to_string()
}

fn default_password_var() -> String {
    "REGISTRY_PASSWORD".to_string()
}

fn default_test_command() -> String {
    "npm test".to_string()
}

fn default_scan_command() -> String {
    "npm audit --json".to_string()
}

fn default_cleanup_command() -> String {
    "docker image prune -f".to_string()
}

/// Settings for [`super::build_ci_pipeline`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiConfig {
    /// Repository name of the image.
    #[serde(default)]
    pub image_name: String,
    /// Registry host the image is pushed to.
    #[serde(default)]
    pub registry: String,
    /// Image tag. May reference run variables, e.g. `$BUILD_NUMBER`.
    #[serde(default = "default_image_tag")]
    pub image_tag: String,
    /// Minimum severity the scanners report on.
    #[serde(default)]
    pub severity_threshold: Severity,
    /// Refuse to modify the lockfile while installing.
    #[serde(default = "default_lockfile_strict")]
    pub lockfile_strict: bool,
    /// Probes of the container engine before the build gives up.
    #[serde(default = "default_daemon_ready_attempts")]
    pub daemon_ready_attempts: usize,
    /// Pause between engine probes.
    #[serde(default = "default_daemon_ready_interval_ms")]
    pub daemon_ready_interval_ms: u64,
    /// Variables that must be set for the run to start.
    #[serde(default)]
    pub required_env: Vec<String>,
    /// Commands whose first output line is logged as a tool version.
    #[serde(default)]
    pub tool_version_commands: Vec<String>,
    /// Test reports to archive.
    #[serde(default = "default_test_report_glob")]
    pub test_report_glob: String,
    /// Where the scanner's output is written, relative to the workspace.
    #[serde(default = "default_scan_report_path")]
    pub scan_report_path: String,
    /// Scanner reports to archive.
    #[serde(default = "default_scan_report_glob")]
    pub scan_report_glob: String,
    /// Build output to archive.
    #[serde(default = "default_dist_glob")]
    pub dist_glob: String,
    /// Variable holding the registry user.
    #[serde(default = "default_username_var")]
    pub registry_username_var: String,
    /// Variable holding the registry password.
    #[serde(default = "default_password_var")]
    pub registry_password_var: String,
    /// Shell command running the tests.
    #[serde(default = "default_test_command")]
    pub test_command: String,
    /// Shell command running the primary scanner.
    #[serde(default = "default_scan_command")]
    pub scan_command: String,
    /// Shell command used when the primary scanner errors.
    #[serde(default)]
    pub fallback_scan_command: Option<String>,
    /// Shell command the `always` hook runs.
    #[serde(default = "default_cleanup_command")]
    pub cleanup_command: String,
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            image_name: String::new(),
            registry: String::new(),
            image_tag: default_image_tag(),
            severity_threshold: Severity::default(),
            lockfile_strict: default_lockfile_strict(),
            daemon_ready_attempts: default_daemon_ready_attempts(),
            daemon_ready_interval_ms: default_daemon_ready_interval_ms(),
            required_env: Vec::new(),
            tool_version_commands: Vec::new(),
            test_report_glob: default_test_report_glob(),
            scan_report_path: default_scan_report_path(),
            scan_report_glob: default_scan_report_glob(),
            dist_glob: default_dist_glob(),
            registry_username_var: default_username_var(),
            registry_password_var: default_password_var(),
            test_command: default_test_command(),
            scan_command: default_scan_command(),
            fallback_scan_command: None,
            cleanup_command: default_cleanup_command(),
        }
    }
}

impl CiConfig {
    /// Creates a config for an image.
    #[must_use]
    pub fn new(registry: impl Into<String>, image_name: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            image_name: image_name.into(),
            ..Self::default()
        }
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, CiflowError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CiflowError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Applies overrides from the environment.
    ///
    /// `BUILD_NUMBER` only sets the tag when `CIFLOW_IMAGE_TAG` is absent.
    #[must_use]
    pub fn apply_env(mut self, env: &EnvironmentSnapshot) -> Self {
        let set = |key: &str| env.get(key).filter(|v| !v.trim().is_empty());

        if let Some(name) = set(IMAGE_NAME_VAR) {
            self.image_name = name.to_string();
        }
        if let Some(registry) = set(REGISTRY_VAR) {
            self.registry = registry.to_string();
        }
        if let Some(tag) = set(IMAGE_TAG_VAR).or_else(|| set(BUILD_NUMBER_VAR)) {
            self.image_tag = tag.to_string();
        }
        self
    }

    /// Checks the fields the pipeline cannot run without.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        let missing = |field: &str| {
            PipelineValidationError::new(format!("CI config field '{field}' is empty"))
                .with_error_info(
                    ContractErrorInfo::new("CONFIG-CI-FIELD", format!("'{field}' must be set"))
                        .with_fix_hint(format!(
                            "Set '{field}' in the config file or through the environment."
                        ))
                        .with_context_entry("field", field),
                )
        };

        if self.image_name.trim().is_empty() {
            return Err(missing("image_name"));
        }
        if self.registry.trim().is_empty() {
            return Err(missing("registry"));
        }
        if self.image_tag.trim().is_empty() {
            return Err(missing("image_tag"));
        }
        Ok(())
    }

    /// The image to build and push.
    #[must_use]
    pub fn image(&self) -> ImageRef {
        ImageRef::new(&self.registry, &self.image_name, &self.image_tag)
    }

    /// Pause between engine probes.
    #[must_use]
    pub const fn daemon_ready_interval(&self) -> Duration {
        Duration::from_millis(self.daemon_ready_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config = CiConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CiConfig::default());
        assert!(config.lockfile_strict);
        assert_eq!(config.severity_threshold, Severity::High);
        assert_eq!(config.daemon_ready_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_from_json_str() {
        let config = CiConfig::from_json_str(
            r#"{
                "image_name": "web",
                "registry": "registry.local",
                "severity_threshold": "critical",
                "required_env": ["NODE_ENV"],
                "fallback_scan_command": "trivy fs ."
            }"#,
        )
        .unwrap();

        assert_eq!(config.image().to_string(), "registry.local/web:latest");
        assert_eq!(config.severity_threshold, Severity::Critical);
        assert_eq!(config.required_env, vec!["NODE_ENV"]);
        assert_eq!(config.fallback_scan_command.as_deref(), Some("trivy fs ."));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ci.json");
        std::fs::write(&path, r#"{"image_name": "api", "registry": "r"}"#).unwrap();

        let config = CiConfig::from_json_file(&path).unwrap();
        assert_eq!(config.image_name, "api");

        assert!(matches!(
            CiConfig::from_json_file(dir.path().join("missing.json")),
            Err(CiflowError::Io(_))
        ));
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            CiConfig::from_json_file(&path),
            Err(CiflowError::Serialization(_))
        ));
    }

    #[test]
    fn test_apply_env_overrides() {
        let env = EnvironmentSnapshot::from_pairs([
            (IMAGE_NAME_VAR, "api"),
            (REGISTRY_VAR, "ghcr.io/acme"),
            (BUILD_NUMBER_VAR, "118"),
        ]);
        let config = CiConfig::new("r", "web").apply_env(&env);
        assert_eq!(config.image().to_string(), "ghcr.io/acme/api:118");

        let env = env.with_var(IMAGE_TAG_VAR, "rc-1");
        let config = CiConfig::new("r", "web").apply_env(&env);
        assert_eq!(config.image_tag, "rc-1");
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let env = EnvironmentSnapshot::from_pairs([(IMAGE_NAME_VAR, " "), (BUILD_NUMBER_VAR, "")]);
        let config = CiConfig::new("r", "web").apply_env(&env);
        assert_eq!(config.image_name, "web");
        assert_eq!(config.image_tag, "latest");
    }

    #[test]
    fn test_validate() {
        assert!(CiConfig::new("r", "web").validate().is_ok());

        let err = CiConfig::new("r", "").validate().unwrap_err();
        assert_eq!(err.code(), Some("CONFIG-CI-FIELD"));
        assert!(err.message.contains("image_name"));

        let err = CiConfig::new(" ", "web").validate().unwrap_err();
        assert!(err.message.contains("registry"));
    }
}
