//! Application settings and paths.
//!
//! Manages XDG-compliant paths for configuration and run data, and the
//! settings file that seeds every run's options and prober registry.

use crate::error::{ConfigError, ConfigResult};
use crate::output::OutputFormat;
use crate::pipeline::{RunOptions, DEFAULT_PROXY};
use crate::prober::native::TOP_PORTS;
use crate::prober::{FanOutPolicy, ProberRegistry, ToolSpec};
use crate::types::StageKind;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Global paths singleton.
static PATHS: OnceLock<Paths> = OnceLock::new();

/// Application directory paths following the XDG Base Directory Specification.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Configuration directory (~/.config/bountyx)
    pub config_dir: PathBuf,
    /// Data directory (~/.local/share/bountyx)
    pub data_dir: PathBuf,
}

impl Paths {
    /// Get the global paths instance, creating the directories on first use.
    pub fn get() -> ConfigResult<&'static Paths> {
        if let Some(paths) = PATHS.get() {
            return Ok(paths);
        }
        let paths = Self::new()?;
        Ok(PATHS.get_or_init(|| paths))
    }

    /// Initialize paths using XDG directories.
    fn new() -> ConfigResult<Self> {
        let project =
            ProjectDirs::from("com", "bountyx", "bountyx").ok_or(ConfigError::DirectoryNotFound)?;
        Self::at(project.config_dir(), project.data_dir())
    }

    /// Paths rooted at explicit directories, created if missing.
    pub fn at(config_dir: &Path, data_dir: &Path) -> ConfigResult<Self> {
        let paths = Self {
            config_dir: config_dir.to_path_buf(),
            data_dir: data_dir.to_path_buf(),
        };

        fs::create_dir_all(&paths.config_dir)?;
        fs::create_dir_all(&paths.data_dir)?;

        Ok(paths)
    }

    /// Get the path to the settings file.
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    /// Get the path to the run storage directory.
    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }
}

/// Application-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Prober calls allowed in flight at once.
    pub concurrency: usize,
    /// Worker count handed to each prober.
    pub threads: usize,
    pub per_probe_timeout_secs: u64,
    /// Whole-stage timeout, unbounded when absent.
    pub stage_timeout_secs: Option<u64>,
    /// Time a cancelled prober gets to stop before it is abandoned.
    pub grace_ms: u64,
    pub output_format: OutputFormat,
    pub use_anonymizing_proxy: bool,
    pub proxy_url: String,
    /// Requests per second for native probers, 0 for unlimited.
    pub rate_limit: u32,
    pub request_timeout_ms: u64,
    pub dns_wordlist: Option<PathBuf>,
    pub dir_wordlist: Option<PathBuf>,
    /// Ports checked by the native port scanner.
    pub ports: Vec<u16>,
    /// Per-stage fan-out policy overrides.
    pub policies: BTreeMap<StageKind, FanOutPolicy>,
    /// Prober ids never to run.
    pub disabled_probers: Vec<String>,
    /// Extra external tool adapters. An entry reusing a built-in id replaces it.
    pub tools: Vec<ToolSpec>,
    /// Persist every run under the data directory.
    pub auto_save_runs: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            threads: 50,
            per_probe_timeout_secs: 600,
            stage_timeout_secs: None,
            grace_ms: 2000,
            output_format: OutputFormat::Text,
            use_anonymizing_proxy: false,
            proxy_url: DEFAULT_PROXY.to_string(),
            rate_limit: 0,
            request_timeout_ms: 10_000,
            dns_wordlist: None,
            dir_wordlist: None,
            ports: TOP_PORTS.to_vec(),
            policies: BTreeMap::new(),
            disabled_probers: Vec::new(),
            tools: Vec::new(),
            auto_save_runs: true,
        }
    }
}

impl AppSettings {
    /// Load settings from the default location, or defaults if none exist.
    pub fn load() -> ConfigResult<Self> {
        let file = Paths::get()?.settings_file();

        if !file.exists() {
            debug!(path = %file.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&file)
    }

    /// Load settings from a specific file.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let settings: Self =
            serde_json::from_str(&content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to the default location.
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&Paths::get()?.settings_file())
    }

    /// Save settings to a specific file.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| ConfigError::WriteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Reject values no run could work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue("concurrency must be at least 1".into()));
        }
        if self.threads == 0 {
            return Err(ConfigError::InvalidValue("threads must be at least 1".into()));
        }
        if self.per_probe_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "per_probe_timeout_secs must be at least 1".into(),
            ));
        }
        if self.stage_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "stage_timeout_secs must be at least 1".into(),
            ));
        }
        url::Url::parse(&self.proxy_url)
            .map_err(|e| ConfigError::InvalidValue(format!("proxy_url {}: {}", self.proxy_url, e)))?;
        if let Some(tool) = self.tools.iter().find(|t| t.id.is_empty() || t.binary.is_empty()) {
            return Err(ConfigError::InvalidValue(format!(
                "tool adapter for stage {:?} needs an id and a binary",
                tool.stage
            )));
        }
        Ok(())
    }

    /// The immutable run options these settings describe.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            concurrency: self.concurrency.max(1),
            threads: self.threads.max(1),
            per_probe_timeout: Duration::from_secs(self.per_probe_timeout_secs),
            stage_timeout: self.stage_timeout_secs.map(Duration::from_secs),
            grace: Duration::from_millis(self.grace_ms),
            output_format: self.output_format,
            use_anonymizing_proxy: self.use_anonymizing_proxy,
            proxy_url: self.proxy_url.clone(),
            rate_limit: self.rate_limit,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            dns_wordlist: self.dns_wordlist.clone(),
            dir_wordlist: self.dir_wordlist.clone(),
            ports: self.ports.clone(),
        }
    }

    /// Built-in probers plus configured tools, with overrides applied.
    pub fn registry(&self) -> ProberRegistry {
        let mut registry = ProberRegistry::builtin();
        for tool in &self.tools {
            registry.register_tool(tool.clone());
        }
        for (stage, policy) in &self.policies {
            registry.set_policy(*stage, *policy);
        }
        for id in &self.disabled_probers {
            if !registry.remove(id) {
                warn!(prober = %id, "disabled prober is not registered");
            }
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = AppSettings::default();
        assert_eq!(settings.concurrency, 8);
        assert_eq!(settings.per_probe_timeout_secs, 600);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: AppSettings = serde_json::from_str(
            r#"{"concurrency": 3, "policies": {"directory_enum": "fan_out_all"}}"#,
        )
        .unwrap();
        assert_eq!(settings.concurrency, 3);
        assert_eq!(settings.threads, 50);
        assert_eq!(
            settings.policies.get(&StageKind::DirectoryEnum),
            Some(&FanOutPolicy::FanOutAll)
        );
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("settings.json");
        let settings = AppSettings {
            rate_limit: 25,
            disabled_probers: vec!["amass".into()],
            ..AppSettings::default()
        };
        settings.save_to(&file).unwrap();
        assert_eq!(AppSettings::load_from(&file).unwrap(), settings);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let settings = AppSettings {
            concurrency: 0,
            ..AppSettings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidValue(_))));

        let settings = AppSettings {
            proxy_url: "not a url".into(),
            ..AppSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_registry_applies_overrides() {
        let settings = AppSettings {
            disabled_probers: vec!["crtsh".into()],
            policies: BTreeMap::from([(StageKind::DirectoryEnum, FanOutPolicy::FanOutAll)]),
            ..AppSettings::default()
        };
        let registry = settings.registry();
        assert!(registry.get("crtsh").is_none());
        assert!(registry.get("subfinder").is_some());
        assert_eq!(
            registry.policy(StageKind::DirectoryEnum),
            FanOutPolicy::FanOutAll
        );
    }

    #[test]
    fn test_run_options_follow_settings() {
        let settings = AppSettings {
            stage_timeout_secs: Some(30),
            use_anonymizing_proxy: true,
            ..AppSettings::default()
        };
        let options = settings.run_options();
        assert_eq!(options.stage_timeout, Some(Duration::from_secs(30)));
        assert_eq!(options.probe_options().proxy.as_deref(), Some(DEFAULT_PROXY));
    }
}
