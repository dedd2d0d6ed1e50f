//! TOML configuration for gerrit-watcher.
//!
//! Every section has compiled-in defaults, so an empty file (or no file at
//! all) yields a working configuration for the qtwayland project.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "GERRIT_WATCHER_CONFIG";

/// System-wide config location, tried after the environment variable.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/gerrit-watcher/gerrit-watcher.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the watcher process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default)]
    pub gerrit: GerritConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default = "default_health_checks")]
    pub health_checks: Vec<HealthCheckConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            gerrit: GerritConfig::default(),
            sandbox: SandboxConfig::default(),
            storage: StorageConfig::default(),
            report: ReportConfig::default(),
            http: HttpConfig::default(),
            scheduler: SchedulerConfig::default(),
            health_checks: default_health_checks(),
            logging: LoggingConfig::default(),
        }
    }
}

impl WatcherConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded watcher configuration");
        Ok(config)
    }

    /// Resolve the configuration the way the CLI does.
    ///
    /// An explicit path must load. Otherwise `GERRIT_WATCHER_CONFIG`, then
    /// the system location, then defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Ok(Self::load_or_default()),
        }
    }

    /// Try the environment variable, then the system path, then defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "GERRIT_WATCHER_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Gerrit
// ---------------------------------------------------------------------------

/// Connection details for the review server's SSH interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GerritConfig {
    pub host: String,
    pub port: u16,
    /// SSH user; the local ssh configuration decides when absent.
    pub user: Option<String>,
    /// Path (or bare command name resolved via `$PATH`) to the ssh client.
    pub ssh_command: String,
    /// Only patch sets for this project are tested.
    pub project: String,
    /// Pause before retrying when the event stream cannot be opened at all.
    pub reconnect_delay_secs: u64,
    /// When false, outcomes are logged instead of posted as review comments.
    pub comments_enabled: bool,
}

impl Default for GerritConfig {
    fn default() -> Self {
        Self {
            host: "codereview.qt-project.org".to_string(),
            port: 29418,
            user: None,
            ssh_command: "ssh".to_string(),
            project: "qt/qtwayland".to_string(),
            reconnect_delay_secs: 5,
            comments_enabled: true,
        }
    }
}

impl GerritConfig {
    /// `user@host`, or just `host` when no user is configured.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    /// The ssh arguments preceding the remote gerrit command.
    pub fn ssh_args(&self) -> Vec<String> {
        vec!["-p".to_string(), self.port.to_string(), self.destination()]
    }
}

// ---------------------------------------------------------------------------
// Sandbox
// ---------------------------------------------------------------------------

/// How test runs are containerized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub docker_command: String,
    /// Image that builds and tests the requested revisions.
    pub image: String,
    /// Environment variable carrying the revision under test.
    pub revision_env: String,
    /// Environment variable carrying the baseline revision.
    pub baseline_env: String,
    /// Pass `--rm` so finished containers do not block name reuse.
    pub remove_container: bool,
    /// Prefix for every run (and container) name.
    pub run_name_prefix: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            docker_command: "docker".to_string(),
            image: "qtbuilder-stretch".to_string(),
            revision_env: "QT_DOCKERTEST_QTWAYLAND_REV".to_string(),
            baseline_env: "QT_DOCKERTEST_QT5_REV".to_string(),
            remove_container: true,
            run_name_prefix: "gerrit-watcher".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON document holding the run ledger.
    pub ledger_path: PathBuf,
    /// Directory receiving one log file per run.
    pub logs_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("data/runs.json"),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Review comment composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Number of trailing log lines quoted in failure comments.
    pub tail_lines: usize,
    /// Code-Review score attached to failure comments.
    pub failure_score: i32,
    /// Externally reachable base URL of the status page, used to link logs.
    pub public_url: Option<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            tail_lines: 30,
            failure_score: -1,
            public_url: None,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Revision to health-check once, immediately after startup.
    pub startup_check: Option<String>,
}

/// One daily health check bound to a revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Used as both the revision under test and the baseline.
    pub revision: String,
    /// Six-field cron expression (seconds first), local time.
    pub cron: String,
}

fn default_health_checks() -> Vec<HealthCheckConfig> {
    vec![
        HealthCheckConfig {
            revision: "dev".to_string(),
            cron: "0 0 2 * * *".to_string(),
        },
        HealthCheckConfig {
            revision: "5.12".to_string(),
            cron: "0 0 4 * * *".to_string(),
        },
    ]
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = WatcherConfig::default();

        assert_eq!(cfg.gerrit.host, "codereview.qt-project.org");
        assert_eq!(cfg.gerrit.port, 29418);
        assert_eq!(cfg.gerrit.project, "qt/qtwayland");
        assert!(cfg.gerrit.comments_enabled);

        assert_eq!(cfg.sandbox.image, "qtbuilder-stretch");
        assert_eq!(cfg.sandbox.revision_env, "QT_DOCKERTEST_QTWAYLAND_REV");
        assert_eq!(cfg.sandbox.baseline_env, "QT_DOCKERTEST_QT5_REV");
        assert_eq!(cfg.sandbox.run_name_prefix, "gerrit-watcher");

        assert_eq!(cfg.storage.ledger_path, PathBuf::from("data/runs.json"));
        assert_eq!(cfg.storage.logs_dir, PathBuf::from("logs"));

        assert_eq!(cfg.report.tail_lines, 30);
        assert_eq!(cfg.report.failure_score, -1);
        assert!(cfg.report.public_url.is_none());

        assert_eq!(cfg.http.bind, "0.0.0.0:8080");
        assert_eq!(cfg.health_checks.len(), 2);
        assert_eq!(cfg.health_checks[0].revision, "dev");
        assert!(cfg.scheduler.startup_check.is_none());
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[gerrit]
host = "review.example.org"
port = 2222
user = "ci-bot"
project = "qt/qtbase"
comments_enabled = false

[sandbox]
image = "qtbuilder-buster"
remove_container = false

[storage]
ledger_path = "/var/lib/gerrit-watcher/runs.json"
logs_dir = "/var/lib/gerrit-watcher/logs"

[report]
tail_lines = 50
public_url = "https://ci.example.org"

[scheduler]
startup_check = "5.11"

[[health_checks]]
revision = "dev"
cron = "0 30 1 * * *"

[logging]
level = "debug"
json = true
"#;

        let cfg: WatcherConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.gerrit.destination(), "ci-bot@review.example.org");
        assert_eq!(cfg.gerrit.ssh_args(), vec!["-p", "2222", "ci-bot@review.example.org"]);
        assert_eq!(cfg.gerrit.project, "qt/qtbase");
        assert!(!cfg.gerrit.comments_enabled);
        assert_eq!(cfg.sandbox.image, "qtbuilder-buster");
        assert!(!cfg.sandbox.remove_container);
        assert_eq!(cfg.sandbox.docker_command, "docker");
        assert_eq!(cfg.report.tail_lines, 50);
        assert_eq!(cfg.report.public_url.as_deref(), Some("https://ci.example.org"));
        assert_eq!(cfg.scheduler.startup_check.as_deref(), Some("5.11"));
        assert_eq!(cfg.health_checks.len(), 1);
        assert_eq!(cfg.health_checks[0].cron, "0 30 1 * * *");
        assert!(cfg.logging.json);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: WatcherConfig = toml::from_str("").unwrap();
        let defaults = WatcherConfig::default();

        assert_eq!(cfg.gerrit.host, defaults.gerrit.host);
        assert_eq!(cfg.storage.ledger_path, defaults.storage.ledger_path);
        assert_eq!(cfg.health_checks, defaults.health_checks);
        assert_eq!(cfg.gerrit.destination(), "codereview.qt-project.org");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("gerrit-watcher.toml");
        std::fs::write(&path, "[http]\nbind = \"127.0.0.1:9999\"\n").unwrap();

        let cfg = WatcherConfig::resolve(Some(&path)).unwrap();
        assert_eq!(cfg.http.bind, "127.0.0.1:9999");
    }

    #[test]
    fn test_explicit_missing_file_errors() {
        let result = WatcherConfig::resolve(Some(Path::new("/nonexistent/gerrit-watcher.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let cfg = WatcherConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let roundtripped: WatcherConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(cfg.gerrit.port, roundtripped.gerrit.port);
        assert_eq!(cfg.health_checks, roundtripped.health_checks);
    }
}
