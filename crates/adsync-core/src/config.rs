//! Configuration module for adsyncd.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! Configuration problems are fatal at startup and never surface during a tick.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{AccountOptions, GroupOptions, IgnoreList};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/adsyncd/config.yaml";

/// Default name of the local group that marks managed accounts.
pub const DEFAULT_SYNC_GROUP: &str = "azuread";

const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for adsyncd.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub directory: DirectoryConfig,
    pub backend: BackendConfig,
    pub sync: SyncConfig,
    pub hooks: HooksConfig,
    pub logging: LoggingConfig,
    pub daemon: DaemonConfig,
}

/// Remote directory (Azure AD / Microsoft Graph) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Tenant name or id, used to build the token endpoint.
    pub tenant: String,
    /// Application (client) id of the app registration.
    pub client_id: String,
    /// Client secret of the app registration.
    pub client_secret: String,
    /// Full token endpoint; overrides the tenant-derived one when set.
    pub token_url: Option<String>,
    /// Base URL of the Graph API.
    pub graph_base_url: String,
    /// OAuth scope requested with the client-credentials grant.
    pub scope: String,
    /// When set, the roster is the member list of this directory group.
    pub group_id: Option<String>,
    /// Comma and/or whitespace separated principal names never synced.
    pub blocked_principals: String,
    /// Per-request timeout for directory calls.
    pub request_timeout_secs: u64,
}

/// Which account store adsyncd reconciles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// `/etc/passwd`, `/etc/shadow`, `/etc/group` plus shadow-utils commands.
    #[default]
    Linux,
    /// Active Directory through PowerShell.
    Directory,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Linux => write!(f, "linux"),
            BackendKind::Directory => write!(f, "directory"),
        }
    }
}

/// Local account store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Group whose membership marks an account as managed.
    pub sync_group: String,
    /// Secret applied to every newly created account.
    pub standard_password_hash: String,
    /// Print commands instead of executing them.
    pub dry_run: bool,
    /// Account creation options; backend defaults when absent.
    pub account: Option<AccountOptions>,
    /// Group creation options; backend defaults when absent.
    pub group: Option<GroupOptions>,
    /// Linux account table locations.
    pub files: LinuxFilesConfig,
}

/// Paths of the three Linux account tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinuxFilesConfig {
    pub passwd: PathBuf,
    pub shadow: PathBuf,
    pub group: PathBuf,
}

/// Reconciliation scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between reconciliation ticks.
    pub interval_secs: u64,
}

/// User-defined hooks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    /// Command (argv) run after each account creation; the username is
    /// appended as the last argument.
    pub post_create: Option<Vec<String>>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Log file; stderr when absent.
    pub file: Option<PathBuf>,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// PID file guarding against a second running instance.
    pub pid_file: PathBuf,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            tenant: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            token_url: None,
            graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            group_id: None,
            blocked_principals: String::new(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Linux,
            sync_group: DEFAULT_SYNC_GROUP.to_string(),
            standard_password_hash: String::new(),
            dry_run: false,
            account: None,
            group: None,
            files: LinuxFilesConfig::default(),
        }
    }
}

impl Default for LinuxFilesConfig {
    fn default() -> Self {
        Self {
            passwd: PathBuf::from("/etc/passwd"),
            shadow: PathBuf::from("/etc/shadow"),
            group: PathBuf::from("/etc/group"),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { interval_secs: 600 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json: false,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pid_file: PathBuf::from("/run/adsyncd.pid"),
        }
    }
}

// ---------------------------------------------------------------------------
// Derived values
// ---------------------------------------------------------------------------

impl DirectoryConfig {
    /// Token endpoint for the client-credentials grant.
    pub fn token_endpoint(&self) -> String {
        match &self.token_url {
            Some(url) => url.clone(),
            None => format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
                self.tenant
            ),
        }
    }

    /// Parsed `blocked_principals`.
    pub fn ignore_list(&self) -> IgnoreList {
        IgnoreList::parse(&self.blocked_principals)
    }
}

impl BackendConfig {
    /// Account creation options, falling back to the backend's defaults.
    ///
    /// Linux: create the home directory with the sync group as primary group.
    /// Directory: add the account to the sync group and use the AD flags the
    /// daemon has always set for new accounts.
    pub fn account_options(&self) -> AccountOptions {
        if let Some(options) = &self.account {
            return options.clone();
        }
        match self.kind {
            BackendKind::Linux => AccountOptions {
                create_home: true,
                primary_group: Some(self.sync_group.clone()),
                ..Default::default()
            },
            BackendKind::Directory => AccountOptions {
                supplementary_groups: vec![self.sync_group.clone()],
                extra: [
                    ("CannotChangePassword", "$true"),
                    ("PasswordNeverExpires", "$true"),
                    ("Enabled", "$true"),
                    ("ChangePasswordAtLogon", "$false"),
                ]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
                ..Default::default()
            },
        }
    }

    /// Group creation options, falling back to the backend's defaults.
    pub fn group_options(&self) -> GroupOptions {
        if let Some(options) = &self.group {
            return options.clone();
        }
        match self.kind {
            BackendKind::Linux => GroupOptions::default(),
            BackendKind::Directory => GroupOptions {
                extra: BTreeMap::from([
                    ("GroupCategory".to_string(), "Security".to_string()),
                    ("GroupScope".to_string(), "Global".to_string()),
                    ("Description".to_string(), "Created by adsyncd".to_string()),
                ]),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Errors that prevent the daemon from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration:\n{}", format_validation_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load and validate; any validation error is fatal.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Default path for the configuration file.
    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.interval_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn required(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(ValidationError {
            field: field.into(),
            message: "must not be empty".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- directory ---
        required(&mut errors, "directory.client_id", &self.directory.client_id);
        required(
            &mut errors,
            "directory.client_secret",
            &self.directory.client_secret,
        );
        if self.directory.token_url.is_none() {
            required(&mut errors, "directory.tenant", &self.directory.tenant);
        }
        if !self.directory.graph_base_url.starts_with("http://")
            && !self.directory.graph_base_url.starts_with("https://")
        {
            errors.push(ValidationError {
                field: "directory.graph_base_url".into(),
                message: format!("not an http(s) URL: {}", self.directory.graph_base_url),
            });
        }
        if let Some(group_id) = &self.directory.group_id {
            required(&mut errors, "directory.group_id", group_id);
        }
        if self.directory.request_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "directory.request_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- backend ---
        required(&mut errors, "backend.sync_group", &self.backend.sync_group);
        required(
            &mut errors,
            "backend.standard_password_hash",
            &self.backend.standard_password_hash,
        );
        let options = self.backend.account_options();
        if !self.backend.sync_group.is_empty() && !options.includes_group(&self.backend.sync_group)
        {
            errors.push(ValidationError {
                field: "backend.account".into(),
                message: format!(
                    "created accounts must join the sync group '{}' (primary or supplementary)",
                    self.backend.sync_group
                ),
            });
        }

        // --- sync ---
        if self.sync.interval_secs == 0 {
            errors.push(ValidationError {
                field: "sync.interval_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- hooks ---
        if let Some(argv) = &self.hooks.post_create {
            if argv.first().map_or(true, |program| program.trim().is_empty()) {
                errors.push(ValidationError {
                    field: "hooks.post_create".into(),
                    message: "must name a program".into(),
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use adsync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .directory_tenant("contoso.onmicrosoft.com")
///     .directory_credentials("client-id", "client-secret")
///     .backend_standard_password_hash("$6$salt$hash")
///     .sync_interval_secs(300)
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self::default()
    }

    // --- directory ---

    pub fn directory_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.config.directory.tenant = tenant.into();
        self
    }

    pub fn directory_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.config.directory.client_id = client_id.into();
        self.config.directory.client_secret = client_secret.into();
        self
    }

    pub fn directory_token_url(mut self, url: impl Into<String>) -> Self {
        self.config.directory.token_url = Some(url.into());
        self
    }

    pub fn directory_graph_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.directory.graph_base_url = url.into();
        self
    }

    pub fn directory_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.config.directory.group_id = Some(group_id.into());
        self
    }

    pub fn directory_blocked_principals(mut self, raw: impl Into<String>) -> Self {
        self.config.directory.blocked_principals = raw.into();
        self
    }

    // --- backend ---

    pub fn backend_kind(mut self, kind: BackendKind) -> Self {
        self.config.backend.kind = kind;
        self
    }

    pub fn backend_sync_group(mut self, group: impl Into<String>) -> Self {
        self.config.backend.sync_group = group.into();
        self
    }

    pub fn backend_standard_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.config.backend.standard_password_hash = hash.into();
        self
    }

    pub fn backend_dry_run(mut self, dry_run: bool) -> Self {
        self.config.backend.dry_run = dry_run;
        self
    }

    pub fn backend_account_options(mut self, options: AccountOptions) -> Self {
        self.config.backend.account = Some(options);
        self
    }

    pub fn backend_files(mut self, files: LinuxFilesConfig) -> Self {
        self.config.backend.files = files;
        self
    }

    // --- sync ---

    pub fn sync_interval_secs(mut self, seconds: u64) -> Self {
        self.config.sync.interval_secs = seconds;
        self
    }

    // --- hooks ---

    pub fn hooks_post_create(mut self, argv: Vec<String>) -> Self {
        self.config.hooks.post_create = Some(argv);
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_file(mut self, file: PathBuf) -> Self {
        self.config.logging.file = Some(file);
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- daemon ---

    pub fn daemon_pid_file(mut self, path: PathBuf) -> Self {
        self.config.daemon.pid_file = path;
        self
    }

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }
}
