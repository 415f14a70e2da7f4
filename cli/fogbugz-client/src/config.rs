//! Configuration for client construction.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use config::{Config as HierarchicalConfig, Environment};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::ConfigError;

const FOGBUGZ_DIR_NAME: &str = "fogbugz";
pub const FOGBUGZ_CONFIG_FILE: &str = "fogbugz.toml";
const ENV_PREFIX: &str = "FOGBUGZ_";
pub const DEFAULT_PROTOCOL: &str = "https";

/// Connection settings for a FogBugz instance.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct FogbugzConfig {
    /// Host name of the instance, e.g. `example.fogbugz.com`.
    pub host: String,
    /// Email address used to log on.
    pub username: String,
    pub password: String,
    /// `https` unless configured otherwise.
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Additional headers to include in requests.
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
}

fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_string()
}

impl fmt::Debug for FogbugzConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FogbugzConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("protocol", &self.protocol)
            .field("user_agent", &self.user_agent)
            .field("extra_headers", &self.extra_headers)
            .finish()
    }
}

impl FogbugzConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            protocol: default_protocol(),
            user_agent: None,
            extra_headers: BTreeMap::new(),
        }
    }

    /// Default location of the config file, `$XDG_CONFIG_HOME/fogbugz/fogbugz.toml`
    /// on Linux.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(FOGBUGZ_DIR_NAME).join(FOGBUGZ_CONFIG_FILE))
    }

    /// Load the configuration from the default file location (if it exists)
    /// and `FOGBUGZ_*` environment variables, which take precedence.
    pub fn load() -> Result<Self, ConfigError> {
        let file = Self::default_path();
        Self::load_from(file.as_deref(), std::env::vars())
    }

    /// Load the configuration from an optional TOML file and a set of
    /// environment variables.
    ///
    /// Only variables starting with `FOGBUGZ_` are considered; the remainder
    /// of the name, lowercased, is the config key (`FOGBUGZ_HOST` -> `host`).
    pub fn load_from(
        file: Option<&Path>,
        env: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ConfigError> {
        let mut builder =
            HierarchicalConfig::builder().set_default("protocol", DEFAULT_PROTOCOL)?;

        if let Some(file) = file {
            debug!(path = %file.display(), "reading config file");
            builder = builder.add_source(
                config::File::from(file)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }

        let fogbugz_envs = env
            .into_iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(ENV_PREFIX)
                    .map(|k| (k.to_lowercase(), v))
            })
            .collect::<HashMap<_, _>>();
        debug!(keys = ?fogbugz_envs.keys().collect::<Vec<_>>(), "reading config from environment");

        let final_config = builder
            .add_source(Environment::default().source(Some(fogbugz_envs)))
            .build()?;
        let config: FogbugzConfig = final_config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        self.api_url().map(|_| ())
    }

    /// Base URL of the instance, `{protocol}://{host}`.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.host)
    }

    /// Endpoint of the XML API.
    pub fn api_url(&self) -> Result<Url, ConfigError> {
        let url = format!("{}/api.asp", self.base_url());
        Url::parse(&url).map_err(|source| ConfigError::InvalidUrl { url, source })
    }

    /// Web UI link for a filter.
    pub fn filter_url(&self, filter_id: &str) -> String {
        format!("{}/default.asp?pgx=LF&ixFilter={filter_id}", self.base_url())
    }

    /// Web UI link for a case.
    pub fn case_url(&self, case_id: &str) -> String {
        format!("{}/default.asp?{case_id}", self.base_url())
    }
}
