use std::{env, time::Duration};

use url::Url;

use crate::error::{DoctorError, Result};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const API_URL_VAR: &str = "PLANT_API_URL";
const TIMEOUT_VAR: &str = "PLANT_API_TIMEOUT_SECS";

/// Where the diagnosis service lives and how long we wait for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Host serving `/predict`, `/get_cure` and the static reference images.
    /// Always stored with a trailing slash.
    pub base_url: Url,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: normalize_base(DEFAULT_API_URL).expect("default API URL is valid"),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, falling back to defaults for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = match lookup(API_URL_VAR) {
            Some(raw) => normalize_base(&raw)
                .map_err(|err| DoctorError::Config(format!("{API_URL_VAR}={raw}: {err}")))?,
            None => normalize_base(DEFAULT_API_URL)?,
        };

        let timeout_secs = match lookup(TIMEOUT_VAR) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                DoctorError::Config(format!("{TIMEOUT_VAR} must be a whole number of seconds"))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            return Err(DoctorError::Config(format!(
                "{TIMEOUT_VAR} must be greater than zero"
            )));
        }

        Ok(ClientConfig {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn with_base_url(mut self, raw: &str) -> Result<Self> {
        self.base_url = normalize_base(raw)?;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Appends a path to the service root, e.g. `predict` or
    /// `static/Images/leaf.jpg`.
    ///
    /// The result always stays under `base_url`: the path is taken as plain
    /// segments, so schemes, hosts and `..` in it cannot move the URL elsewhere.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                DoctorError::Config(format!("{} cannot be used as a base URL", self.base_url))
            })?
            .pop_if_empty()
            .extend(
                path.split('/')
                    .filter(|segment| !matches!(*segment, "" | "." | "..")),
            );
        Ok(url)
    }
}

fn normalize_base(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())?;
    if url.cannot_be_a_base() {
        return Err(DoctorError::Config(format!("{raw} cannot be used as a base URL")));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
