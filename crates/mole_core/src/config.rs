//! Client configuration, loadable from a TOML file.

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Public analysis endpoint of the hosted model.
pub const DEFAULT_ENDPOINT: &str = "https://horatiu-crista-checkyourmole-api.hf.space/analyze";

/// Largest upload accepted by default (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("max_upload_bytes must be greater than zero")]
    ZeroUploadLimit,
}

/// Configuration points of the analysis client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// URL the image is posted to.
    pub endpoint: String,
    /// Health check URL. Derived from `endpoint` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_endpoint: Option<String>,
    /// Upload ceiling in bytes, inclusive.
    pub max_upload_bytes: u64,
    /// Whole-request timeout in seconds; `0` leaves the request unbounded.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            health_endpoint: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Config pointing at `endpoint` with every other value defaulted.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        parse_http_url(&self.endpoint)
    }

    /// Health URL: the explicit one, or the endpoint with a trailing
    /// `/analyze` segment swapped for `/health`.
    pub fn health_url(&self) -> Result<Url, ConfigError> {
        if let Some(explicit) = &self.health_endpoint {
            return parse_http_url(explicit);
        }
        let mut url = self.endpoint_url()?;
        let path = url.path().trim_end_matches('/');
        let health_path = match path.strip_suffix("/analyze") {
            Some(base) => format!("{base}/health"),
            None => format!("{path}/health"),
        };
        url.set_path(&health_path);
        url.set_query(None);
        Ok(url)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.endpoint_url()?;
        if url.scheme() == "http" {
            tracing::warn!(endpoint = %url, "analysis endpoint is not using HTTPS");
        }
        if self.health_endpoint.is_some() {
            self.health_url()?;
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::ZeroUploadLimit);
        }
        Ok(())
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg: ClientConfig = toml::from_str(raw).context("config is not valid TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads the config at `path`, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("cannot read config: {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config: {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let raw = toml::to_string_pretty(self).context("cannot serialize config")?;
        fs::write(path, raw).with_context(|| format!("cannot write config: {}", path.display()))
    }
}

fn parse_http_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEndpoint {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_hosted_service() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(cfg.max_upload_bytes, 10_485_760);
        assert_eq!(cfg.request_timeout(), Some(Duration::from_secs(60)));
        assert!(cfg.validate().is_ok());
    }

    #[rstest]
    #[case("https://svc.example/analyze", "https://svc.example/health")]
    #[case("https://svc.example/api/analyze/", "https://svc.example/api/health")]
    #[case("http://127.0.0.1:8080/predict", "http://127.0.0.1:8080/predict/health")]
    fn health_url_is_derived_from_endpoint(#[case] endpoint: &str, #[case] expected: &str) {
        let cfg = ClientConfig::with_endpoint(endpoint);
        assert_eq!(cfg.health_url().unwrap().as_str(), expected);
    }

    #[test]
    fn explicit_health_endpoint_wins() {
        let cfg = ClientConfig {
            health_endpoint: Some("https://status.example/ping".into()),
            ..ClientConfig::default()
        };
        assert_eq!(
            cfg.health_url().unwrap().as_str(),
            "https://status.example/ping"
        );
    }

    #[rstest]
    #[case("not a url")]
    #[case("ftp://svc.example/analyze")]
    fn rejects_unusable_endpoints(#[case] endpoint: &str) {
        let cfg = ClientConfig::with_endpoint(endpoint);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn zero_timeout_disables_it() {
        let cfg = ClientConfig {
            request_timeout_secs: 0,
            ..ClientConfig::default()
        };
        assert_eq!(cfg.request_timeout(), None);
    }

    #[test]
    fn partial_toml_keeps_defaults() -> Result<()> {
        let cfg = ClientConfig::from_toml_str("max_upload_bytes = 2048\n")?;
        assert_eq!(cfg.max_upload_bytes, 2048);
        assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
        Ok(())
    }

    #[test]
    fn zero_upload_limit_is_rejected() {
        assert!(ClientConfig::from_toml_str("max_upload_bytes = 0\n").is_err());
    }

    #[test]
    fn save_then_load_from_disk() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("config.toml");
        let cfg = ClientConfig {
            endpoint: "https://mirror.example/analyze".into(),
            health_endpoint: None,
            max_upload_bytes: 5 * 1024 * 1024,
            request_timeout_secs: 0,
        };
        cfg.save(&path)?;
        assert_eq!(ClientConfig::load(&path)?, cfg);
        Ok(())
    }

    #[test]
    fn missing_file_loads_defaults() -> Result<()> {
        let dir = tempdir()?;
        let cfg = ClientConfig::load(dir.path().join("absent.toml"))?;
        assert_eq!(cfg, ClientConfig::default());
        Ok(())
    }
}
