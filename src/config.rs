use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;
use zeroize::Zeroize;

use crate::capture::DEFAULT_CAPTURE_TIMEOUT;

pub const DEFAULT_AUTH_URL: &str = "https://api.multiset.ai/v1/m2m/token";
pub const DEFAULT_QUERY_URL: &str = "https://api.multiset.ai/v1/vps/map/query-form";
pub const DEFAULT_MAP_DETAILS_URL: &str = "https://api.multiset.ai/v1/vps/map/{mapId}";
pub const MAP_ID_PLACEHOLDER: &str = "{mapId}";

const ENV_CONFIG: &str = "ARLOC_CONFIG";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum MapType {
    #[default]
    #[serde(rename = "map")]
    Map,
    #[serde(rename = "map-set")]
    MapSet,
}

impl std::str::FromStr for MapType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "map" => Ok(MapType::Map),
            "map-set" => Ok(MapType::MapSet),
            other => Err(anyhow!("map type must be 'map' or 'map-set', got '{}'", other)),
        }
    }
}

/// Client secret. Zeroized on drop; `Debug` is redacted.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    pub auth_url: String,
    pub query_url: String,
    /// Must contain `{mapId}`.
    pub map_details_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            query_url: DEFAULT_QUERY_URL.to_string(),
            map_details_url: DEFAULT_MAP_DETAILS_URL.to_string(),
        }
    }
}

/// Partial endpoint override; unset fields keep their current value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct EndpointOverrides {
    pub auth_url: Option<String>,
    pub query_url: Option<String>,
    pub map_details_url: Option<String>,
}

impl Endpoints {
    pub fn with_overrides(mut self, overrides: EndpointOverrides) -> Self {
        if let Some(url) = overrides.auth_url {
            self.auth_url = url;
        }
        if let Some(url) = overrides.query_url {
            self.query_url = url;
        }
        if let Some(url) = overrides.map_details_url {
            self.map_details_url = url;
        }
        self
    }

    /// Map-details URL for `map_id`, with the id percent-encoded as one path segment.
    pub fn map_details_for(&self, map_id: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(map_id.as_bytes())
            .collect::<String>()
            .replace('+', "%20");
        self.map_details_url.replace(MAP_ID_PLACEHOLDER, &encoded)
    }

    fn validate(&self) -> Result<()> {
        validate_endpoint("auth_url", &self.auth_url)?;
        validate_endpoint("query_url", &self.query_url)?;
        if !self.map_details_url.contains(MAP_ID_PLACEHOLDER) {
            return Err(anyhow!(
                "map_details_url must contain {}",
                MAP_ID_PLACEHOLDER
            ));
        }
        validate_endpoint("map_details_url", &self.map_details_for("probe"))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize, Default)]
struct LocalizerConfigFile {
    client_id: Option<String>,
    client_secret: Option<Secret>,
    code: Option<String>,
    map_type: Option<MapType>,
    endpoints: Option<EndpointOverrides>,
    capture_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct LocalizerConfig {
    pub client_id: String,
    pub client_secret: Secret,
    /// Map code or map-set code, per `map_type`.
    pub code: String,
    pub map_type: MapType,
    pub endpoints: Endpoints,
    pub capture_timeout: Duration,
}

impl LocalizerConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        code: impl Into<String>,
        map_type: MapType,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Secret::new(client_secret),
            code: code.into(),
            map_type,
            endpoints: Endpoints::default(),
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
        }
    }

    pub fn with_endpoints(mut self, overrides: EndpointOverrides) -> Self {
        self.endpoints = self.endpoints.with_overrides(overrides);
        self
    }

    /// Reads `ARLOC_CONFIG` (JSON, or TOML for `.toml`), applies `ARLOC_*` env overrides,
    /// then validates.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(ENV_CONFIG).ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: LocalizerConfigFile) -> Self {
        Self {
            client_id: file.client_id.unwrap_or_default(),
            client_secret: file.client_secret.unwrap_or_default(),
            code: file.code.unwrap_or_default(),
            map_type: file.map_type.unwrap_or_default(),
            endpoints: Endpoints::default().with_overrides(file.endpoints.unwrap_or_default()),
            capture_timeout: file
                .capture_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_CAPTURE_TIMEOUT),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(id) = non_empty_env("ARLOC_CLIENT_ID") {
            self.client_id = id;
        }
        if let Some(secret) = non_empty_env("ARLOC_CLIENT_SECRET") {
            self.client_secret = Secret::new(secret);
        }
        if let Some(code) = non_empty_env("ARLOC_MAP_CODE") {
            self.code = code;
        }
        if let Some(map_type) = non_empty_env("ARLOC_MAP_TYPE") {
            self.map_type = map_type.parse()?;
        }
        if let Some(url) = non_empty_env("ARLOC_AUTH_URL") {
            self.endpoints.auth_url = url;
        }
        if let Some(url) = non_empty_env("ARLOC_QUERY_URL") {
            self.endpoints.query_url = url;
        }
        if let Some(url) = non_empty_env("ARLOC_MAP_DETAILS_URL") {
            self.endpoints.map_details_url = url;
        }
        if let Some(timeout) = non_empty_env("ARLOC_CAPTURE_TIMEOUT_MS") {
            let millis: u64 = timeout.parse().map_err(|_| {
                anyhow!("ARLOC_CAPTURE_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.capture_timeout = Duration::from_millis(millis);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(anyhow!("client_id must be set"));
        }
        if self.client_secret.is_empty() {
            return Err(anyhow!("client_secret must be set"));
        }
        if self.code.trim().is_empty() {
            return Err(anyhow!("map code must be set"));
        }
        if self.capture_timeout.is_zero() {
            return Err(anyhow!("capture timeout must be greater than zero"));
        }
        self.endpoints.validate()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<LocalizerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

/// Requests go over TLS; plain HTTP is only accepted for loopback hosts.
fn validate_endpoint(name: &str, value: &str) -> Result<()> {
    let url = Url::parse(value).map_err(|e| anyhow!("{} is not a valid URL: {}", name, e))?;
    match url.scheme() {
        "https" => Ok(()),
        "http" if is_loopback_host(&url) => Ok(()),
        other => Err(anyhow!(
            "{} must use https (got '{}://'); http is allowed only for loopback hosts",
            name,
            other
        )),
    }
}

fn is_loopback_host(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(url::Host::Ipv4(addr)) => addr.is_loopback(),
        Some(url::Host::Ipv6(addr)) => addr.is_loopback(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> LocalizerConfig {
        LocalizerConfig::new("id", "secret", "MAP_1", MapType::Map)
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let cfg = valid().with_endpoints(EndpointOverrides {
            query_url: Some("https://vps.example.test/query".into()),
            ..EndpointOverrides::default()
        });
        assert_eq!(cfg.endpoints.query_url, "https://vps.example.test/query");
        assert_eq!(cfg.endpoints.auth_url, DEFAULT_AUTH_URL);
        assert_eq!(cfg.endpoints.map_details_url, DEFAULT_MAP_DETAILS_URL);
        cfg.validate().unwrap();
    }

    #[test]
    fn map_details_url_is_templated() {
        let endpoints = Endpoints::default();
        assert_eq!(
            endpoints.map_details_for("m1"),
            "https://api.multiset.ai/v1/vps/map/m1"
        );
        assert_eq!(
            endpoints.map_details_for("a b/c"),
            "https://api.multiset.ai/v1/vps/map/a%20b%2Fc"
        );
    }

    #[test]
    fn plain_http_only_for_loopback() {
        let local = valid().with_endpoints(EndpointOverrides {
            auth_url: Some("http://127.0.0.1:8080/token".into()),
            query_url: Some("http://localhost:8080/query".into()),
            ..EndpointOverrides::default()
        });
        local.validate().unwrap();

        let remote = valid().with_endpoints(EndpointOverrides {
            auth_url: Some("http://api.example.test/token".into()),
            ..EndpointOverrides::default()
        });
        assert!(remote.validate().is_err());
    }

    #[test]
    fn rejects_missing_credentials_and_template() {
        assert!(LocalizerConfig::new("", "s", "c", MapType::Map).validate().is_err());
        assert!(LocalizerConfig::new("i", " ", "c", MapType::Map).validate().is_err());
        assert!(LocalizerConfig::new("i", "s", "", MapType::Map).validate().is_err());
        let bad = valid().with_endpoints(EndpointOverrides {
            map_details_url: Some("https://api.example.test/maps".into()),
            ..EndpointOverrides::default()
        });
        assert!(bad.validate().is_err());
    }

    #[test]
    fn map_type_parses() {
        assert_eq!("map".parse::<MapType>().unwrap(), MapType::Map);
        assert_eq!("map-set".parse::<MapType>().unwrap(), MapType::MapSet);
        assert!("mapset".parse::<MapType>().is_err());
    }

    #[test]
    fn secret_debug_is_redacted() {
        let cfg = valid();
        assert!(!format!("{:?}", cfg).contains("\"secret\""));
        assert_eq!(cfg.client_secret.expose(), "secret");
    }
}
