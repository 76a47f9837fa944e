//! Injection input parsing and validation.
//!
//! The injection input is a single JSON file read once per run. Validation
//! is total: every run either gets a fully resolved [`InjectionConfig`]
//! (token resolved, defaults applied) or a [`ConfigError`] that aborts
//! before any worker process is touched.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Errors from injection input validation. All of these are fatal to the
/// run; none of them are raised after a worker has been spawned.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read injection input {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed injection input: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(
        "no usable access token; either place a token from the dashboard under \
         \"client_access_token\" or point \"token_server_url\" at a token server"
    )]
    MissingToken,

    #[error(
        "no conversations selected; add two-digit prefixes separated by commas \
         under \"conversations\", for example \"00,01\""
    )]
    NoSelectors,
}

/// A 3-component vector from the spatial block, rendered `x;y;z` on the
/// worker command line.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{}", self.x, self.y, self.z)
    }
}

/// Spatial audio presentation mode across the injected bots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpatialStyle {
    #[default]
    Shared,
    Individual,
    None,
}

impl SpatialStyle {
    /// Parse a style string, case-insensitively. Anything unrecognized
    /// falls back to `shared` with a warning; parsing is total so the
    /// corrected value is always the one the worker argv sees.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "shared" => Self::Shared,
            "individual" => Self::Individual,
            "none" => Self::None,
            other => {
                tracing::warn!(
                    "invalid spatial style \"{other}\", falling back to \"shared\""
                );
                Self::Shared
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Individual => "individual",
            Self::None => "none",
        }
    }
}

/// Top-level injection input shape. See the README for a full example.
#[derive(Debug, Clone, Deserialize)]
struct RawInput {
    access: RawAccess,
    #[serde(default)]
    conf_alias: String,
    #[serde(default)]
    conversations: String,
    spatial: RawSpatial,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAccess {
    #[serde(default)]
    token_server_url: String,
    #[serde(default)]
    client_access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSpatial {
    #[serde(default)]
    style: String,
    scale: Vec3,
    right: Vec3,
    up: Vec3,
    forward: Vec3,
}

/// Validated, immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct InjectionConfig {
    /// The resolved bearer token actually handed to the workers.
    pub access_token: String,
    pub conf_alias: String,
    /// Two-character conversation name prefixes, in input order.
    pub selectors: Vec<String>,
    pub style: SpatialStyle,
    pub scale: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub forward: Vec3,
}

impl InjectionConfig {
    /// Read, parse and validate the injection input at `path`, resolving
    /// the access token over `client` if a token server is configured.
    pub async fn load(path: &Path, client: &reqwest::Client) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawInput = serde_json::from_str(&data)?;

        let access_token = resolve_token(client, &raw.access).await?;

        let selectors: Vec<String> = raw
            .conversations
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if selectors.is_empty() {
            return Err(ConfigError::NoSelectors);
        }

        let conf_alias = if raw.conf_alias.is_empty() {
            tracing::warn!("no conference alias specified, using default \"demo\"");
            "demo".to_string()
        } else {
            raw.conf_alias
        };

        Ok(Self {
            access_token,
            conf_alias,
            selectors,
            style: SpatialStyle::parse(&raw.spatial.style),
            scale: raw.spatial.scale,
            right: raw.spatial.right,
            up: raw.spatial.up,
            forward: raw.spatial.forward,
        })
    }
}

/// Token server response body. Anything that does not deserialize to this
/// counts as a soft failure and keeps the static token.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Resolve the access token from the `access` block.
///
/// A successful server fetch overrides the static token; any fetch failure
/// (unreachable, non-200, unparseable body) is logged and the static token
/// is retained. Fails only when neither source yields a non-empty token.
async fn resolve_token(
    client: &reqwest::Client,
    access: &RawAccess,
) -> Result<String, ConfigError> {
    let mut token = access.client_access_token.clone();

    if !access.token_server_url.is_empty() {
        match fetch_token(client, &access.token_server_url).await {
            Ok(fetched) => {
                tracing::info!("fetched access token from {}", access.token_server_url);
                token = fetched;
            }
            Err(err) => {
                tracing::warn!(
                    "token fetch from {} failed ({err}), retaining static token",
                    access.token_server_url
                );
            }
        }
    }

    if token.is_empty() {
        return Err(ConfigError::MissingToken);
    }
    Ok(token)
}

async fn fetch_token(client: &reqwest::Client, url: &str) -> Result<String, String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("token server returned {status}"));
    }
    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| format!("unparseable token response: {e}"))?;
    Ok(body.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write_input(dir: &tempfile::TempDir, json: &str) -> PathBuf {
        let path = dir.path().join("injection-input.json");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(json.as_bytes()).unwrap();
        path
    }

    fn input_json(access: &str, alias: &str, conversations: &str, style: &str) -> String {
        format!(
            r#"{{
              "access": {access},
              "conf_alias": "{alias}",
              "conversations": "{conversations}",
              "spatial": {{
                "style": "{style}",
                "scale": {{"x": 5, "y": 5, "z": 5}},
                "right": {{"x": 1, "y": 0, "z": 0}},
                "up": {{"x": 0, "y": 1, "z": 0}},
                "forward": {{"x": 0, "y": 0, "z": -1}}
              }}
            }}"#
        )
    }

    #[tokio::test]
    async fn static_token_used_without_server() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_input(
            &dir,
            &input_json(
                r#"{"token_server_url": "", "client_access_token": "static-tok"}"#,
                "demo",
                "00,01",
                "shared",
            ),
        );

        let cfg = InjectionConfig::load(&path, &reqwest::Client::new())
            .await
            .unwrap();
        assert_eq!(cfg.access_token, "static-tok");
        assert_eq!(cfg.selectors, vec!["00", "01"]);
    }

    #[tokio::test]
    async fn server_token_overrides_static() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "fetched-tok"})),
            )
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let access = format!(
            r#"{{"token_server_url": "{}", "client_access_token": "static-tok"}}"#,
            server.uri()
        );
        let path = write_input(&dir, &input_json(&access, "demo", "00", "shared"));

        let cfg = InjectionConfig::load(&path, &reqwest::Client::new())
            .await
            .unwrap();
        assert_eq!(cfg.access_token, "fetched-tok");
    }

    #[tokio::test]
    async fn fetch_failure_falls_back_to_static() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let access = format!(
            r#"{{"token_server_url": "{}", "client_access_token": "static-tok"}}"#,
            server.uri()
        );
        let path = write_input(&dir, &input_json(&access, "demo", "00", "shared"));

        let cfg = InjectionConfig::load(&path, &reqwest::Client::new())
            .await
            .unwrap();
        assert_eq!(cfg.access_token, "static-tok");
    }

    #[tokio::test]
    async fn malformed_token_body_falls_back_to_static() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let access = format!(
            r#"{{"token_server_url": "{}", "client_access_token": "static-tok"}}"#,
            server.uri()
        );
        let path = write_input(&dir, &input_json(&access, "demo", "00", "shared"));

        let cfg = InjectionConfig::load(&path, &reqwest::Client::new())
            .await
            .unwrap();
        assert_eq!(cfg.access_token, "static-tok");
    }

    #[tokio::test]
    async fn no_token_at_all_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_input(
            &dir,
            &input_json(
                r#"{"token_server_url": "", "client_access_token": ""}"#,
                "demo",
                "00",
                "shared",
            ),
        );

        let err = InjectionConfig::load(&path, &reqwest::Client::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingToken));
    }

    #[tokio::test]
    async fn empty_selectors_are_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_input(
            &dir,
            &input_json(
                r#"{"token_server_url": "", "client_access_token": "tok"}"#,
                "demo",
                "",
                "shared",
            ),
        );

        let err = InjectionConfig::load(&path, &reqwest::Client::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::NoSelectors));
    }

    #[tokio::test]
    async fn empty_alias_defaults_to_demo() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_input(
            &dir,
            &input_json(
                r#"{"token_server_url": "", "client_access_token": "tok"}"#,
                "",
                "00",
                "shared",
            ),
        );

        let cfg = InjectionConfig::load(&path, &reqwest::Client::new())
            .await
            .unwrap();
        assert_eq!(cfg.conf_alias, "demo");
    }

    #[tokio::test]
    async fn bogus_style_resolves_to_shared() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_input(
            &dir,
            &input_json(
                r#"{"token_server_url": "", "client_access_token": "tok"}"#,
                "demo",
                "00",
                "bogus",
            ),
        );

        let cfg = InjectionConfig::load(&path, &reqwest::Client::new())
            .await
            .unwrap();
        assert_eq!(cfg.style, SpatialStyle::Shared);
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_input(&dir, "{not json");

        let err = InjectionConfig::load(&path, &reqwest::Client::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn vec3_renders_semicolon_separated() {
        let v = Vec3 {
            x: 1.0,
            y: 2.5,
            z: -3.0,
        };
        assert_eq!(v.to_string(), "1;2.5;-3");
    }

    #[test]
    fn style_parse_is_case_insensitive() {
        assert_eq!(SpatialStyle::parse("Individual"), SpatialStyle::Individual);
        assert_eq!(SpatialStyle::parse("NONE"), SpatialStyle::None);
        assert_eq!(SpatialStyle::parse("shared"), SpatialStyle::Shared);
    }
}
