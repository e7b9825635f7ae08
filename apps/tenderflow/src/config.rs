//! # Configuration
//!
//! Optional TOML file plus environment overrides.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//!
//! [storage]
//! backend = "redb"
//! database = "tenderflow.db"
//!
//! [workflow]
//! strict_order = false
//!
//! [http]
//! cors_origins = ["https://portal.example.com"]
//! rate_limit = 100
//!
//! [[auth.tokens]]
//! token = "s3cret"
//! user = "alice"
//! ```
//!
//! ## Environment Overrides
//!
//! - `TENDERFLOW_CORS_ORIGINS`: comma-separated origins, or "*" for all
//! - `TENDERFLOW_RATE_LIMIT`: requests per second (0 disables)
//! - `TENDERFLOW_AUTH_TOKENS`: `token:user,token:user`, appended to the file's table

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tenderflow_core::{TenderflowError, UserId, WorkflowPolicy};

/// Default rate limit in requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Config files above this size are rejected.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// SECTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Storage settings. CLI flags win over these when given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: Option<String>,
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// `None` means localhost only; `["*"]` allows every origin.
    pub cors_origins: Option<Vec<String>>,
    pub rate_limit: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            cors_origins: None,
            rate_limit: DEFAULT_RATE_LIMIT,
        }
    }
}

/// One bearer token and the user it authenticates.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenEntry {
    pub token: String,
    pub user: UserId,
}

impl std::fmt::Debug for TokenEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEntry")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub tokens: Vec<TokenEntry>,
}

// =============================================================================
// CONFIG
// =============================================================================

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub workflow: WorkflowPolicy,
    pub http: HttpConfig,
    pub auth: AuthConfig,
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml(source: &str) -> Result<Self, TenderflowError> {
        toml::from_str(source)
            .map_err(|e| TenderflowError::InvalidArgument(format!("Invalid config: {}", e)))
    }

    /// Read the file at `path` (if any), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, TenderflowError> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, TenderflowError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            TenderflowError::InvalidArgument(format!(
                "Cannot read config '{}': {}",
                path.display(),
                e
            ))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(TenderflowError::InvalidArgument(format!(
                "Config '{}' exceeds {} bytes",
                path.display(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let source = std::fs::read_to_string(path).map_err(|e| {
            TenderflowError::InvalidArgument(format!(
                "Cannot read config '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&source)
    }

    /// Apply `TENDERFLOW_*` overrides resolved through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(origins) = lookup("TENDERFLOW_CORS_ORIGINS") {
            let origins: Vec<String> = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !origins.is_empty() {
                self.http.cors_origins = Some(origins);
            }
        }

        if let Some(raw) = lookup("TENDERFLOW_RATE_LIMIT") {
            match raw.trim().parse() {
                Ok(rps) => self.http.rate_limit = rps,
                Err(_) => tracing::warn!("Ignoring invalid TENDERFLOW_RATE_LIMIT '{}'", raw),
            }
        }

        if let Some(raw) = lookup("TENDERFLOW_AUTH_TOKENS") {
            self.auth.tokens.extend(parse_token_list(&raw));
        }
    }
}

/// Parse `token:user,token:user`. Malformed pairs are skipped.
pub fn parse_token_list(raw: &str) -> Vec<TokenEntry> {
    raw.split(',')
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            match pair.split_once(':') {
                Some((token, user)) if !token.trim().is_empty() && !user.trim().is_empty() => {
                    Some(TokenEntry {
                        token: token.trim().to_string(),
                        user: UserId::new(user.trim()),
                    })
                }
                _ => {
                    tracing::warn!("Ignoring malformed entry in TENDERFLOW_AUTH_TOKENS");
                    None
                }
            }
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn empty_document_is_default() {
        let config = Config::from_toml("").expect("parse");
        assert_eq!(config, Config::default());
        assert_eq!(config.http.rate_limit, DEFAULT_RATE_LIMIT);
        assert!(!config.workflow.strict_order);
    }

    #[test]
    fn full_document_parses() {
        let config = Config::from_toml(
            r#"
            [server]
            host = "0.0.0.0"
            port = 9000

            [storage]
            backend = "file"
            database = "tenders.json"

            [workflow]
            strict_order = true

            [http]
            cors_origins = ["https://portal.example.com"]
            rate_limit = 0

            [[auth.tokens]]
            token = "t-alice"
            user = "alice"
            "#,
        )
        .expect("parse");

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.storage.backend.as_deref(), Some("file"));
        assert!(config.workflow.strict_order);
        assert_eq!(config.http.rate_limit, 0);
        assert_eq!(config.auth.tokens.len(), 1);
        assert_eq!(config.auth.tokens[0].user, UserId::new("alice"));
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = Config::from_toml("[http]\nrps = 5\n").expect_err("unknown key");
        assert!(matches!(err, TenderflowError::InvalidArgument(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let env: BTreeMap<&str, &str> = [
            ("TENDERFLOW_CORS_ORIGINS", "https://a.example, https://b.example"),
            ("TENDERFLOW_RATE_LIMIT", "7"),
            ("TENDERFLOW_AUTH_TOKENS", "t1:alice, t2:bob"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(
            config.http.cors_origins,
            Some(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ])
        );
        assert_eq!(config.http.rate_limit, 7);
        let users: Vec<&str> = config.auth.tokens.iter().map(|t| t.user.as_str()).collect();
        assert_eq!(users, vec!["alice", "bob"]);
    }

    #[test]
    fn invalid_rate_limit_keeps_default() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == "TENDERFLOW_RATE_LIMIT").then(|| "fast".to_string()));
        assert_eq!(config.http.rate_limit, DEFAULT_RATE_LIMIT);
    }

    #[test]
    fn malformed_token_pairs_skipped() {
        let tokens = parse_token_list("t1:alice,,nouser,:bob,t2:");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].token, "t1");
    }

    #[test]
    fn token_debug_is_redacted() {
        let entry = TokenEntry {
            token: "very-secret".to_string(),
            user: UserId::new("alice"),
        };
        assert!(!format!("{:?}", entry).contains("very-secret"));
    }
}
