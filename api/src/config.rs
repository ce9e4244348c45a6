use std::{net::SocketAddr, time::Duration};

use ipnetwork::IpNetwork;
use rand::RngCore;
use serde::Serialize;

use crate::{comments::tree::OrphanPolicy, target::ContentTypeTag};

pub const DEFAULT_MODELS_WITH_COMMENTS: &str =
    "articles.article,galleries.gallery,interviews.interview";

#[derive(Clone, Debug, PartialEq)]
pub enum Env {
    Dev,
    Staging,
    Production,
}

impl Env {
    /// Reads `ENVIRONMENT`, anything unknown counts as development.
    pub fn from_env() -> Self {
        match var("ENVIRONMENT") {
            Ok(Some(env)) => match env.as_str() {
                "staging" => Env::Staging,
                "production" => Env::Production,
                _ => Env::Dev,
            },
            _ => Env::Dev,
        }
    }
}

/// The site this process serves, resolved once at startup.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct SiteConfig {
    pub id: i32,
    pub domain: String,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct CommentsConfig {
    pub paginate_by: usize,
    pub max_length: usize,
    pub token_max_age: Duration,
    pub orphans: OrphanPolicy,
    pub models_with_comments: Vec<ContentTypeTag>,
}

#[derive(Clone, Debug)]
pub struct ContextConfig {
    pub media_url: String,
    pub version: serde_json::Value,
    pub server_info: serde_json::Value,
}

pub struct ServerConfig {
    pub env: Env,
    pub listen_addr: SocketAddr,
    pub database: Option<DatabaseConfig>,
    pub secret_key: Vec<u8>,
    pub site: SiteConfig,
    pub comments: CommentsConfig,
    pub context: ContextConfig,
    pub cache_ttl: Option<Duration>,
    pub admin_token: Option<String>,
    pub trusted_proxies: Vec<IpNetwork>,
    pub cors_origins: Vec<String>,
}

pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: usize,
}

fn var(key: &str) -> Result<Option<String>, String> {
    match std::env::var(key) {
        Ok(env) => Ok(Some(env)),
        Err(e) => {
            tracing::debug!("Missing environment variable `{key}`");
            match e {
                std::env::VarError::NotPresent => Ok(None),
                std::env::VarError::NotUnicode(_) => Err(format!(
                    "Could not get the environment variable `{key}` due to unicode error"
                )),
            }
        }
    }
}

fn required_var(key: &str) -> String {
    let val = var(key);
    match val {
        Ok(val) => match val {
            Some(val) => val,
            None => {
                tracing::error!("Environment variable `{key}` is required");
                std::process::exit(1)
            }
        },
        Err(e) => {
            tracing::error!(
                "Environment variable `{key}` is required, but could not retrieve: {e}"
            );
            std::process::exit(1)
        }
    }
}

/// Reads and parses an optional variable, falling back to `default` when it
/// is unset. A value that doesn't parse is fatal.
fn parsed_var<T: std::str::FromStr>(key: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match var(key) {
        Ok(Some(raw)) => match raw.trim().parse() {
            Ok(val) => val,
            Err(e) => {
                tracing::error!("Environment variable `{key}` is invalid: {e}");
                std::process::exit(1)
            }
        },
        _ => default,
    }
}

/// Each of `SITE_DOMAIN` and `SITE_NAME` is optional. The name defaults to
/// the domain.
fn site_config(id: i32, domain: Option<String>, name: Option<String>) -> SiteConfig {
    let domain = domain.unwrap_or_else(|| "example.com".into());
    SiteConfig {
        id,
        name: name.unwrap_or_else(|| domain.clone()),
        domain,
    }
}

fn comma_separated(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

pub fn parse_models_with_comments(raw: &str) -> Result<Vec<ContentTypeTag>, String> {
    comma_separated(raw)
        .map(|tag| tag.parse::<ContentTypeTag>().map_err(|e| e.to_string()))
        .collect()
}

pub fn parse_trusted_proxies(raw: &str) -> Result<Vec<IpNetwork>, String> {
    comma_separated(raw)
        .map(|cidr| {
            cidr.parse::<IpNetwork>()
                .map_err(|e| format!("invalid proxy network `{cidr}`: {e}"))
        })
        .collect()
}

fn random_secret() -> Vec<u8> {
    let mut secret = vec![0u8; 32];
    rand::rng().fill_bytes(&mut secret);
    secret
}

fn exit_on_err<T>(key: &str, result: Result<T, String>) -> T {
    result.unwrap_or_else(|e| {
        tracing::error!("Environment variable `{key}` is invalid: {e}");
        std::process::exit(1)
    })
}

impl ServerConfig {
    pub fn new_from_env() -> Self {
        let env = Env::from_env();

        // The in-memory store and an ephemeral secret are only acceptable
        // while developing
        let (database_url, secret_key) = if env == Env::Dev {
            (
                var("DATABASE_URL").ok().flatten(),
                var("SECRET_KEY")
                    .ok()
                    .flatten()
                    .map(String::into_bytes)
                    .unwrap_or_else(|| {
                        tracing::warn!("`SECRET_KEY` is not set, using a random one");
                        random_secret()
                    }),
            )
        } else {
            (
                Some(required_var("DATABASE_URL")),
                required_var("SECRET_KEY").into_bytes(),
            )
        };

        let site = site_config(
            parsed_var("SITE_ID", 1),
            var("SITE_DOMAIN").ok().flatten(),
            var("SITE_NAME").ok().flatten(),
        );

        let models_with_comments = exit_on_err(
            "MODELS_WITH_COMMENTS",
            parse_models_with_comments(
                &var("MODELS_WITH_COMMENTS")
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| DEFAULT_MODELS_WITH_COMMENTS.into()),
            ),
        );

        let server_info = match var("SERVER_INFO") {
            Ok(Some(raw)) => exit_on_err(
                "SERVER_INFO",
                serde_json::from_str(&raw).map_err(|e| e.to_string()),
            ),
            _ => serde_json::json!({}),
        };

        let version = match var("VERSION") {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw)),
            _ => serde_json::json!(1),
        };

        ServerConfig {
            listen_addr: parsed_var("LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000))),
            database: database_url.map(|url| DatabaseConfig {
                url,
                pool_size: parsed_var("DATABASE_POOL_SIZE", 10),
            }),
            secret_key,
            site,
            comments: CommentsConfig {
                paginate_by: parsed_var("COMMENTS_PAGINATE_BY", 50usize).max(1),
                max_length: parsed_var("COMMENTS_MAX_LENGTH", 3000),
                token_max_age: Duration::from_secs(parsed_var(
                    "COMMENTS_TOKEN_MAX_AGE_SECS",
                    2 * 60 * 60,
                )),
                orphans: parsed_var("COMMENTS_ORPHANS", OrphanPolicy::default()),
                models_with_comments,
            },
            context: ContextConfig {
                media_url: var("MEDIA_URL").ok().flatten().unwrap_or_default(),
                version,
                server_info,
            },
            cache_ttl: Some(Duration::from_secs(parsed_var("CACHE_TTL_SECS", 0u64)))
                .filter(|ttl| !ttl.is_zero()),
            admin_token: var("ADMIN_TOKEN").ok().flatten().filter(|t| !t.is_empty()),
            trusted_proxies: exit_on_err(
                "TRUSTED_PROXIES",
                parse_trusted_proxies(&var("TRUSTED_PROXIES").ok().flatten().unwrap_or_default()),
            ),
            cors_origins: comma_separated(&var("CORS_ORIGINS").ok().flatten().unwrap_or_default())
                .map(String::from)
                .collect(),
            env,
        }
    }
}

impl Default for ServerConfig {
    /// Development settings without a database.
    fn default() -> Self {
        ServerConfig {
            env: Env::Dev,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database: None,
            secret_key: random_secret(),
            site: site_config(1, None, None),
            comments: CommentsConfig {
                paginate_by: 50,
                max_length: 3000,
                token_max_age: Duration::from_secs(2 * 60 * 60),
                orphans: OrphanPolicy::default(),
                models_with_comments: parse_models_with_comments(DEFAULT_MODELS_WITH_COMMENTS)
                    .unwrap_or_default(),
            },
            context: ContextConfig {
                media_url: String::new(),
                version: serde_json::json!(1),
                server_info: serde_json::json!({}),
            },
            cache_ttl: None,
            admin_token: None,
            trusted_proxies: vec![],
            cors_origins: vec![],
        }
    }
}
