use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use keepsake_api::{MAX_TOKEN_TTL, PhotoPolicy};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KEEPSAKE_JWT_SECRET is unset or still a placeholder")]
    MissingSecret,
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub blob_dir: PathBuf,
    pub token_ttl: Option<Duration>,
    pub photos: PhotoPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Build from an explicit variable map. Unset keys take their defaults.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| vars.get(key).map(String::as_str).filter(|v| !v.is_empty());

        let jwt_secret = get("KEEPSAKE_JWT_SECRET")
            .filter(|s| !PLACEHOLDER_SECRETS.contains(s))
            .ok_or(ConfigError::MissingSecret)?
            .to_string();

        let host = get("KEEPSAKE_HOST").unwrap_or("0.0.0.0");
        let port: u16 = parse(get("KEEPSAKE_PORT"), "KEEPSAKE_PORT", 3000)?;
        let addr = format!("{}:{}", host, port)
            .parse()
            .map_err(|_| ConfigError::Invalid {
                key: "KEEPSAKE_HOST",
                value: host.to_string(),
            })?;

        let token_ttl = match get("KEEPSAKE_TOKEN_TTL_SECS") {
            Some(raw) => {
                let ttl = Duration::from_secs(parse(Some(raw), "KEEPSAKE_TOKEN_TTL_SECS", 0)?);
                if ttl > MAX_TOKEN_TTL {
                    return Err(ConfigError::Invalid {
                        key: "KEEPSAKE_TOKEN_TTL_SECS",
                        value: raw.to_string(),
                    });
                }
                Some(ttl)
            }
            None => None,
        };

        let defaults = PhotoPolicy::default();
        let delete_attempts: u32 = parse(
            get("KEEPSAKE_BLOB_DELETE_ATTEMPTS"),
            "KEEPSAKE_BLOB_DELETE_ATTEMPTS",
            defaults.delete_attempts,
        )?;
        if delete_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "KEEPSAKE_BLOB_DELETE_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        let photos = PhotoPolicy {
            reap_on_update: parse(
                get("KEEPSAKE_REAP_ON_UPDATE"),
                "KEEPSAKE_REAP_ON_UPDATE",
                defaults.reap_on_update,
            )?,
            delete_attempts,
            max_upload_bytes: parse(
                get("KEEPSAKE_MAX_UPLOAD_BYTES"),
                "KEEPSAKE_MAX_UPLOAD_BYTES",
                defaults.max_upload_bytes,
            )?,
        };

        Ok(Self {
            jwt_secret,
            addr,
            db_path: get("KEEPSAKE_DB_PATH").unwrap_or("keepsake.db").into(),
            blob_dir: get("KEEPSAKE_BLOB_DIR").unwrap_or("./blobs").into(),
            token_ttl,
            photos,
        })
    }
}

fn parse<T: std::str::FromStr>(
    raw: Option<&str>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_with_only_a_secret() {
        let config = Config::from_vars(vars(&[("KEEPSAKE_JWT_SECRET", "s3cret")])).unwrap();

        assert_eq!(config.addr, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.db_path, PathBuf::from("keepsake.db"));
        assert_eq!(config.blob_dir, PathBuf::from("./blobs"));
        assert_eq!(config.token_ttl, None);
        assert!(config.photos.reap_on_update);
        assert_eq!(config.photos.delete_attempts, 1);
    }

    #[test]
    fn secret_is_required() {
        assert!(matches!(
            Config::from_vars(vars(&[])),
            Err(ConfigError::MissingSecret)
        ));
        assert!(matches!(
            Config::from_vars(vars(&[("KEEPSAKE_JWT_SECRET", "dev-secret-change-me")])),
            Err(ConfigError::MissingSecret)
        ));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_vars(vars(&[
            ("KEEPSAKE_JWT_SECRET", "s3cret"),
            ("KEEPSAKE_HOST", "127.0.0.1"),
            ("KEEPSAKE_PORT", "8080"),
            ("KEEPSAKE_TOKEN_TTL_SECS", "86400"),
            ("KEEPSAKE_REAP_ON_UPDATE", "false"),
            ("KEEPSAKE_BLOB_DELETE_ATTEMPTS", "3"),
            ("KEEPSAKE_MAX_UPLOAD_BYTES", "1024"),
        ]))
        .unwrap();

        assert_eq!(config.addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.token_ttl, Some(Duration::from_secs(86400)));
        assert!(!config.photos.reap_on_update);
        assert_eq!(config.photos.delete_attempts, 3);
        assert_eq!(config.photos.max_upload_bytes, 1024);
    }

    #[test]
    fn bad_values_are_reported() {
        let err = Config::from_vars(vars(&[
            ("KEEPSAKE_JWT_SECRET", "s3cret"),
            ("KEEPSAKE_PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("KEEPSAKE_PORT"));

        assert!(Config::from_vars(vars(&[
            ("KEEPSAKE_JWT_SECRET", "s3cret"),
            ("KEEPSAKE_BLOB_DELETE_ATTEMPTS", "0"),
        ]))
        .is_err());
    }

    #[test]
    fn oversized_token_ttl_is_rejected() {
        let err = Config::from_vars(vars(&[
            ("KEEPSAKE_JWT_SECRET", "s3cret"),
            ("KEEPSAKE_TOKEN_TTL_SECS", "18446744073709551615"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { key: "KEEPSAKE_TOKEN_TTL_SECS", .. }
        ));

        let longest = MAX_TOKEN_TTL.as_secs().to_string();
        let config = Config::from_vars(vars(&[
            ("KEEPSAKE_JWT_SECRET", "s3cret"),
            ("KEEPSAKE_TOKEN_TTL_SECS", longest.as_str()),
        ]))
        .unwrap();
        assert_eq!(config.token_ttl, Some(MAX_TOKEN_TTL));
    }
}
