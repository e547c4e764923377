use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use positron_api::gemini::{DEFAULT_BASE_URL as GEMINI_BASE_URL, DEFAULT_MODEL};
use positron_store::firestore::DEFAULT_BASE_URL as FIRESTORE_BASE_URL;

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-gemini-api-key",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub firebase_project_id: Option<String>,
    pub firestore_base_url: String,
    pub dev_secret: Option<String>,
    pub db_path: PathBuf,
    pub static_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Unset and empty are the same thing.
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let gemini_api_key = match var("GEMINI_API_KEY") {
            Some(key) if !PLACEHOLDER_SECRETS.contains(&key.as_str()) => key,
            _ => bail!("GEMINI_API_KEY is unset or still a placeholder"),
        };

        let dev_secret = var("POSITRON_DEV_SECRET");
        if let Some(secret) = &dev_secret {
            if PLACEHOLDER_SECRETS.contains(&secret.as_str()) {
                bail!("POSITRON_DEV_SECRET is still a placeholder");
            }
        }

        let port = match var("POSITRON_PORT") {
            Some(p) => p
                .parse()
                .with_context(|| format!("POSITRON_PORT is not a port number: {}", p))?,
            None => 3001,
        };

        Ok(Self {
            host: var("POSITRON_HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port,
            gemini_api_key,
            gemini_model: var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            gemini_base_url: var("GEMINI_BASE_URL").unwrap_or_else(|| GEMINI_BASE_URL.into()),
            firebase_project_id: var("FIREBASE_PROJECT_ID"),
            firestore_base_url: var("FIRESTORE_BASE_URL")
                .unwrap_or_else(|| FIRESTORE_BASE_URL.into()),
            dev_secret,
            db_path: var("POSITRON_DB_PATH")
                .unwrap_or_else(|| "positron.db".into())
                .into(),
            static_dir: var("POSITRON_STATIC_DIR").map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[("GEMINI_API_KEY", "AIza-test")]).unwrap();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 3001);
        assert_eq!(cfg.gemini_model, "gemini-2.5-flash");
        assert!(cfg.firebase_project_id.is_none());
        assert!(cfg.dev_secret.is_none());
        assert_eq!(cfg.db_path, PathBuf::from("positron.db"));
        assert!(cfg.static_dir.is_none());
    }

    #[test]
    fn api_key_required() {
        assert!(config(&[]).is_err());
        assert!(config(&[("GEMINI_API_KEY", "   ")]).is_err());
        assert!(config(&[("GEMINI_API_KEY", "your-gemini-api-key")]).is_err());
    }

    #[test]
    fn placeholder_dev_secret_rejected() {
        let err = config(&[
            ("GEMINI_API_KEY", "AIza-test"),
            ("POSITRON_DEV_SECRET", "dev-secret-change-me"),
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn bad_port_rejected() {
        assert!(config(&[("GEMINI_API_KEY", "k"), ("POSITRON_PORT", "warp9")]).is_err());
    }

    #[test]
    fn overrides() {
        let cfg = config(&[
            ("GEMINI_API_KEY", "k"),
            ("POSITRON_PORT", "8080"),
            ("FIREBASE_PROJECT_ID", "enterprise-d"),
            ("POSITRON_STATIC_DIR", "dist"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.firebase_project_id.as_deref(), Some("enterprise-d"));
        assert_eq!(cfg.static_dir, Some(PathBuf::from("dist")));
    }
}
