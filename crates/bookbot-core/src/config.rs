use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration, loaded from the environment (with `.env` support).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub bot_token: String,

    // Catalog
    pub catalog_url: String,
    pub http_timeout: Duration,

    /// Injected storage root for downloaded/extracted files. Created at
    /// load time; never cleaned up by the bot.
    pub storage_dir: PathBuf,

    // Persistence (JSON file store)
    pub store_file: PathBuf,

    // Email delivery (optional; email flow disabled when the key is absent)
    pub resend_api_key: Option<String>,
    pub email_from: String,

    // HTTP API
    pub api_port: u16,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let bot_token = env_str("BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let catalog_url = env_str("CATALOG_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| "http://flibusta.is".to_string());
        // A trailing slash would break relative-href resolution.
        let catalog_url = catalog_url.trim_end_matches('/').to_string();

        let http_timeout = Duration::from_millis(env_u64("HTTP_TIMEOUT_MS").unwrap_or(30_000));

        let storage_dir =
            PathBuf::from(env_str("STORAGE_DIR").unwrap_or("/tmp/bookbot".to_string()));
        fs::create_dir_all(&storage_dir)?;

        let store_file = PathBuf::from(
            env_str("STORE_FILE").unwrap_or("/tmp/bookbot-store.json".to_string()),
        );

        let resend_api_key = env_str("RESEND_API_KEY").and_then(non_empty);
        let email_from = env_str("EMAIL_FROM")
            .and_then(non_empty)
            .unwrap_or_else(|| "Ebook Bot <onboarding@resend.dev>".to_string());

        let api_port = env_u64("API_PORT").unwrap_or(3001) as u16;

        Ok(Self {
            bot_token,
            catalog_url,
            http_timeout,
            storage_dir,
            store_file,
            resend_api_key,
            email_from,
            api_port,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}
