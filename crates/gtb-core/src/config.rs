use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed runtime configuration, loaded from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,
    /// Base API URL without a trailing slash. Overridable for local Bot API
    /// servers and tests.
    pub telegram_api_url: String,
    pub database_path: PathBuf,
    /// How long Telegram holds a `getUpdates` request open.
    pub poll_timeout: Duration,
    /// Pause before retrying a failed fetch at the same offset.
    pub fetch_retry_delay: Duration,
    /// Upper bound on any single outbound API call, so a stalled send
    /// cannot wedge the whole loop.
    pub send_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let telegram_api_url = env_str("TELEGRAM_API_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| "https://api.telegram.org".to_string())
            .trim_end_matches('/')
            .to_string();

        let database_path =
            env_path("DATABASE_PATH").unwrap_or_else(|| PathBuf::from("gtb.sqlite"));

        // 60 seconds is the long-poll default the upstream API documents.
        let poll_timeout = Duration::from_secs(env_u64("POLL_TIMEOUT_SECS").unwrap_or(60));
        let fetch_retry_delay =
            Duration::from_millis(env_u64("FETCH_RETRY_DELAY_MS").unwrap_or(2_000));
        let send_timeout = Duration::from_secs(env_u64("SEND_TIMEOUT_SECS").unwrap_or(30));

        Ok(Self {
            telegram_bot_token,
            telegram_api_url,
            database_path,
            poll_timeout,
            fetch_retry_delay,
            send_timeout,
        })
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

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
