use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use crate::{
    dispatch::ReplyPolicy,
    errors::Error,
    messaging::{
        throttled::ThrottleConfig,
        types::{FetchWindow, InlineButton, InlineKeyboard},
    },
    store::StoreConfig,
    Result,
};

/// Outbound proxy. Passed explicitly to the Telegram client; never global state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProxyConfig {
    pub enabled: bool,
    /// `host:port` or a full `socks5://` URL.
    pub url: Option<String>,
}

impl ProxyConfig {
    pub fn socks5(url: impl Into<String>) -> Self {
        Self {
            enabled: true,
            url: Some(url.into()),
        }
    }

    /// Proxy URL to dial through, when enabled.
    pub fn proxy_url(&self) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let url = self.url.as_deref()?.trim();
        if url.contains("://") {
            Some(url.to_string())
        } else {
            Some(format!("socks5://{url}"))
        }
    }
}

/// Typed configuration for the relay.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_api_url: String,
    pub proxy: ProxyConfig,
    pub request_timeout: Duration,

    // Dedup store
    pub store: StoreConfig,

    // Polling
    /// Negative: always re-request the trailing N updates. Otherwise: advance past what was seen.
    pub poll_offset: i64,
    pub window: FetchWindow,
    pub poll_idle: Duration,
    pub run_once: bool,

    // Dispatch
    pub await_emits: bool,
    pub reply: ReplyPolicy,
    pub throttle: ThrottleConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(&|key: &str| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (process env in production).
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(lookup);

        // Required env vars
        let telegram_bot_token = env.str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        let telegram_api_url = env
            .str("TELEGRAM_API_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| "https://api.telegram.org".to_string())
            .trim_end_matches('/')
            .to_string();

        // Proxy
        let proxy = ProxyConfig {
            enabled: env.bool("PROXY_ENABLED").unwrap_or(false),
            url: env.str("PROXY_URL").and_then(non_empty),
        };
        if proxy.enabled && proxy.url.is_none() {
            return Err(Error::Config(
                "PROXY_URL is required when PROXY_ENABLED is set".to_string(),
            ));
        }
        let request_timeout =
            Duration::from_millis(env.u64("REQUEST_TIMEOUT_MS").unwrap_or(10_000));

        // Store
        let store = StoreConfig {
            path: PathBuf::from(env.str("STORE_PATH").unwrap_or("telega.db".to_string())),
            bucket: env
                .str("STORE_BUCKET")
                .and_then(non_empty)
                .unwrap_or("Get".to_string()),
            key_prefix: env.str("STORE_KEY_PREFIX").unwrap_or("key".to_string()),
            lock_timeout: Duration::from_millis(env.u64("STORE_LOCK_TIMEOUT_MS").unwrap_or(1000)),
        };

        // Polling (defaults match the original getUpdates payload)
        let poll_offset = env.i64("POLL_OFFSET").unwrap_or(-5);
        let allowed_updates = parse_csv_lower(
            env.str("POLL_ALLOWED_UPDATES")
                .or_else(|| Some("message,callback_query,inline_query".to_string())),
        );
        let window = FetchWindow {
            offset: None,
            limit: env.u32("POLL_LIMIT").unwrap_or(5).clamp(1, 100),
            timeout: Duration::from_secs(env.u64("POLL_TIMEOUT_SECS").unwrap_or(1)),
            allowed_updates,
        };
        let poll_idle = Duration::from_millis(env.u64("POLL_IDLE_MS").unwrap_or(1000));
        let run_once = env.bool("RUN_ONCE").unwrap_or(false);

        // Dispatch
        let await_emits = env.bool("AWAIT_EMITS").unwrap_or(true);
        let mut reply = ReplyPolicy::default();
        if let Some(raw) = env.str("REPLY_BUTTONS") {
            reply.keyboard = parse_buttons(&raw);
        }
        if let Some(typing) = env.bool("REPLY_TYPING") {
            reply.typing_indicator = typing;
        }

        let defaults = ThrottleConfig::default();
        let throttle = ThrottleConfig {
            global_min_interval: env
                .u64("THROTTLE_GLOBAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.global_min_interval),
            per_chat_min_interval: env
                .u64("THROTTLE_PER_CHAT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.per_chat_min_interval),
        };

        Ok(Self {
            telegram_bot_token,
            telegram_api_url,
            proxy,
            request_timeout,
            store,
            poll_offset,
            window,
            poll_idle,
            run_once,
            await_emits,
            reply,
            throttle,
        })
    }
}

/// `label=data,label=data`; a bare label uses itself as callback data.
fn parse_buttons(raw: &str) -> InlineKeyboard {
    let buttons = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| match s.split_once('=') {
            Some((label, data)) => InlineButton {
                label: label.trim().to_string(),
                callback_data: data.trim().to_string(),
            },
            None => InlineButton {
                label: s.to_string(),
                callback_data: s.to_string(),
            },
        })
        .collect();
    InlineKeyboard::single_row(buttons)
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

        env::set_var(key, unquote(v.trim()));
    }
}

/// Strip optional surrounding quotes.
fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        &val[1..val.len() - 1]
    } else {
        val
    }
}

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    fn str(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn bool(&self, key: &str) -> Option<bool> {
        self.str(key).map(|s| {
            matches!(
                s.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    }

    fn u64(&self, key: &str) -> Option<u64> {
        self.str(key).and_then(|s| s.trim().parse::<u64>().ok())
    }

    fn u32(&self, key: &str) -> Option<u32> {
        self.str(key).and_then(|s| s.trim().parse::<u32>().ok())
    }

    fn i64(&self, key: &str) -> Option<i64> {
        self.str(key).and_then(|s| s.trim().parse::<i64>().ok())
    }
}

fn parse_csv_lower(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(&move |k: &str| map.get(k).cloned())
    }

    #[test]
    fn defaults_follow_the_original_bot() {
        let cfg = load(&[("TELEGRAM_BOT_TOKEN", "123:abc")]).unwrap();

        assert_eq!(cfg.telegram_api_url, "https://api.telegram.org");
        assert_eq!(cfg.poll_offset, -5);
        assert_eq!(cfg.window.limit, 5);
        assert_eq!(cfg.window.timeout, Duration::from_secs(1));
        assert_eq!(
            cfg.window.allowed_updates,
            vec!["message", "callback_query", "inline_query"]
        );
        assert_eq!(cfg.store.path, PathBuf::from("telega.db"));
        assert_eq!(cfg.store.bucket, "Get");
        assert_eq!(cfg.store.key_prefix, "key");
        assert_eq!(cfg.store.lock_timeout, Duration::from_secs(1));
        assert_eq!(cfg.proxy.proxy_url(), None);
        assert!(cfg.await_emits);
        assert!(!cfg.run_once);
        assert_eq!(cfg.reply, ReplyPolicy::default());
    }

    #[test]
    fn missing_token_is_a_config_error() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn proxy_requires_url_and_gets_socks5_scheme() {
        let err = load(&[("TELEGRAM_BOT_TOKEN", "t"), ("PROXY_ENABLED", "true")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let cfg = load(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("PROXY_ENABLED", "1"),
            ("PROXY_URL", "127.0.0.1:9050"),
        ])
        .unwrap();
        assert_eq!(
            cfg.proxy.proxy_url().as_deref(),
            Some("socks5://127.0.0.1:9050")
        );

        // Configured but disabled: direct connection.
        let cfg = load(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("PROXY_URL", "socks5h://proxy:1080"),
        ])
        .unwrap();
        assert_eq!(cfg.proxy.proxy_url(), None);
    }

    #[test]
    fn polling_and_reply_overrides() {
        let cfg = load(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("TELEGRAM_API_URL", "http://localhost:8081/"),
            ("POLL_OFFSET", "0"),
            ("POLL_LIMIT", "500"),
            ("POLL_ALLOWED_UPDATES", "Message, edited_message"),
            ("REPLY_BUTTONS", "ok=confirm, cancel"),
            ("REPLY_TYPING", "no"),
            ("AWAIT_EMITS", "false"),
        ])
        .unwrap();

        assert_eq!(cfg.telegram_api_url, "http://localhost:8081");
        assert_eq!(cfg.poll_offset, 0);
        assert_eq!(cfg.window.limit, 100);
        assert_eq!(cfg.window.allowed_updates, vec!["message", "edited_message"]);
        assert!(!cfg.await_emits);
        assert!(!cfg.reply.typing_indicator);

        let row = &cfg.reply.keyboard.rows[0];
        assert_eq!(row[0].label, "ok");
        assert_eq!(row[0].callback_data, "confirm");
        assert_eq!(row[1].label, "cancel");
        assert_eq!(row[1].callback_data, "cancel");
    }

    #[test]
    fn empty_reply_buttons_disable_the_keyboard() {
        let cfg = load(&[("TELEGRAM_BOT_TOKEN", "t"), ("REPLY_BUTTONS", "")]).unwrap();
        assert!(cfg.reply.keyboard.is_empty());
    }

    #[test]
    fn unquote_strips_matching_quotes_only() {
        assert_eq!(unquote("\"abc\""), "abc");
        assert_eq!(unquote("'abc'"), "abc");
        assert_eq!(unquote("\"abc'"), "\"abc'");
    }
}
