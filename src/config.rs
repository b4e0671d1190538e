use shuttle_runtime::SecretStore;
use std::str::FromStr;

use crate::error::{BotError, BotResult};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub storage: StorageConfig,
    pub router: RouterConfig,
    pub callback: CallbackConfig,
    pub state: StateConfig,
    pub platform: PlatformConfig,
    pub background_tasks: BackgroundTasksConfig,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub token: String,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub turso_url: String,
    pub turso_token: String,
    pub redis_url: String,
}

/// Forwards everything posted in `from` to `to`. Commands keep routing only when `process_commands` is set.
#[derive(Clone, Debug, PartialEq)]
pub struct BridgeConfig {
    pub from: i64,
    pub to: i64,
    pub process_commands: bool,
}

impl FromStr for BridgeConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (route, flag) = match s.split_once(':') {
            Some((route, flag)) => (route, Some(flag)),
            None => (s, None),
        };
        let (from, to) = route
            .split_once('>')
            .ok_or_else(|| format!("Bridge must look like from>to, got {}", s))?;

        Ok(Self {
            from: from.trim().parse().map_err(|_| format!("Invalid bridge source: {}", from))?,
            to: to.trim().parse().map_err(|_| format!("Invalid bridge target: {}", to))?,
            process_commands: flag.is_some_and(|f| f.trim() == "commands"),
        })
    }
}

#[derive(Clone, Debug)]
pub struct RouterConfig {
    pub bot_name: String,
    pub ignore_update_timeout_secs: i64,
    pub main_chat_id: Option<i64>,
    pub auto_remove_chats: Vec<i64>,
    pub bridges: Vec<BridgeConfig>,
    pub always_secret_chats: Vec<i64>,
    pub public_chats: Vec<i64>,
    pub guess_ignore_list: Vec<String>,
    pub restricted_images: Vec<String>,
    pub disabled_features: Vec<String>,
    pub default_language: String,
    pub history_capacity: usize,
}

#[derive(Clone, Debug)]
pub struct CallbackConfig {
    pub cooldown_ms: u64,
}

#[derive(Clone, Debug)]
pub struct StateConfig {
    pub hydration_window_days: i64,
}

#[derive(Clone, Debug)]
pub struct PlatformConfig {
    pub embassy_api_url: String,
    pub assistant_api_url: Option<String>,
    pub assistant_api_token: Option<String>,
    pub assistant_model: String,
}

#[derive(Clone, Debug)]
pub struct BackgroundTasksConfig {
    pub auto_in_interval_secs: u64,
    pub auto_out_interval_secs: u64,
    pub timed_out_interval_secs: u64,
    pub cam_live_interval_secs: u64,
    pub persist_interval_secs: u64,
}

fn required(secret_store: &SecretStore, key: &str) -> BotResult<String> {
    secret_store
        .get(key)
        .ok_or_else(|| BotError::SecretKeyError(format!("Missing {}", key)))
}

fn parsed_or<T: FromStr>(secret_store: &SecretStore, key: &str, default: T) -> BotResult<T> {
    match secret_store.get(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| BotError::SecretKeyError(format!("Invalid {}", key))),
        None => Ok(default),
    }
}

fn list<T: FromStr>(secret_store: &SecretStore, key: &str) -> BotResult<Vec<T>> {
    let Some(value) = secret_store.get(key) else {
        return Ok(Vec::new());
    };

    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<T>()
                .map_err(|_| BotError::SecretKeyError(format!("Invalid {} entry: {}", key, item)))
        })
        .collect()
}

pub fn build_config(secret_store: &SecretStore) -> BotResult<AppConfig> {
    info!("Building AppConfig...");

    let config = AppConfig {
        telegram: TelegramConfig {
            token: required(secret_store, "TELEGRAM_BOT_TOKEN")?,
        },
        storage: StorageConfig {
            turso_url: required(secret_store, "TURSO_URL")?,
            turso_token: required(secret_store, "TURSO_TOKEN")?,
            redis_url: required(secret_store, "REDIS_URL")?,
        },
        router: RouterConfig {
            bot_name: required(secret_store, "TELEGRAM_BOT_NAME")?,
            ignore_update_timeout_secs: parsed_or(secret_store, "ROUTER_IGNORE_UPDATE_TIMEOUT_SECS", 8)?,
            main_chat_id: secret_store
                .get("ROUTER_MAIN_CHAT_ID")
                .map(|id| {
                    id.trim()
                        .parse::<i64>()
                        .map_err(|_| BotError::SecretKeyError("Invalid ROUTER_MAIN_CHAT_ID".to_string()))
                })
                .transpose()?,
            auto_remove_chats: list(secret_store, "ROUTER_AUTO_REMOVE_CHATS")?,
            bridges: list(secret_store, "ROUTER_BRIDGES")?,
            always_secret_chats: list(secret_store, "ROUTER_ALWAYS_SECRET_CHATS")?,
            public_chats: list(secret_store, "ROUTER_PUBLIC_CHATS")?,
            guess_ignore_list: list(secret_store, "ROUTER_GUESS_IGNORE_LIST")?,
            restricted_images: list(secret_store, "ROUTER_RESTRICTED_IMAGES")?,
            disabled_features: list(secret_store, "ROUTER_DISABLED_FEATURES")?,
            default_language: parsed_or(secret_store, "ROUTER_DEFAULT_LANGUAGE", "en".to_string())?,
            history_capacity: parsed_or(secret_store, "ROUTER_HISTORY_CAPACITY", 100)?,
        },
        callback: CallbackConfig {
            cooldown_ms: parsed_or(secret_store, "CALLBACK_COOLDOWN_MS", 1500)?,
        },
        state: StateConfig {
            hydration_window_days: parsed_or(secret_store, "STATE_HYDRATION_WINDOW_DAYS", 30)?,
        },
        platform: PlatformConfig {
            embassy_api_url: required(secret_store, "EMBASSY_API_URL")?,
            assistant_api_url: secret_store.get("ASSISTANT_API_URL"),
            assistant_api_token: secret_store.get("ASSISTANT_API_TOKEN"),
            assistant_model: parsed_or(secret_store, "ASSISTANT_MODEL", "gpt-4o-mini".to_string())?,
        },
        background_tasks: BackgroundTasksConfig {
            auto_in_interval_secs: parsed_or(secret_store, "BACKGROUND_TASKS_AUTO_IN_INTERVAL_SECS", 60)?,
            auto_out_interval_secs: parsed_or(secret_store, "BACKGROUND_TASKS_AUTO_OUT_INTERVAL_SECS", 300)?,
            timed_out_interval_secs: parsed_or(secret_store, "BACKGROUND_TASKS_TIMED_OUT_INTERVAL_SECS", 60)?,
            cam_live_interval_secs: parsed_or(secret_store, "BACKGROUND_TASKS_CAM_LIVE_INTERVAL_SECS", 20)?,
            persist_interval_secs: parsed_or(secret_store, "BACKGROUND_TASKS_PERSIST_INTERVAL_SECS", 600)?,
        },
    };
    info!("AppConfig built");

    Ok(config)
}

#[cfg(test)]
impl AppConfig {
    pub fn new_test_config() -> Self {
        Self {
            telegram: TelegramConfig {
                token: "test-token".to_string(),
            },
            storage: StorageConfig {
                turso_url: String::new(),
                turso_token: String::new(),
                redis_url: String::new(),
            },
            router: RouterConfig {
                bot_name: "hackerbot".to_string(),
                ignore_update_timeout_secs: 8,
                main_chat_id: Some(-100),
                auto_remove_chats: vec![-300],
                bridges: vec![BridgeConfig {
                    from: -400,
                    to: -401,
                    process_commands: false,
                }],
                always_secret_chats: vec![-500],
                public_chats: vec![-100],
                guess_ignore_list: vec!["ignored".to_string()],
                restricted_images: Vec::new(),
                disabled_features: Vec::new(),
                default_language: "en".to_string(),
                history_capacity: 3,
            },
            callback: CallbackConfig { cooldown_ms: 1500 },
            state: StateConfig {
                hydration_window_days: 30,
            },
            platform: PlatformConfig {
                embassy_api_url: "http://localhost:9000".to_string(),
                assistant_api_url: None,
                assistant_api_token: None,
                assistant_model: "test".to_string(),
            },
            background_tasks: BackgroundTasksConfig {
                auto_in_interval_secs: 60,
                auto_out_interval_secs: 300,
                timed_out_interval_secs: 60,
                cam_live_interval_secs: 20,
                persist_interval_secs: 600,
            },
        }
    }
}
