use std::env;
use std::str::FromStr;

use tracing::warn;

const DEFAULT_DATABASE_URL: &str = "sqlite:loans.db";
const DEV_LEDGER_KEY: &str = "default_dev_key_change_in_production";
const DEFAULT_AI_API_URL: &str = "https://api.together.xyz/v1/chat/completions";
const DEFAULT_AI_MODEL: &str = "mistralai/Mixtral-8x7B-Instruct-v0.1";
const DEFAULT_AI_SYSTEM_PROMPT: &str =
    "คุณคือเลขาของเซิร์ฟเวอร์ดิสคอร์ด พูดภาษาไทยเป็นกันเองและสุภาพ ตอบให้ตรงคำถามและกระชับ";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Expected {0} in environment")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime settings, read from the environment (and `.env` via dotenv).
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_token: String,
    pub database_url: String,
    pub ledger_key: String,
    pub admin_user_ids: Vec<u64>,
    pub admin_role_name: String,
    pub offer_ttl_secs: i64,
    pub default_loan_amount: i64,
    pub interest_rate_per_hour: f64,
    pub interest_check_interval_secs: u64,
    /// `/ai` stays disabled without a key.
    pub ai_api_key: Option<String>,
    pub ai_api_url: String,
    pub ai_model: String,
    pub ai_system_prompt: String,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let discord_token = lookup("DISCORD_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let ledger_key = match lookup("LEDGER_SIGNING_KEY") {
            Some(key) if !key.is_empty() => key,
            _ => {
                warn!("LEDGER_SIGNING_KEY not set, using the development key");
                DEV_LEDGER_KEY.to_string()
            }
        };

        let admin_user_ids = match lookup("ADMIN_USER_IDS") {
            Some(raw) => parse_id_list(&raw)?,
            None => Vec::new(),
        };

        let admin_role_name = lookup("ADMIN_ROLE_NAME").unwrap_or_else(|| "Currency Admin".to_string());

        let offer_ttl_secs: i64 = parse_or(&lookup, "OFFER_TTL_SECS", 600)?;
        if offer_ttl_secs <= 0 {
            return Err(ConfigError::Invalid {
                name: "OFFER_TTL_SECS",
                value: offer_ttl_secs.to_string(),
            });
        }

        let default_loan_amount: i64 = parse_or(&lookup, "DEFAULT_LOAN_AMOUNT", 100)?;
        if default_loan_amount < 0 {
            return Err(ConfigError::Invalid {
                name: "DEFAULT_LOAN_AMOUNT",
                value: default_loan_amount.to_string(),
            });
        }

        let interest_rate_per_hour: f64 = parse_or(&lookup, "INTEREST_RATE_PER_HOUR", 0.10)?;
        if !interest_rate_per_hour.is_finite() || interest_rate_per_hour < 0.0 {
            return Err(ConfigError::Invalid {
                name: "INTEREST_RATE_PER_HOUR",
                value: interest_rate_per_hour.to_string(),
            });
        }

        let interest_check_interval_secs: u64 = parse_or(&lookup, "INTEREST_CHECK_INTERVAL_SECS", 3600)?;
        if interest_check_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "INTEREST_CHECK_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }

        let ai_api_key = lookup("TOGETHER_API_KEY").filter(|key| !key.trim().is_empty());
        let ai_api_url = lookup("AI_API_URL").unwrap_or_else(|| DEFAULT_AI_API_URL.to_string());
        let ai_model = lookup("AI_MODEL").unwrap_or_else(|| DEFAULT_AI_MODEL.to_string());
        let ai_system_prompt = lookup("AI_SYSTEM_PROMPT")
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AI_SYSTEM_PROMPT.to_string());

        Ok(BotConfig {
            discord_token,
            database_url,
            ledger_key,
            admin_user_ids,
            admin_role_name,
            offer_ttl_secs,
            default_loan_amount,
            interest_rate_per_hour,
            interest_check_interval_secs,
            ai_api_key,
            ai_api_url,
            ai_model,
            ai_system_prompt,
        })
    }

    pub fn is_listed_admin(&self, user_id: u64) -> bool {
        self.admin_user_ids.contains(&user_id)
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}

fn parse_id_list(raw: &str) -> Result<Vec<u64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>().map_err(|_| ConfigError::Invalid {
                name: "ADMIN_USER_IDS",
                value: part.to_string(),
            })
        })
        .collect()
}
