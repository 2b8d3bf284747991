use crate::domain::Decimal;
use crate::engine::GameRules;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub market_data_url: String,
    pub market_symbols: Vec<String>,
    pub candle_interval: String,
    pub candle_count: u32,
    pub market_history_start_ms: i64,
    pub initial_reveal: usize,
    pub starting_balance: Decimal,
    pub next_day_uses: u32,
    pub guest_next_day_uses: u32,
    pub default_retry_tokens: i64,
    pub daily_token_floor: i64,
    pub max_leverage: u32,
    pub referral_reward: i64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Parse `key` with a default, failing with `InvalidValue` on garbage.
fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
    expected: &str,
) -> Result<T, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), format!("must be {}", expected)))
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or::<u16>(&env_map, "PORT", "8080", "a valid u16")?;
        let database_path = required(&env_map, "DATABASE_PATH")?;
        let market_data_url = required(&env_map, "MARKET_DATA_URL")?;

        let market_symbols: Vec<String> = env_map
            .get("MARKET_SYMBOLS")
            .map(|s| s.as_str())
            .unwrap_or("BTCUSDT")
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if market_symbols.is_empty() {
            return Err(ConfigError::InvalidValue(
                "MARKET_SYMBOLS".to_string(),
                "must list at least one symbol".to_string(),
            ));
        }

        let candle_interval = env_map
            .get("CANDLE_INTERVAL")
            .cloned()
            .unwrap_or_else(|| "1d".to_string());
        if crate::datasource::klines::parse_interval_ms(&candle_interval).is_none() {
            return Err(ConfigError::InvalidValue(
                "CANDLE_INTERVAL".to_string(),
                format!("must look like 15m, 4h, 1d or 1w, got {}", candle_interval),
            ));
        }

        let candle_count = parse_or::<u32>(&env_map, "CANDLE_COUNT", "120", "a positive integer")?;
        if candle_count == 0 {
            return Err(ConfigError::InvalidValue(
                "CANDLE_COUNT".to_string(),
                "must be a positive integer".to_string(),
            ));
        }

        let market_history_start_ms = parse_or::<i64>(
            &env_map,
            "MARKET_HISTORY_START_MS",
            "1577836800000",
            "a valid i64",
        )?;
        let initial_reveal = parse_or::<usize>(&env_map, "INITIAL_REVEAL", "60", "a valid usize")?;

        let starting_balance = env_map
            .get("STARTING_BALANCE")
            .map(|s| s.as_str())
            .unwrap_or("1000");
        let starting_balance = Decimal::from_str_canonical(starting_balance)
            .ok()
            .filter(|d| d.is_positive())
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "STARTING_BALANCE".to_string(),
                    "must be a positive decimal".to_string(),
                )
            })?;

        let next_day_uses = parse_or::<u32>(&env_map, "NEXT_DAY_USES", "15", "a valid u32")?;
        let guest_next_day_uses =
            parse_or::<u32>(&env_map, "GUEST_NEXT_DAY_USES", "7", "a valid u32")?;
        let default_retry_tokens =
            parse_or::<u32>(&env_map, "DEFAULT_RETRY_TOKENS", "3", "a non-negative integer")?;
        let daily_token_floor =
            parse_or::<u32>(&env_map, "DAILY_TOKEN_FLOOR", "3", "a non-negative integer")?;

        let max_leverage = parse_or::<u32>(&env_map, "MAX_LEVERAGE", "100", "an integer >= 1")?;
        if max_leverage == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_LEVERAGE".to_string(),
                "must be an integer >= 1".to_string(),
            ));
        }

        let referral_reward = parse_or::<u32>(&env_map, "REFERRAL_REWARD", "3", "a positive integer")?;
        if referral_reward == 0 {
            return Err(ConfigError::InvalidValue(
                "REFERRAL_REWARD".to_string(),
                "must be a positive integer".to_string(),
            ));
        }

        Ok(Config {
            port,
            database_path,
            market_data_url,
            market_symbols,
            candle_interval,
            candle_count,
            market_history_start_ms,
            initial_reveal,
            starting_balance,
            next_day_uses,
            guest_next_day_uses,
            default_retry_tokens: i64::from(default_retry_tokens),
            daily_token_floor: i64::from(daily_token_floor),
            max_leverage,
            referral_reward: i64::from(referral_reward),
        })
    }

    /// Round parameters handed to the engine.
    pub fn rules(&self) -> GameRules {
        GameRules {
            starting_balance: self.starting_balance,
            next_day_uses: self.next_day_uses,
            guest_next_day_uses: self.guest_next_day_uses,
            max_leverage: self.max_leverage,
            initial_reveal: self.initial_reveal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map.insert(
            "MARKET_DATA_URL".to_string(),
            "https://api.binance.com".to_string(),
        );
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.market_symbols, vec!["BTCUSDT".to_string()]);
        assert_eq!(config.candle_interval, "1d");
        assert_eq!(config.candle_count, 120);
        assert_eq!(config.default_retry_tokens, 3);
        assert_eq!(config.referral_reward, 3);
        assert_eq!(config.rules(), GameRules::default());
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_market_data_url() {
        let mut env_map = setup_required_env();
        env_map.remove("MARKET_DATA_URL");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "MARKET_DATA_URL"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_symbols_are_trimmed_and_uppercased() {
        let mut env_map = setup_required_env();
        env_map.insert("MARKET_SYMBOLS".to_string(), " btcusdt, ETHUSDT ,,".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.market_symbols, vec!["BTCUSDT", "ETHUSDT"]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for (key, value) in [
            ("MARKET_SYMBOLS", " , "),
            ("CANDLE_INTERVAL", "2y"),
            ("CANDLE_COUNT", "0"),
            ("STARTING_BALANCE", "-5"),
            ("MAX_LEVERAGE", "0"),
            ("REFERRAL_REWARD", "0"),
            ("DEFAULT_RETRY_TOKENS", "-1"),
        ] {
            let mut env_map = setup_required_env();
            env_map.insert(key.to_string(), value.to_string());
            match Config::from_env_map(env_map) {
                Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, key),
                other => panic!("Expected InvalidValue for {}, got {:?}", key, other),
            }
        }
    }
}
