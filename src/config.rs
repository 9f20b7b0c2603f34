use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};

pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub allow_self_voting: bool,
    pub storage_timeout: Duration,
}

impl Config {
    /// Reads `EASYVOTE_*` variables. Call `dotenv::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("EASYVOTE_DATABASE_URL").context("expected EASYVOTE_DATABASE_URL")?,
            max_connections: try_load("EASYVOTE_MAX_CONNECTIONS", 5)?,
            allow_self_voting: try_load("EASYVOTE_ALLOW_SELF_VOTING", false)?,
            storage_timeout: Duration::from_millis(try_load("EASYVOTE_STORAGE_TIMEOUT_MS", 5000)?),
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: Display,
{
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(v) => v.trim().parse().map_err(|e| anyhow!("{} is invalid: {}", key, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_values_fall_back_to_defaults() {
        assert_eq!(try_load("EASYVOTE_TEST_UNSET_KEY", 7u32).unwrap(), 7);
    }

    #[test]
    fn malformed_values_are_reported() {
        env::set_var("EASYVOTE_TEST_BAD_BOOL", "maybe");

        let err = try_load("EASYVOTE_TEST_BAD_BOOL", false).unwrap_err();
        assert!(err.to_string().contains("EASYVOTE_TEST_BAD_BOOL is invalid"));

        env::set_var("EASYVOTE_TEST_GOOD_BOOL", " true ");
        assert!(try_load("EASYVOTE_TEST_GOOD_BOOL", false).unwrap());
    }
}
