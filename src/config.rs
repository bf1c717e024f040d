use std::str::FromStr;

use anyhow::Context;

use crate::chat::SessionLimits;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: String,
    pub cors_origin: String,
    pub hub_capacity: usize,
    pub limits: SessionLimits,
}

impl Settings {
    /// Reads settings from the environment, after loading `.env` if present.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let defaults = SessionLimits::default();
        Ok(Self {
            database_url: dotenv::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:3200".to_owned())?,
            cors_origin: var_or("CORS_ORIGIN", "http://localhost:3000".to_owned())?,
            hub_capacity: positive(var_or("HUB_CAPACITY", 64)?, "HUB_CAPACITY")?,
            limits: SessionLimits {
                outbox_capacity: positive(var_or("OUTBOX_CAPACITY", defaults.outbox_capacity)?, "OUTBOX_CAPACITY")?,
                max_message_len: positive(var_or("MAX_MESSAGE_LEN", defaults.max_message_len)?, "MAX_MESSAGE_LEN")?,
            },
        })
    }
}

fn var_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match dotenv::var(key) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("invalid {key}: {value:?}")),
        Err(_) => Ok(default),
    }
}

// tokio channels panic on a zero capacity
fn positive(value: usize, key: &str) -> anyhow::Result<usize> {
    anyhow::ensure!(value > 0, "{key} must be greater than zero");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default() {
        let value: usize = var_or("TEMUKA_SURELY_UNSET_VARIABLE", 12).unwrap();
        assert_eq!(value, 12);
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(positive(0, "OUTBOX_CAPACITY").is_err());
        assert_eq!(positive(3, "OUTBOX_CAPACITY").unwrap(), 3);
    }
}
