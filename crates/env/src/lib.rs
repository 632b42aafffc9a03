use std::{env::var, str::FromStr, sync::Arc};

use dotenv::dotenv;
use eyre::{Context, Error};

#[derive(Clone)]
pub struct Env(Arc<EnvInner>);

#[derive(Clone)]
pub struct EnvInner {
    rust_log: String,
    transfer_expiry_days: u32,
    max_template_weeks: u32,
    default_currency: String,
    payment_provider: String,
    seed_demo: bool,
    dotenv_error: Option<String>,
}

impl Env {
    pub fn rust_log(&self) -> &str {
        &self.0.rust_log
    }

    pub fn transfer_expiry_days(&self) -> u32 {
        self.0.transfer_expiry_days
    }

    pub fn max_template_weeks(&self) -> u32 {
        self.0.max_template_weeks
    }

    pub fn default_currency(&self) -> &str {
        &self.0.default_currency
    }

    pub fn payment_provider(&self) -> &str {
        &self.0.payment_provider
    }

    pub fn seed_demo(&self) -> bool {
        self.0.seed_demo
    }

    /// Why `.env` was not loaded, if it was not.
    pub fn dotenv_error(&self) -> Option<&str> {
        self.0.dotenv_error.as_deref()
    }

    /// Reads the process environment, after loading `.env` if there is one.
    pub fn load() -> Result<Env, Error> {
        let dotenv_error = dotenv().err().map(|err| err.to_string());
        Self::read(dotenv_error)
    }

    fn read(dotenv_error: Option<String>) -> Result<Env, Error> {
        Ok(Env(Arc::new(EnvInner {
            rust_log: var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            transfer_expiry_days: parse_or("TRANSFER_EXPIRY_DAYS", 30)?,
            max_template_weeks: parse_or("MAX_TEMPLATE_WEEKS", 52)?,
            default_currency: var("DEFAULT_CURRENCY").unwrap_or_else(|_| "ARS".to_string()),
            payment_provider: var("PAYMENT_PROVIDER")
                .unwrap_or_else(|_| "mercadopago".to_string()),
            seed_demo: parse_or("SEED_DEMO", true)?,
            dotenv_error,
        })))
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T, Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, value)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or() {
        std::env::set_var("ENV_TEST_WEEKS", " 12 ");
        assert_eq!(parse_or("ENV_TEST_WEEKS", 52u32).unwrap(), 12);
        assert_eq!(parse_or("ENV_TEST_MISSING", 52u32).unwrap(), 52);
        std::env::set_var("ENV_TEST_FLAG", "maybe");
        assert!(parse_or("ENV_TEST_FLAG", true).is_err());
    }

    #[test]
    fn test_dotenv_error_is_kept_for_caller() {
        let env = Env::read(Some("path not found".to_string())).unwrap();
        assert_eq!(env.dotenv_error(), Some("path not found"));
        assert!(!env.rust_log().is_empty());

        let env = Env::read(None).unwrap();
        assert_eq!(env.dotenv_error(), None);
    }
}
