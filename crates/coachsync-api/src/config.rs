//! Process configuration, resolved once at startup.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use coachsync_airtable::{AirtableConfig, DEFAULT_API_URL};
use coachsync_core::config::{BackoffPolicy, EntityBackends, SyncConfig};
use coachsync_core::entity::EntityType;
use url::Url;

use crate::error::AppError;

/// Everything the server needs, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `PostgreSQL` connection URL.
    pub database_url: String,
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Spreadsheet store connection.
    pub airtable: AirtableConfig,
    /// Shared HMAC key for user webhooks.
    pub webhook_secret: String,
    /// Bearer token for operator endpoints. `None` disables them.
    pub admin_token: Option<String>,
    /// Dispatcher settings.
    pub sync: SyncConfig,
    /// OTLP collector endpoint. Trace export is off when unset.
    pub otlp_endpoint: Option<String>,
}

impl AppConfig {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// See [`Self::from_lookup`].
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from a variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first variable that is missing
    /// or cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let env = Env(&lookup);

        let host: IpAddr = env.parse_or("HOST", IpAddr::from([0, 0, 0, 0]))?;
        let port: u16 = env.parse_or("PORT", 3000)?;
        let bind_addr = SocketAddr::new(host, port);

        let api_url = env.or("AIRTABLE_API_URL", DEFAULT_API_URL);
        let api_url = Url::parse(&api_url)
            .map_err(|e| AppError::Config(format!("AIRTABLE_API_URL is not a URL: {e}")))?;
        let timeout = env.millis_or("AIRTABLE_TIMEOUT_MS", 10_000)?;
        let airtable = AirtableConfig {
            api_url,
            base_id: env.required("AIRTABLE_BASE_ID")?,
            api_key: env.required("AIRTABLE_API_KEY")?,
            timeout,
        };

        let defaults = SyncConfig::default();
        let backends = match env.get("POSTGRES_PRIMARY_ENTITIES") {
            Some(list) => parse_backends(&list)?,
            None => defaults.backends,
        };
        let sync = SyncConfig {
            max_retries: env.parse_or("OUTBOX_MAX_RETRIES", defaults.max_retries)?,
            backoff: BackoffPolicy {
                base: env.millis_or("OUTBOX_BACKOFF_BASE_MS", 2_000)?,
                max: env.millis_or("OUTBOX_BACKOFF_MAX_MS", 900_000)?,
                jitter: env.millis_or("OUTBOX_BACKOFF_JITTER_MS", 1_000)?,
            },
            poll_interval: env.millis_or("OUTBOX_POLL_INTERVAL_MS", 1_000)?,
            claim_timeout: env.millis_or("OUTBOX_CLAIM_TIMEOUT_MS", 300_000)?,
            external_call_timeout: timeout,
            write_timeout: env.millis_or("OUTBOX_WRITE_TIMEOUT_MS", 60_000)?,
            workers: env.parse_or("OUTBOX_WORKERS", defaults.workers)?,
            backends,
        };
        validate_timings(&sync)?;

        Ok(Self {
            database_url: env.required("DATABASE_URL")?,
            bind_addr,
            airtable,
            webhook_secret: env.required("USER_WEBHOOK_SECRET")?,
            admin_token: env.get("SYNC_ADMIN_TOKEN"),
            sync,
            otlp_endpoint: env.get("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }
}

fn validate_timings(sync: &SyncConfig) -> Result<(), AppError> {
    if sync.poll_interval.is_zero() {
        return Err(AppError::Config("OUTBOX_POLL_INTERVAL_MS must be greater than 0".into()));
    }
    if sync.claim_timeout.is_zero() {
        return Err(AppError::Config("OUTBOX_CLAIM_TIMEOUT_MS must be greater than 0".into()));
    }
    if sync.write_timeout <= sync.external_call_timeout {
        return Err(AppError::Config(format!(
            "OUTBOX_WRITE_TIMEOUT_MS ({}ms) must exceed AIRTABLE_TIMEOUT_MS ({}ms)",
            sync.write_timeout.as_millis(),
            sync.external_call_timeout.as_millis()
        )));
    }
    if sync.claim_timeout <= sync.write_timeout {
        return Err(AppError::Config(format!(
            "OUTBOX_CLAIM_TIMEOUT_MS ({}ms) must exceed OUTBOX_WRITE_TIMEOUT_MS ({}ms)",
            sync.claim_timeout.as_millis(),
            sync.write_timeout.as_millis()
        )));
    }
    Ok(())
}

fn parse_backends(list: &str) -> Result<EntityBackends, AppError> {
    let mut entity_types = Vec::new();
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let entity_type = EntityType::from_str(name)
            .map_err(|e| AppError::Config(format!("POSTGRES_PRIMARY_ENTITIES: {e}")))?;
        if !EntityType::OUTBOUND.contains(&entity_type) {
            return Err(AppError::Config(format!(
                "POSTGRES_PRIMARY_ENTITIES: {name} is not replicated outbound"
            )));
        }
        entity_types.push(entity_type);
    }
    Ok(EntityBackends::postgres_primary(entity_types))
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Blank values count as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_owned())
    }

    fn required(&self, key: &str) -> Result<String, AppError> {
        self.get(key)
            .ok_or_else(|| AppError::Config(format!("{key} environment variable must be set")))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, AppError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse()
                .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
            None => Ok(default),
        }
    }

    fn millis_or(&self, key: &str, default_ms: u64) -> Result<Duration, AppError> {
        self.parse_or(key, default_ms).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn required() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "postgres://localhost/coachsync"),
            ("AIRTABLE_API_KEY", "pat_test"),
            ("AIRTABLE_BASE_ID", "appTEST"),
            ("USER_WEBHOOK_SECRET", "whsec_test"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<AppConfig, AppError> {
        AppConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_owned()))
    }

    #[test]
    fn test_defaults_apply_when_only_required_vars_are_set() {
        let config = load(&required()).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.airtable.api_url.as_str(), DEFAULT_API_URL);
        assert_eq!(config.airtable.timeout, Duration::from_secs(10));
        assert_eq!(config.sync, SyncConfig::default());
        assert!(config.sync.write_timeout > config.sync.external_call_timeout);
        assert_eq!(config.admin_token, None);
        assert_eq!(config.otlp_endpoint, None);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let mut vars = required();
        vars.insert("PORT", "8080");
        vars.insert("OUTBOX_MAX_RETRIES", "3");
        vars.insert("OUTBOX_BACKOFF_BASE_MS", "500");
        vars.insert("OUTBOX_WORKERS", "4");
        vars.insert("AIRTABLE_TIMEOUT_MS", "2500");
        vars.insert("SYNC_ADMIN_TOKEN", "s3cret");
        vars.insert("POSTGRES_PRIMARY_ENTITIES", "program, method_usage");

        let config = load(&vars).unwrap();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync.backoff.base, Duration::from_millis(500));
        assert_eq!(config.sync.workers, 4);
        assert_eq!(config.sync.external_call_timeout, Duration::from_millis(2500));
        assert_eq!(config.admin_token.as_deref(), Some("s3cret"));
        assert!(config.sync.backends.is_postgres_primary(EntityType::MethodUsage));
        assert!(!config.sync.backends.is_postgres_primary(EntityType::User));
    }

    #[test]
    fn test_missing_required_variable_is_named() {
        let mut vars = required();
        vars.remove("USER_WEBHOOK_SECRET");

        let err = load(&vars).unwrap_err();

        assert!(err.to_string().contains("USER_WEBHOOK_SECRET"));
    }

    #[test]
    fn test_blank_admin_token_disables_operator_endpoints() {
        let mut vars = required();
        vars.insert("SYNC_ADMIN_TOKEN", "   ");

        assert_eq!(load(&vars).unwrap().admin_token, None);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let mut vars = required();
        vars.insert("OUTBOX_MAX_RETRIES", "many");

        assert!(matches!(load(&vars), Err(AppError::Config(_))));
    }

    #[test]
    fn test_ipv6_host_is_accepted() {
        let mut vars = required();
        vars.insert("HOST", "::");
        vars.insert("PORT", "8080");

        let config = load(&vars).unwrap();

        assert_eq!(config.bind_addr, "[::]:8080".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_hostname_is_rejected() {
        let mut vars = required();
        vars.insert("HOST", "localhost");

        let err = load(&vars).unwrap_err();

        assert!(err.to_string().contains("HOST"));
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let mut vars = required();
        vars.insert("OUTBOX_POLL_INTERVAL_MS", "0");

        let err = load(&vars).unwrap_err();

        assert!(err.to_string().contains("OUTBOX_POLL_INTERVAL_MS"));
    }

    #[test]
    fn test_zero_claim_timeout_is_rejected() {
        let mut vars = required();
        vars.insert("OUTBOX_CLAIM_TIMEOUT_MS", "0");

        let err = load(&vars).unwrap_err();

        assert!(err.to_string().contains("OUTBOX_CLAIM_TIMEOUT_MS"));
    }

    #[test]
    fn test_write_budget_must_exceed_per_call_timeout() {
        let mut vars = required();
        vars.insert("AIRTABLE_TIMEOUT_MS", "30000");
        vars.insert("OUTBOX_WRITE_TIMEOUT_MS", "30000");

        let err = load(&vars).unwrap_err();

        assert!(err.to_string().contains("OUTBOX_WRITE_TIMEOUT_MS"));
    }

    #[test]
    fn test_claim_timeout_must_exceed_write_budget() {
        let mut vars = required();
        vars.insert("OUTBOX_CLAIM_TIMEOUT_MS", "60000");

        let err = load(&vars).unwrap_err();

        assert!(err.to_string().contains("OUTBOX_CLAIM_TIMEOUT_MS"));
    }

    #[test]
    fn test_catalog_type_cannot_be_postgres_primary() {
        let mut vars = required();
        vars.insert("POSTGRES_PRIMARY_ENTITIES", "program,method");

        assert!(matches!(load(&vars), Err(AppError::Config(_))));
    }
}
