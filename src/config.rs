use std::{collections::HashMap, env, str::FromStr, time::Duration};

use chrono::{FixedOffset, NaiveTime};
use thiserror::Error;

use crate::attendance::policy::LatenessPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    MySql,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: String,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub run_migrations: bool,

    pub jwt_secret: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_scan_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    pub lateness: LatenessPolicy,
    pub report_max_range_days: u32,

    pub identity_cache_capacity: u64,
    pub identity_cache_ttl: Duration,

    pub log_dir: String,
    pub log_level: tracing::Level,

    /// Admin account created at startup when no user of that name exists.
    pub bootstrap_admin: Option<(String, String)>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str, default: &str| -> String {
            lookup(key).unwrap_or_else(|| default.to_string())
        };

        let store_backend = match get("STORE_BACKEND", "mysql").to_ascii_lowercase().as_str() {
            "mysql" => StoreBackend::MySql,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    key: "STORE_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        let database_url = lookup("DATABASE_URL");
        if store_backend == StoreBackend::MySql && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let default_cutoff = parse_time("ATTENDANCE_CUTOFF", &get("ATTENDANCE_CUTOFF", "09:00"))?;
        let cohort_cutoffs =
            parse_cohort_cutoffs(&get("ATTENDANCE_COHORT_CUTOFFS", ""))?;
        let offset = parse_offset(&get("ATTENDANCE_UTC_OFFSET", "+00:00"))?;

        Ok(Self {
            server_addr: get("SERVER_ADDR", "127.0.0.1:8080"),
            store_backend,
            database_url,
            run_migrations: parse("RUN_MIGRATIONS", &get("RUN_MIGRATIONS", "false"))?,

            jwt_secret: lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,
            access_token_ttl: parse("ACCESS_TOKEN_TTL", &get("ACCESS_TOKEN_TTL", "900"))?, // default 15 min
            refresh_token_ttl: parse("REFRESH_TOKEN_TTL", &get("REFRESH_TOKEN_TTL", "604800"))?, // default 7 days

            rate_login_per_min: parse("RATE_LOGIN_PER_MIN", &get("RATE_LOGIN_PER_MIN", "60"))?,
            rate_scan_per_min: parse("RATE_SCAN_PER_MIN", &get("RATE_SCAN_PER_MIN", "600"))?,
            rate_protected_per_min: parse(
                "RATE_PROTECTED_PER_MIN",
                &get("RATE_PROTECTED_PER_MIN", "1000"),
            )?,

            api_prefix: get("API_PREFIX", "/api"),

            lateness: LatenessPolicy::new(default_cutoff, offset).with_cohort_cutoffs(cohort_cutoffs),
            report_max_range_days: parse(
                "REPORT_MAX_RANGE_DAYS",
                &get("REPORT_MAX_RANGE_DAYS", "31"),
            )?,

            identity_cache_capacity: parse(
                "IDENTITY_CACHE_CAPACITY",
                &get("IDENTITY_CACHE_CAPACITY", "10000"),
            )?,
            identity_cache_ttl: Duration::from_secs(parse(
                "IDENTITY_CACHE_TTL_SECS",
                &get("IDENTITY_CACHE_TTL_SECS", "300"),
            )?),

            log_dir: get("LOG_DIR", "logs"),
            log_level: parse("LOG_LEVEL", &get("LOG_LEVEL", "debug"))?,

            bootstrap_admin: lookup("BOOTSTRAP_ADMIN_USERNAME")
                .zip(lookup("BOOTSTRAP_ADMIN_PASSWORD")),
        })
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

fn parse_time(key: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

/// `"12=08:30,14=09:15"` -> {12: 08:30, 14: 09:15}
fn parse_cohort_cutoffs(value: &str) -> Result<HashMap<u64, NaiveTime>, ConfigError> {
    let invalid = || ConfigError::Invalid {
        key: "ATTENDANCE_COHORT_CUTOFFS",
        value: value.to_string(),
    };

    value
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (cohort, time) = pair.split_once('=').ok_or_else(invalid)?;
            let cohort = cohort.trim().parse::<u64>().map_err(|_| invalid())?;
            let time = NaiveTime::parse_from_str(time.trim(), "%H:%M").map_err(|_| invalid())?;
            Ok((cohort, time))
        })
        .collect()
}

/// `"+01:00"`, `"-05:30"` or `"Z"`.
fn parse_offset(value: &str) -> Result<FixedOffset, ConfigError> {
    let value = value.trim();
    let invalid = || ConfigError::Invalid {
        key: "ATTENDANCE_UTC_OFFSET",
        value: value.to_string(),
    };

    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, rest) = match value.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use testresult::TestResult;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_for_memory_backend() -> TestResult {
        let config = Config::from_lookup(lookup(&[
            ("STORE_BACKEND", "memory"),
            ("JWT_SECRET", "secret"),
        ]))?;

        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.server_addr, "127.0.0.1:8080");
        assert_eq!(config.access_token_ttl, 900);
        assert_eq!(config.api_prefix, "/api");
        assert_eq!(config.report_max_range_days, 31);
        assert_eq!(config.lateness.default_cutoff(), NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(config.log_level, tracing::Level::DEBUG);
        Ok(())
    }

    #[test]
    fn mysql_backend_requires_database_url() {
        let result = Config::from_lookup(lookup(&[("JWT_SECRET", "secret")]));
        assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))));
    }

    #[test]
    fn missing_jwt_secret_is_reported() {
        let result = Config::from_lookup(lookup(&[("STORE_BACKEND", "memory")]));
        assert!(matches!(result, Err(ConfigError::Missing("JWT_SECRET"))));
    }

    #[test]
    fn invalid_cutoff_names_the_key() {
        let result = Config::from_lookup(lookup(&[
            ("STORE_BACKEND", "memory"),
            ("JWT_SECRET", "secret"),
            ("ATTENDANCE_CUTOFF", "9h"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { key: "ATTENDANCE_CUTOFF", .. })
        ));
    }

    #[test]
    fn cohort_cutoffs_parse() -> TestResult {
        let cutoffs = parse_cohort_cutoffs(" 12=08:30, 14=09:15 ,")?;
        assert_eq!(cutoffs.len(), 2);
        assert_eq!(cutoffs.get(&12), NaiveTime::from_hms_opt(8, 30, 0).as_ref());

        assert!(parse_cohort_cutoffs("12:08:30").is_err());
        assert!(parse_cohort_cutoffs("").map(|c| c.is_empty()).unwrap_or(false));
        Ok(())
    }

    #[test]
    fn offsets_parse() -> TestResult {
        assert_eq!(parse_offset("+01:00")?.local_minus_utc(), 3600);
        assert_eq!(parse_offset("-05:30")?.local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert_eq!(parse_offset("Z")?.local_minus_utc(), 0);
        assert!(parse_offset("01:00").is_err());
        assert!(parse_offset("+25:00").is_err());
        Ok(())
    }
}
