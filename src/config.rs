// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Configuration loading and validation. Every setting is loaded from
//! the environment, matching the original's pydantic `Settings` field
//! set; validation rejects on first error and refuses to start.

use crate::error::ConfigError;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref USERNAME_PATTERN: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
    static ref HOSTNAME_PATTERN: Regex = Regex::new(r"^[A-Za-z0-9.-]+$").unwrap();
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub mail_user: String,
    pub mail_pass: String,
    pub mail_domain: String,
    pub upstream_server: String,
    pub upstream_user: String,
    pub upstream_pass: String,
    pub upstream_port: u16,
    pub fetch_interval: u64,
    pub rate_limit_per_minute: usize,
    pub max_retries: u32,
    pub lmtp_host: String,
    pub lmtp_port: u16,
    pub anthropic_api_key: String,
    pub anthropic_model: String,
    pub ai_timeout: u64,
    pub briefing_hour: u8,
    pub maildir_path: String,
    pub tz: String,
}

impl Settings {
    /// Loads every field from the environment (no file source — the
    /// original loads exclusively from env/`.env`), then validates.
    pub fn load() -> Result<Self, ConfigError> {
        let source = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;

        let settings = Settings {
            mail_user: required_string(&source, "mail_user")?,
            mail_pass: required_string(&source, "mail_pass")?,
            mail_domain: required_string(&source, "mail_domain")?,
            upstream_server: required_string(&source, "upstream_server")?,
            upstream_user: required_string(&source, "upstream_user")?,
            upstream_pass: required_string(&source, "upstream_pass")?,
            upstream_port: optional_int(&source, "upstream_port", 993)?,
            fetch_interval: optional_int(&source, "fetch_interval", 300)?,
            rate_limit_per_minute: optional_int(&source, "rate_limit_per_minute", 30)?,
            max_retries: optional_int(&source, "max_retries", 20)?,
            lmtp_host: optional_string(&source, "lmtp_host", "imap"),
            lmtp_port: optional_int(&source, "lmtp_port", 24)?,
            anthropic_api_key: required_string(&source, "anthropic_api_key")?,
            anthropic_model: optional_string(
                &source,
                "anthropic_model",
                "claude-sonnet-4-5-20250929",
            ),
            ai_timeout: optional_int(&source, "ai_timeout", 45)?,
            briefing_hour: optional_int(&source, "briefing_hour", 8)?,
            maildir_path: optional_string(&source, "maildir_path", "/var/mail"),
            tz: optional_string(&source, "tz", "US/Central"),
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_pattern("mail_user", &self.mail_user, &USERNAME_PATTERN)?;
        check_pattern("mail_domain", &self.mail_domain, &HOSTNAME_PATTERN)?;
        check_pattern("upstream_server", &self.upstream_server, &HOSTNAME_PATTERN)?;
        check_range("upstream_port", self.upstream_port as i64, 1, 65535)?;
        check_range("fetch_interval", self.fetch_interval as i64, 10, 3600)?;
        check_range(
            "rate_limit_per_minute",
            self.rate_limit_per_minute as i64,
            1,
            100,
        )?;
        check_range("max_retries", self.max_retries as i64, 1, 100)?;
        check_range("lmtp_port", self.lmtp_port as i64, 1, 65535)?;
        check_range("ai_timeout", self.ai_timeout as i64, 10, 120)?;
        check_range("briefing_hour", self.briefing_hour as i64, 0, 23)?;
        Ok(())
    }
}

fn required_string(source: &config::Config, key: &str) -> Result<String, ConfigError> {
    source
        .get_string(key)
        .map_err(|_| ConfigError::Missing(key.to_string()))
}

fn optional_string(source: &config::Config, key: &str, default: &str) -> String {
    source.get_string(key).unwrap_or_else(|_| default.to_string())
}

fn optional_int<T>(source: &config::Config, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Copy,
{
    match source.get_string(key) {
        Ok(raw) => raw.parse::<T>().map_err(|_| ConfigError::Invalid {
            field: key.to_string(),
            reason: format!("cannot parse '{}'", raw),
        }),
        Err(_) => Ok(default),
    }
}

fn check_pattern(field: &str, value: &str, pattern: &Regex) -> Result<(), ConfigError> {
    if pattern.is_match(value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field: field.to_string(),
            reason: format!("does not match required pattern {}", pattern.as_str()),
        })
    }
}

fn check_range(field: &str, value: i64, min: i64, max: i64) -> Result<(), ConfigError> {
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field: field.to_string(),
            reason: format!("must be between {} and {}", min, max),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_pattern_accepts_alnum_underscore_dash() {
        assert!(USERNAME_PATTERN.is_match("alice_1-2"));
        assert!(!USERNAME_PATTERN.is_match("alice@"));
    }

    #[test]
    fn hostname_pattern_accepts_dotted_names() {
        assert!(HOSTNAME_PATTERN.is_match("mail.example.com"));
        assert!(!HOSTNAME_PATTERN.is_match("mail/example"));
    }

    #[test]
    fn check_range_rejects_out_of_bounds() {
        assert!(check_range("x", 0, 1, 100).is_err());
        assert!(check_range("x", 50, 1, 100).is_ok());
    }
}
