// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! AI Classifier (C5): rate-limited caller of the external judge. Parses
//! a strict single-line verdict and fails closed on any anomaly.

pub mod prompt;
pub mod rate_limiter;

use crate::error::JudgeError;
use crate::message::ParsedMessage;
use lazy_static::lazy_static;
use rate_limiter::RateLimiter;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_RESPONSE_TOKENS: u32 = 100;
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_SECS: u64 = 2;

lazy_static! {
    static ref VERDICT_PATTERN: Regex =
        Regex::new(r"^(SAFE|QUARANTINE)\|([A-Za-z0-9 ,.\-]{1,80})$").unwrap();
}

/// A sum: `Safe{reason}` | `Quarantine{reason}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Safe { reason: String },
    Quarantine { reason: String },
}

impl ScanVerdict {
    pub fn reason(&self) -> &str {
        match self {
            ScanVerdict::Safe { reason } | ScanVerdict::Quarantine { reason } => reason,
        }
    }

    pub fn is_safe(&self) -> bool {
        matches!(self, ScanVerdict::Safe { .. })
    }
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct AnthropicMessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicMessagesResponse {
    content: Vec<AnthropicContent>,
}

pub struct AiClassifier {
    api_key: String,
    model: String,
    timeout: Duration,
    http_client: reqwest::Client,
    rate_limiter: RateLimiter,
}

impl AiClassifier {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        rate_limit_per_minute: usize,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            timeout,
            http_client: reqwest::Client::new(),
            rate_limiter: RateLimiter::new(rate_limit_per_minute),
        }
    }

    /// Acquires one token from the rate limiter, builds the judge prompt
    /// from sanitized fields, calls the external judge, and parses the
    /// response. Fail-closed: every anomaly maps to `QUARANTINE`.
    pub async fn classify(&self, parsed: &ParsedMessage) -> ScanVerdict {
        self.rate_limiter.acquire().await;

        let prompt = prompt::build_scan_prompt(
            &parsed.from,
            &parsed.to,
            parsed.reply_to.as_deref().unwrap_or(""),
            &parsed.subject,
            &parsed.body_preview,
        );

        match self.call_with_retry(&prompt).await {
            Ok(text) => parse_verdict(&text),
            Err(e) => ScanVerdict::Quarantine {
                reason: fail_closed_reason(&e),
            },
        }
    }

    /// Up to 3 attempts with exponential backoff (2s, 4s, 8s), only for
    /// transport-level timeout and connection faults. Other error classes
    /// do not retry.
    async fn call_with_retry(&self, prompt: &str) -> Result<String, JudgeError> {
        let mut delay = RETRY_BASE_SECS;
        let mut last_err = JudgeError::Transport("no attempts made".to_string());

        for attempt in 1..=RETRY_ATTEMPTS {
            match self.call_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(e @ (JudgeError::Timeout | JudgeError::Transport(_))) => {
                    last_err = e;
                    if attempt == RETRY_ATTEMPTS {
                        break;
                    }
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }

    async fn call_once(&self, prompt: &str) -> Result<String, JudgeError> {
        let request = AnthropicMessagesRequest {
            model: self.model.clone(),
            max_tokens: MAX_RESPONSE_TOKENS,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt.to_string(),
            }],
        };

        let response = self
            .http_client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    JudgeError::Timeout
                } else {
                    JudgeError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            if status.as_u16() == 429 {
                return Err(JudgeError::RateLimited);
            }
            return Err(JudgeError::ApiStatus(format!(
                "judge returned status {}",
                status
            )));
        }

        let body: AnthropicMessagesResponse = response
            .json()
            .await
            .map_err(|e| JudgeError::Malformed(e.to_string()))?;

        let first = body
            .content
            .first()
            .ok_or_else(|| JudgeError::Malformed("empty content".to_string()))?;

        if first.content_type != "text" {
            return Err(JudgeError::UnexpectedContent);
        }

        first
            .text
            .clone()
            .ok_or_else(|| JudgeError::Malformed("missing text field".to_string()))
    }
}

/// Scans the trimmed response line-by-line; the first line matching the
/// verdict grammar wins. Any ambiguity falls back to `QUARANTINE` with
/// reason "Invalid AI response format".
fn parse_verdict(response: &str) -> ScanVerdict {
    for line in response.trim().lines() {
        let line = line.trim();
        if let Some(captures) = VERDICT_PATTERN.captures(line) {
            let verdict = &captures[1];
            let reason = captures[2].to_string();
            return match verdict {
                "SAFE" => ScanVerdict::Safe { reason },
                _ => ScanVerdict::Quarantine { reason },
            };
        }
    }
    ScanVerdict::Quarantine {
        reason: "Invalid AI response format".to_string(),
    }
}

fn fail_closed_reason(err: &JudgeError) -> String {
    let (prefix, detail): (&str, String) = match err {
        JudgeError::RateLimited => ("Rate limit error", String::new()),
        JudgeError::Timeout => ("AI API timeout", String::new()),
        JudgeError::Transport(msg) => ("AI API error", msg.clone()),
        JudgeError::ApiStatus(msg) => ("AI API error", msg.clone()),
        JudgeError::Malformed(msg) => ("Analysis failed", msg.clone()),
        JudgeError::UnexpectedContent => ("Analysis failed", "unexpected content type".to_string()),
    };
    let reason = if detail.is_empty() {
        prefix.to_string()
    } else {
        format!("{}: {}", prefix, detail)
    };
    sanitize_reason(&reason)
}

/// Reasons must be 1-80 chars over `[A-Za-z0-9 ,.\-]`, matching the
/// verdict grammar's own constraint even for synthesized reasons.
fn sanitize_reason(reason: &str) -> String {
    let cleaned: String = reason
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == ' ' || c == ',' || c == '.' || c == '-' {
                c
            } else {
                ' '
            }
        })
        .collect();
    let trimmed: String = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    trimmed.chars().take(80).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_safe_verdict() {
        let v = parse_verdict("SAFE|Legitimate newsletter");
        assert_eq!(
            v,
            ScanVerdict::Safe {
                reason: "Legitimate newsletter".to_string()
            }
        );
    }

    #[test]
    fn parses_quarantine_verdict() {
        let v = parse_verdict("QUARANTINE|Typosquatting domain");
        assert_eq!(
            v,
            ScanVerdict::Quarantine {
                reason: "Typosquatting domain".to_string()
            }
        );
    }

    #[test]
    fn malformed_response_fails_closed() {
        let v = parse_verdict("I think this is probably fine.");
        assert_eq!(
            v,
            ScanVerdict::Quarantine {
                reason: "Invalid AI response format".to_string()
            }
        );
    }

    #[test]
    fn picks_first_matching_line_among_several() {
        let v = parse_verdict("some preamble\nSAFE|Looks fine\nnoise after");
        assert_eq!(
            v,
            ScanVerdict::Safe {
                reason: "Looks fine".to_string()
            }
        );
    }

    #[test]
    fn fail_closed_reason_stays_within_grammar() {
        let reason = fail_closed_reason(&JudgeError::Transport("connection reset!!".to_string()));
        assert!(reason.len() <= 80);
        assert!(reason
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == ',' || c == '.' || c == '-'));
    }

    #[test]
    fn rate_limited_fails_closed_with_dedicated_reason() {
        let v = parse_verdict("");
        assert!(!v.is_safe());
        let reason = fail_closed_reason(&JudgeError::RateLimited);
        assert_eq!(reason, "Rate limit error");
    }

    #[test]
    fn rate_limited_and_api_status_are_excluded_from_retry() {
        // Only Timeout/Transport are retry-eligible in call_with_retry; RateLimited
        // and ApiStatus (429 / other non-2xx judge responses) must fail closed on
        // the first attempt instead of being retried as transport faults.
        fn is_retryable(e: &JudgeError) -> bool {
            matches!(e, JudgeError::Timeout | JudgeError::Transport(_))
        }
        assert!(!is_retryable(&JudgeError::RateLimited));
        assert!(!is_retryable(&JudgeError::ApiStatus("429".to_string())));
        assert!(is_retryable(&JudgeError::Timeout));
    }
}
