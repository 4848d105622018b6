// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! LMTP Deliverer (C4): drives the LMTP dialogue explicitly over a plain
//! TCP socket, rather than through an SMTP-crate abstraction — no
//! dependency in this crate's stack speaks LMTP (RFC 2033).

use crate::error::DeliveryError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

const DELIVER_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Success,
    TemporaryFailure,
}

pub struct LmtpDeliverer {
    host: String,
    port: u16,
}

impl LmtpDeliverer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Drives the full LHLO/MAIL FROM/RCPT TO/DATA dialogue. Envelope
    /// sender is always empty (`<>`), required for system-originated
    /// messages and bounce-safety.
    pub async fn deliver(
        &self,
        raw: &[u8],
        recipient: &str,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        timeout(DELIVER_TIMEOUT, self.deliver_inner(raw, recipient))
            .await
            .unwrap_or_else(|_| Ok(DeliveryOutcome::TemporaryFailure))
    }

    async fn deliver_inner(
        &self,
        raw: &[u8],
        recipient: &str,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| DeliveryError::Temporary(format!("connect failed: {}", e)))?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        // Greeting, implicit on connect.
        read_response(&mut reader).await?;

        write_line(&mut write_half, &format!("LHLO {}", self.host)).await?;
        let (code, _) = read_response(&mut reader).await?;
        expect(code, &[220, 250])?;

        write_line(&mut write_half, "MAIL FROM:<>").await?;
        let (code, _) = read_response(&mut reader).await?;
        expect(code, &[250])?;

        write_line(&mut write_half, &format!("RCPT TO:<{}>", recipient)).await?;
        let (code, text) = read_response(&mut reader).await?;
        if let Err(e) = classify(code, &text) {
            let _ = quit(&mut reader, &mut write_half).await;
            return match e {
                DeliveryError::Permanent(_) => Err(e),
                DeliveryError::Temporary(_) => Ok(DeliveryOutcome::TemporaryFailure),
            };
        }

        write_line(&mut write_half, "DATA").await?;
        let (code, _) = read_response(&mut reader).await?;
        expect(code, &[354])?;

        let mut payload = raw.to_vec();
        if !payload.ends_with(b"\r\n") {
            payload.extend_from_slice(b"\r\n");
        }
        payload.extend_from_slice(b".\r\n");
        write_half
            .write_all(&payload)
            .await
            .map_err(|e| DeliveryError::Temporary(format!("write failed: {}", e)))?;

        let (code, text) = read_response(&mut reader).await?;
        match classify(code, &text) {
            Ok(()) => {
                // The message is already committed by the prior 250/251;
                // if QUIT desyncs the state machine, closing the socket
                // is sufficient.
                let _ = quit(&mut reader, &mut write_half).await;
                Ok(DeliveryOutcome::Success)
            }
            Err(DeliveryError::Permanent(msg)) => {
                let _ = quit(&mut reader, &mut write_half).await;
                Err(DeliveryError::Permanent(msg))
            }
            Err(DeliveryError::Temporary(_)) => {
                let _ = quit(&mut reader, &mut write_half).await;
                Ok(DeliveryOutcome::TemporaryFailure)
            }
        }
    }

    /// TCP-connects, reads the greeting, quits. 5 s timeout. Used by the
    /// health probe.
    pub async fn check_connectivity(&self) -> bool {
        timeout(CONNECTIVITY_TIMEOUT, self.check_connectivity_inner())
            .await
            .unwrap_or(false)
    }

    async fn check_connectivity_inner(&self) -> bool {
        let Ok(stream) = TcpStream::connect((self.host.as_str(), self.port)).await else {
            return false;
        };
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        if read_response(&mut reader).await.is_err() {
            return false;
        }
        let _ = quit(&mut reader, &mut write_half).await;
        true
    }
}

async fn write_line(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    line: &str,
) -> Result<(), DeliveryError> {
    write_half
        .write_all(format!("{}\r\n", line).as_bytes())
        .await
        .map_err(|e| DeliveryError::Temporary(format!("write failed: {}", e)))
}

/// Reads one SMTP/LMTP response, draining `250-...` continuation lines
/// until the final `250 ...` line.
async fn read_response(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
) -> Result<(u16, String), DeliveryError> {
    let mut last_line = String::new();
    loop {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(|e| DeliveryError::Temporary(format!("read failed: {}", e)))?;
        if n == 0 {
            return Err(DeliveryError::Temporary("connection closed".to_string()));
        }
        let trimmed = line.trim_end().to_string();
        let is_continuation = trimmed.as_bytes().get(3) == Some(&b'-');
        last_line = trimmed;
        if !is_continuation {
            break;
        }
    }

    let code: u16 = last_line
        .get(..3)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| DeliveryError::Temporary(format!("malformed response: {}", last_line)))?;
    Ok((code, last_line))
}

/// Validates a response code against the codes the dialogue step expects.
/// A 5xx outside the expected set is permanent; a 4xx is temporary;
/// anything else unexpected is treated as temporary (retry-eligible).
fn expect(code: u16, allowed: &[u16]) -> Result<(), DeliveryError> {
    if allowed.contains(&code) {
        return Ok(());
    }
    match code / 100 {
        5 => Err(DeliveryError::Permanent(format!(
            "unexpected response code {}",
            code
        ))),
        _ => Err(DeliveryError::Temporary(format!(
            "unexpected response code {}",
            code
        ))),
    }
}

/// Outcome classification for the RCPT TO / final DATA response:
/// 5xx -> permanent, 4xx -> temporary, 2xx -> success.
fn classify(code: u16, text: &str) -> Result<(), DeliveryError> {
    match code / 100 {
        2 => Ok(()),
        5 => Err(DeliveryError::Permanent(text.to_string())),
        _ => Err(DeliveryError::Temporary(text.to_string())),
    }
}

async fn quit(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
) -> Result<(), DeliveryError> {
    write_line(write_half, "QUIT").await?;
    let _ = read_response(reader).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_2xx_is_ok() {
        assert!(classify(250, "ok").is_ok());
        assert!(classify(251, "ok").is_ok());
    }

    #[test]
    fn classify_5xx_is_permanent() {
        match classify(550, "rejected") {
            Err(DeliveryError::Permanent(_)) => {}
            other => panic!("expected Permanent, got {:?}", other),
        }
    }

    #[test]
    fn classify_4xx_is_temporary() {
        match classify(451, "try later") {
            Err(DeliveryError::Temporary(_)) => {}
            other => panic!("expected Temporary, got {:?}", other),
        }
    }
}
