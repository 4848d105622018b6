// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use clap::Parser;
use mailsentry::ai;
use mailsentry::prelude::*;

mod cli;

use cli::{Cli, Command};
use std::process::ExitCode;
use std::time::Duration;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let args = Cli::parse();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            error!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match args.command {
        Command::Scanner => run_scanner(settings).await,
        Command::Health => run_health(settings).await,
        Command::Briefing { .. } => {
            error!("briefing is not implemented in this build — it is an external collaborator");
            ExitCode::FAILURE
        }
    }
}

fn build_fetcher(settings: &Settings) -> ImapFetcher {
    ImapFetcher::new(
        settings.upstream_server.clone(),
        settings.upstream_port,
        settings.upstream_user.clone(),
        settings.upstream_pass.clone(),
    )
}

fn build_lmtp(settings: &Settings) -> LmtpDeliverer {
    LmtpDeliverer::new(settings.lmtp_host.clone(), settings.lmtp_port)
}

fn build_maildir(settings: &Settings) -> MaildirStore {
    MaildirStore::new(settings.maildir_path.clone(), settings.mail_user.clone())
}

fn build_classifier(settings: &Settings) -> ai::AiClassifier {
    ai::AiClassifier::new(
        settings.anthropic_api_key.clone(),
        settings.anthropic_model.clone(),
        Duration::from_secs(settings.ai_timeout),
        settings.rate_limit_per_minute,
    )
}

async fn run_scanner(settings: Settings) -> ExitCode {
    let maildir = build_maildir(&settings);
    let fetcher = build_fetcher(&settings);
    let lmtp = build_lmtp(&settings);
    let classifier = build_classifier(&settings);

    let mut processor = Processor::new(
        maildir,
        fetcher,
        lmtp,
        classifier,
        settings.max_retries,
        Duration::from_secs(settings.fetch_interval),
    );

    let shutdown = processor.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    });

    match processor.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("processor exited with error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_health(settings: Settings) -> ExitCode {
    let maildir = build_maildir(&settings);
    let lmtp = build_lmtp(&settings);
    let mut fetcher = build_fetcher(&settings);

    let connected = fetcher.connect().await.is_ok();
    // Snapshot health before disconnecting — disconnect() unconditionally
    // sets `connected = false`, which would otherwise make the probe
    // always look unreachable regardless of the connect() outcome.
    let imap_health = fetcher.health().clone();
    if connected {
        fetcher.disconnect().await;
    }

    let probe = HealthProbe::new(&maildir, &lmtp);
    let report = probe.check(imap_health).await;
    println!("{}", report);

    ExitCode::from(report.status.exit_code() as u8)
}
