// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! CLI surface (external collaborator, described for completeness in
//! spec.md §6). `scanner` runs the processor to completion; `health` runs
//! the probe once and exits 0/1/2; `briefing` is accepted for CLI-shape
//! completeness but is not implemented in this build — the HTML briefing
//! renderer is an out-of-scope external collaborator.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "mailsentry", about = "Fetch, classify, and deliver or quarantine mail")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the fetch -> classify -> deliver/quarantine processor.
    Scanner,
    /// Generate or schedule the daily briefing. Not implemented in this
    /// build.
    Briefing {
        #[arg(long)]
        now: bool,
        #[arg(long)]
        schedule: bool,
    },
    /// Run the health probe once and exit 0 (healthy), 1 (warning), or
    /// 2 (critical).
    Health,
}
