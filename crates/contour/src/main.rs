// Contour - Execution Trace Reconstruction
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Contour - execution trace reconstruction
//!
//! Imports recorded execution logs into an execution model and reports on the
//! reconstructed trace.

use clap::{Parser, Subcommand};
use eyre::Result;

mod cmd;

/// Command-line interface for Contour
#[derive(Debug, Parser)]
#[command(name = "contour")]
#[command(about = "Contour - reconstructs execution traces and contours from recorded logs")]
#[command(version)]
pub struct Cli {
    /// Also write debug logs to a daily-rotated file under the temp directory
    #[arg(long, global = true)]
    pub log_file: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import a recorded trace log and summarize the reconstructed model
    Import(cmd::ImportArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    contour_common::logging::init_logging("contour", cli.log_file)?;

    match &cli.command {
        Commands::Import(args) => cmd::import_trace(args),
    }
}
