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

//! Import command - replay a recorded log and report on the model

use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::Args;
use contour_common::types::{ContourKind, Value, SYSTEM_THREAD_ID};
use contour_engine::{EngineConfig, ExecutionModel, ImportSummary, TraceImporter, TraceReadGuard};
use eyre::{Result, WrapErr};
use itertools::Itertools;
use tracing::info;

/// Arguments of `contour import`
#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Recorded trace log (XML)
    pub file: PathBuf,

    /// Events appended to the model per batch
    #[arg(long, env = "CONTOUR_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Engine configuration file (JSON); flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the reconstructed trace as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

impl ImportArgs {
    /// Engine configuration selected by the arguments
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .wrap_err_with(|| format!("invalid engine config {}", path.display()))?
            }
            None => EngineConfig::default(),
        };
        if let Some(batch_size) = self.batch_size {
            config = config.with_batch_size(batch_size);
        }
        Ok(config)
    }
}

/// Import `args.file` into a fresh model and print the result
pub fn import_trace(args: &ImportArgs) -> Result<()> {
    let config = args.engine_config()?;
    let model = Arc::new(ExecutionModel::new());
    let mut importer = TraceImporter::from_config(model.clone(), &config);

    let summary = importer
        .import_file(&args.file)
        .wrap_err_with(|| format!("failed to import {}", args.file.display()))?;
    info!(file = %args.file.display(), %summary, "import complete");

    let guard = model.read_lock();
    if args.json {
        let json = guard.to_json_value()?;
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        print!("{}", render_summary(&args.file, &summary, &guard)?);
    }
    Ok(())
}

fn render_summary(
    file: &Path,
    summary: &ImportSummary,
    guard: &TraceReadGuard<'_>,
) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "Imported {}: {summary}", file.display())?;
    write!(out, "{}", guard.trace().summary())?;

    let contours = &guard.store().contours;
    writeln!(out, "Contours: {}", contours.len())?;
    for kind in [ContourKind::Static, ContourKind::Object, ContourKind::Method] {
        writeln!(out, "  {:<16} {}", format!("{kind:?}"), contours.count(kind))?;
    }

    let threads = guard
        .store()
        .values
        .iter()
        .filter_map(|(id, value)| match value {
            Value::Thread { id: thread_id, name } => Some((*thread_id, name.as_str(), id)),
            _ => None,
        })
        .sorted_by_key(|(thread_id, ..)| *thread_id)
        .collect_vec();
    writeln!(out, "Threads: {}", threads.len())?;
    for (thread_id, name, value) in threads {
        let events = guard.trace().events_on_thread(value).count();
        let thread_id =
            if thread_id == SYSTEM_THREAD_ID { "-".to_string() } else { thread_id.to_string() };
        writeln!(out, "  {thread_id:<4} {name:<16} {events} events")?;
    }
    Ok(out)
}
