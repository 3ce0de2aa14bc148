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

//! Offline import of recorded trace logs.
//!
//! The importer replays a log of event records into an [`ExecutionModel`],
//! appending the resulting events in fixed-size batches.
//!
//! [`ExecutionModel`]: crate::ExecutionModel

mod error;
mod importer;
mod record;
mod signature;

pub use error::ImportError;
pub use importer::{ImportSummary, RecordKind, TraceImporter, UNSUPPORTED_KINDS};
pub use record::{Record, RecordReader};
pub use signature::Signature;
