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

//! Import errors

use thiserror::Error;

use crate::ModelError;

/// Fault that aborts an import
///
/// Events of the records replayed before the fault are appended to the
/// model; the faulty record leaves it unchanged.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The log could not be read
    #[error("failed to read trace log: {0}")]
    Io(#[from] std::io::Error),
    /// The log is not well-formed XML
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),
    /// A record is missing a field or holds an unparsable one
    #[error("malformed record {record}: {reason}")]
    Malformed {
        /// One-based position of the record
        record: usize,
        /// What is wrong with it
        reason: String,
    },
    /// An object id is not hexadecimal
    #[error("record {record}: invalid object id `{text}`")]
    InvalidOid {
        /// One-based position of the record
        record: usize,
        /// The offending text
        text: String,
    },
    /// A method signature does not follow `Type#name(params):ret`
    #[error("record {record}: invalid method signature `{text}`")]
    Signature {
        /// One-based position of the record
        record: usize,
        /// The offending text
        text: String,
    },
    /// A record needs a method frame but the thread's call stack is empty
    #[error("record {record}: {kind} on thread {thread} with an empty call stack")]
    StackUnderflow {
        /// One-based position of the record
        record: usize,
        /// Event kind of the record
        kind: &'static str,
        /// Thread field of the record
        thread: String,
    },
    /// The model rejected a batch
    #[error(transparent)]
    Model(#[from] ModelError),
}
