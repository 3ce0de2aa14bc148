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

//! Runtime values as recorded in the trace
//!
//! Values are immutable and interned by the value store: two requests for the
//! same value yield the same [`ValueId`](crate::types::ValueId). The canonical
//! key of a value is the value itself, so every variant is `Hash + Eq`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{ContourId, MethodKey};

/// A runtime value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// The `null` reference
    Null,
    /// A slot that has not been assigned yet
    Uninitialized,
    /// The caller of the first method on a thread
    SystemCaller,
    /// A primitive value in its textual form
    Primitive(String),
    /// A thread identifier
    Thread {
        /// Thread id as reported by the target
        id: u64,
        /// Thread name
        name: String,
    },
    /// A source location
    Line {
        /// Source file name (empty when unknown)
        file: String,
        /// One-based line number (0 when unknown)
        line: u32,
    },
    /// A source file
    File(String),
    /// Reference to a static or object contour
    ContourReference(ContourId),
    /// Reference to a method contour
    MethodContourReference(ContourId),
    /// A value that lives outside of the model
    OutOfModel(OutOfModelValue),
}

/// Values that are not represented by contours
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutOfModelValue {
    /// Free-form description
    Description(String),
    /// An out-of-model object with a known type
    Resolved {
        /// Display text (e.g. `java.lang.String@1f`)
        text: String,
        /// Runtime type of the object
        type_name: String,
    },
    /// An out-of-model method identified by key
    MethodKeyReference(MethodKey),
    /// An out-of-model view of a method contour
    MethodReference(ContourId),
}

impl Value {
    /// Whether this is the `null` value
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The referenced contour, for contour and method-contour references
    pub fn contour(&self) -> Option<ContourId> {
        match self {
            Self::ContourReference(id) | Self::MethodContourReference(id) => Some(*id),
            Self::OutOfModel(OutOfModelValue::MethodReference(id)) => Some(*id),
            _ => None,
        }
    }

    /// The thread id, for thread values
    pub fn thread_id(&self) -> Option<u64> {
        match self {
            Self::Thread { id, .. } => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Uninitialized => f.write_str("<uninitialized>"),
            Self::SystemCaller => f.write_str("SYSTEM"),
            Self::Primitive(text) => f.write_str(text),
            Self::Thread { name, .. } => f.write_str(name),
            Self::Line { file, line } => write!(f, "{file}:{line}"),
            Self::File(name) => f.write_str(name),
            Self::ContourReference(id) | Self::MethodContourReference(id) => write!(f, "{id}"),
            Self::OutOfModel(OutOfModelValue::Description(text)) => f.write_str(text),
            Self::OutOfModel(OutOfModelValue::Resolved { text, .. }) => f.write_str(text),
            Self::OutOfModel(OutOfModelValue::MethodKeyReference(key)) => write!(f, "{key}"),
            Self::OutOfModel(OutOfModelValue::MethodReference(id)) => write!(f, "{id}"),
        }
    }
}
