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

//! Trace events
//!
//! Producers build [`NewEvent`]s (no id yet); the execution model assigns ids
//! on append and stores immutable [`Event`]s. Every event carries the thread
//! and line it is attributed to, plus a kind-specific payload referencing
//! contours and interned values.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{ContourId, EventId, ValueId};

/// Thread and source line an event is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventOrigin {
    /// Thread value
    pub thread: ValueId,
    /// Line value
    pub line: ValueId,
}

impl EventOrigin {
    /// Create an origin
    pub fn new(thread: ValueId, line: ValueId) -> Self {
        Self { thread, line }
    }
}

/// Operation recorded by a lock event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockOperation {
    /// Monitor acquired
    Acquire,
    /// Monitor released
    Release,
    /// Thread started waiting on the monitor
    Wait,
    /// Thread was notified and resumed
    Notified,
}

/// Kind-specific payload of an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Target started
    SystemStart,
    /// Target terminated or disconnected
    SystemExit,
    /// A thread terminated
    ThreadEnd,
    /// A type was loaded; its static contour now exists
    TypeLoad {
        /// The new static contour
        contour: ContourId,
    },
    /// An object was allocated (inferred at first observation)
    NewObject {
        /// The new object contour
        contour: ContourId,
    },
    /// An object was observed to be garbage collected
    Destroy {
        /// The collected object contour
        contour: ContourId,
    },
    /// A method was called
    MethodCall {
        /// System caller, method contour reference, or out-of-model caller
        caller: ValueId,
        /// Method contour reference, or out-of-model method key reference
        target: ValueId,
    },
    /// The callee started executing its body
    MethodEntered {
        /// The entered method contour
        contour: ContourId,
    },
    /// A method contour was closed
    MethodExit {
        /// The closed method contour
        contour: ContourId,
        /// Returned value, if any
        returned: Option<ValueId>,
    },
    /// Control came back to the caller's frame
    MethodReturned {
        /// Method contour reference or out-of-model method key reference
        returner: ValueId,
        /// Returned value, if any
        value: Option<ValueId>,
    },
    /// A field was read
    FieldRead {
        /// Static or object contour owning the field
        contour: ContourId,
        /// Field name
        field: String,
        /// Value read
        value: ValueId,
    },
    /// A field or array cell was written
    FieldWrite {
        /// Static or object contour owning the field
        contour: ContourId,
        /// Field name (`[i]` for array cells)
        field: String,
        /// Value written
        value: ValueId,
    },
    /// A method variable was assigned
    VarAssign {
        /// Method contour owning the variable
        contour: ContourId,
        /// Variable name
        variable: String,
        /// New value
        value: ValueId,
    },
    /// A method variable went out of scope
    VarDelete {
        /// Method contour owning the variable
        contour: ContourId,
        /// Variable name
        variable: String,
    },
    /// An exception was thrown
    ExceptionThrow {
        /// The exception object
        exception: ValueId,
        /// Method contour reference of the throwing frame
        thrower: ValueId,
        /// Whether frames were popped by the throw
        frames_popped: bool,
    },
    /// An exception was caught
    ExceptionCatch {
        /// The exception object
        exception: ValueId,
        /// Catching method contour
        catcher: Option<ContourId>,
        /// Catch variable, when known
        variable: Option<String>,
    },
    /// A monitor operation
    Lock {
        /// Operation performed
        operation: LockOperation,
        /// The monitor object
        lock: ValueId,
    },
    /// Execution reached a new source line
    LineStep,
}

impl EventKind {
    /// Upper-case name of the kind, as used by recorded logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::SystemStart => "SYSTEM_START",
            Self::SystemExit => "SYSTEM_END",
            Self::ThreadEnd => "THREAD_END",
            Self::TypeLoad { .. } => "TYPE_LOAD",
            Self::NewObject { .. } => "OBJECT_NEW",
            Self::Destroy { .. } => "DESTROY",
            Self::MethodCall { .. } => "METHOD_CALL",
            Self::MethodEntered { .. } => "METHOD_ENTERED",
            Self::MethodExit { .. } => "METHOD_EXIT",
            Self::MethodReturned { .. } => "METHOD_RETURNED",
            Self::FieldRead { .. } => "FIELD_READ",
            Self::FieldWrite { .. } => "FIELD_WRITE",
            Self::VarAssign { .. } => "VAR_ASSIGN",
            Self::VarDelete { .. } => "VAR_DELETE",
            Self::ExceptionThrow { .. } => "EXCEPTION_THROW",
            Self::ExceptionCatch { .. } => "EXCEPTION_CATCH",
            Self::Lock { .. } => "LOCK",
            Self::LineStep => "LINE_STEP",
        }
    }

    /// Contours referenced directly by the payload
    pub fn contours(&self) -> Vec<ContourId> {
        match self {
            Self::TypeLoad { contour }
            | Self::NewObject { contour }
            | Self::Destroy { contour }
            | Self::MethodEntered { contour }
            | Self::MethodExit { contour, .. }
            | Self::FieldRead { contour, .. }
            | Self::FieldWrite { contour, .. }
            | Self::VarAssign { contour, .. }
            | Self::VarDelete { contour, .. } => vec![*contour],
            Self::ExceptionCatch { catcher: Some(contour), .. } => vec![*contour],
            _ => Vec::new(),
        }
    }

    /// Values referenced directly by the payload
    pub fn values(&self) -> Vec<ValueId> {
        match self {
            Self::MethodCall { caller, target } => vec![*caller, *target],
            Self::MethodExit { returned, .. } => returned.iter().copied().collect(),
            Self::MethodReturned { returner, value } => {
                std::iter::once(*returner).chain(value.iter().copied()).collect()
            }
            Self::FieldRead { value, .. }
            | Self::FieldWrite { value, .. }
            | Self::VarAssign { value, .. } => vec![*value],
            Self::ExceptionThrow { exception, thrower, .. } => vec![*exception, *thrower],
            Self::ExceptionCatch { exception, .. } => vec![*exception],
            Self::Lock { lock, .. } => vec![*lock],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An event that has not been appended yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Thread and line the event is attributed to
    pub origin: EventOrigin,
    /// Payload
    pub kind: EventKind,
}

/// A committed, immutable trace event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    thread: ValueId,
    line: ValueId,
    kind: EventKind,
}

impl Event {
    /// Commit a new event under `id`
    pub fn commit(id: EventId, event: NewEvent) -> Self {
        Self { id, thread: event.origin.thread, line: event.origin.line, kind: event.kind }
    }

    /// Get the event id
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Get the thread value
    pub fn thread(&self) -> ValueId {
        self.thread
    }

    /// Get the line value
    pub fn line(&self) -> ValueId {
        self.line
    }

    /// Get the payload
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }
}
