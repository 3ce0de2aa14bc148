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

//! Low-level notifications delivered by a live target
//!
//! These mirror what a debugger-style instrumentation layer reports. They are
//! plain data: the [`EventDispatcher`](crate::EventDispatcher) decides which
//! trace events, if any, each one produces.

use contour_common::types::LockOperation;
use serde::{Deserialize, Serialize};

/// A target thread
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadRef {
    /// Unique thread id
    pub id: u64,
    /// Thread name
    pub name: String,
}

impl ThreadRef {
    /// Create a thread reference
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

/// A target object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Object id, unique while the object is alive
    pub oid: u64,
    /// Runtime type (`T[]` for arrays)
    pub type_name: String,
    /// Array length, for arrays
    pub array_length: Option<usize>,
}

impl ObjectRef {
    /// Reference to a plain object
    pub fn new(oid: u64, type_name: impl Into<String>) -> Self {
        Self { oid, type_name: type_name.into(), array_length: None }
    }

    /// Reference to an array
    pub fn array(oid: u64, type_name: impl Into<String>, length: usize) -> Self {
        Self { oid, type_name: type_name.into(), array_length: Some(length) }
    }
}

/// A value as reported by the target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawValue {
    /// `null`
    Null,
    /// Not assigned yet
    Uninitialized,
    /// Primitive in textual form
    Primitive(String),
    /// Object reference
    Object(ObjectRef),
}

impl RawValue {
    /// Primitive from anything printable
    pub fn primitive(text: impl ToString) -> Self {
        Self::Primitive(text.to_string())
    }
}

/// A code location
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    /// Source file name (empty when unknown)
    pub file: String,
    /// One-based line number (0 when unknown)
    pub line: u32,
    /// Declaring type of the executing method
    pub type_name: String,
    /// Simple name of the executing method
    pub method_name: String,
}

impl Location {
    /// Create a location
    pub fn new(
        file: impl Into<String>,
        line: u32,
        type_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            line,
            type_name: type_name.into(),
            method_name: method_name.into(),
        }
    }
}

/// Direction of a synthetic accessor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessorKind {
    /// Returns the field value
    Read,
    /// Stores its last argument into the field
    Write,
}

/// Compiler-generated method that only reads or writes a field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyntheticAccessor {
    /// Type declaring the accessed field
    pub owner_type: String,
    /// Accessed field
    pub field: String,
    /// Read or write
    pub kind: AccessorKind,
    /// Whether the field is static
    pub is_static: bool,
}

/// A method as reported by the target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodInfo {
    /// Declaring type
    pub type_name: String,
    /// Simple name
    pub name: String,
    /// Parameter type names
    pub parameter_types: Vec<String>,
    /// Return type name
    pub return_type: String,
    /// Whether the method is static
    pub is_static: bool,
    /// Set when the method is a synthetic field accessor
    pub accessor: Option<SyntheticAccessor>,
}

impl MethodInfo {
    /// Instance method without parameters returning `void`
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            parameter_types: Vec::new(),
            return_type: "void".to_string(),
            is_static: false,
            accessor: None,
        }
    }

    /// Set the parameter types
    pub fn with_parameters<I, S>(mut self, parameter_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameter_types = parameter_types.into_iter().map(Into::into).collect();
        self
    }

    /// Set the return type
    pub fn with_return_type(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = return_type.into();
        self
    }

    /// Mark the method static
    pub fn into_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Mark the method as a synthetic accessor
    pub fn with_accessor(mut self, accessor: SyntheticAccessor) -> Self {
        self.accessor = Some(accessor);
        self
    }
}

/// A field as reported by the target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Declaring type
    pub type_name: String,
    /// Field name
    pub name: String,
    /// Whether the field is static
    pub is_static: bool,
}

impl FieldInfo {
    /// Instance field
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self { type_name: type_name.into(), name: name.into(), is_static: false }
    }

    /// Static field
    pub fn static_field(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self { type_name: type_name.into(), name: name.into(), is_static: true }
    }
}

/// A visible local variable and its current value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalVariable {
    /// Variable name
    pub name: String,
    /// Current value
    pub value: RawValue,
}

impl LocalVariable {
    /// Create a local variable binding
    pub fn new(name: impl Into<String>, value: RawValue) -> Self {
        Self { name: name.into(), value }
    }
}

/// Loaded type as reported by a class-prepare notification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeInfo {
    /// Fully qualified name
    pub name: String,
    /// Direct supertype, if any
    pub supertype: Option<String>,
    /// Whether the type is an interface
    pub is_interface: bool,
}

/// A notification from the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Notification {
    /// The target started
    VmStart {
        /// Thread running the entry point
        thread: ThreadRef,
    },
    /// The target terminated
    VmDeath,
    /// The connection to the target was lost
    VmDisconnect,
    /// A thread started
    ThreadStart {
        /// The new thread
        thread: ThreadRef,
    },
    /// A thread terminated
    ThreadDeath {
        /// The terminated thread
        thread: ThreadRef,
    },
    /// A type was loaded and prepared
    ClassPrepare {
        /// Thread that triggered the load
        thread: ThreadRef,
        /// The loaded type
        type_info: TypeInfo,
    },
    /// A method body is about to run
    MethodEntry {
        /// Executing thread
        thread: ThreadRef,
        /// First location of the method
        location: Location,
        /// The entered method
        method: MethodInfo,
        /// Receiver, for instance methods
        receiver: Option<ObjectRef>,
        /// Argument bindings, in declaration order
        arguments: Vec<LocalVariable>,
    },
    /// A method is about to return
    MethodExit {
        /// Executing thread
        thread: ThreadRef,
        /// Returning location
        location: Location,
        /// The exiting method
        method: MethodInfo,
        /// Value being returned, if the method returns one
        return_value: Option<RawValue>,
    },
    /// A watched field was read
    FieldAccess {
        /// Executing thread
        thread: ThreadRef,
        /// Reading location
        location: Location,
        /// Owning object, `None` for static fields
        object: Option<ObjectRef>,
        /// The field
        field: FieldInfo,
        /// Value read
        value: RawValue,
    },
    /// A watched field is about to be written
    FieldModify {
        /// Executing thread
        thread: ThreadRef,
        /// Writing location
        location: Location,
        /// Owning object, `None` for static fields
        object: Option<ObjectRef>,
        /// The field
        field: FieldInfo,
        /// Value to be written
        value: RawValue,
    },
    /// An array cell was written
    ArrayStore {
        /// Executing thread
        thread: ThreadRef,
        /// Writing location
        location: Location,
        /// The array
        array: ObjectRef,
        /// Cell index
        index: usize,
        /// Value written
        value: RawValue,
    },
    /// Execution stepped to a new location
    Step {
        /// Executing thread
        thread: ThreadRef,
        /// New location
        location: Location,
        /// Locals visible in the current frame
        locals: Vec<LocalVariable>,
    },
    /// An exception was thrown
    Exception {
        /// Executing thread
        thread: ThreadRef,
        /// Throwing location
        location: Location,
        /// The exception object
        exception: ObjectRef,
        /// Location of the handler, `None` when uncaught
        catch_location: Option<Location>,
    },
    /// A monitor operation
    Monitor {
        /// Executing thread
        thread: ThreadRef,
        /// Location of the operation
        location: Location,
        /// The monitor object
        lock: ObjectRef,
        /// The operation
        operation: LockOperation,
    },
    /// An object was garbage collected
    ObjectCollected {
        /// The collected object
        object: ObjectRef,
    },
    /// A notification kind this crate does not interpret
    Unrecognized {
        /// Kind name, for diagnostics
        name: String,
    },
}

impl Notification {
    /// Short name of the notification kind
    pub fn name(&self) -> &str {
        match self {
            Self::VmStart { .. } => "vm-start",
            Self::VmDeath => "vm-death",
            Self::VmDisconnect => "vm-disconnect",
            Self::ThreadStart { .. } => "thread-start",
            Self::ThreadDeath { .. } => "thread-death",
            Self::ClassPrepare { .. } => "class-prepare",
            Self::MethodEntry { .. } => "method-entry",
            Self::MethodExit { .. } => "method-exit",
            Self::FieldAccess { .. } => "field-access",
            Self::FieldModify { .. } => "field-modify",
            Self::ArrayStore { .. } => "array-store",
            Self::Step { .. } => "step",
            Self::Exception { .. } => "exception",
            Self::Monitor { .. } => "monitor",
            Self::ObjectCollected { .. } => "object-collected",
            Self::Unrecognized { name } => name,
        }
    }

    /// Thread the notification happened on, if any
    pub fn thread(&self) -> Option<&ThreadRef> {
        match self {
            Self::VmStart { thread }
            | Self::ThreadStart { thread }
            | Self::ThreadDeath { thread }
            | Self::ClassPrepare { thread, .. }
            | Self::MethodEntry { thread, .. }
            | Self::MethodExit { thread, .. }
            | Self::FieldAccess { thread, .. }
            | Self::FieldModify { thread, .. }
            | Self::ArrayStore { thread, .. }
            | Self::Step { thread, .. }
            | Self::Exception { thread, .. }
            | Self::Monitor { thread, .. } => Some(thread),
            Self::VmDeath
            | Self::VmDisconnect
            | Self::ObjectCollected { .. }
            | Self::Unrecognized { .. } => None,
        }
    }
}
