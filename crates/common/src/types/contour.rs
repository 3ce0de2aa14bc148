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

//! Contours: structured snapshots of one scope's current state
//!
//! A contour is either the static contour of a loaded type, the object contour
//! of an allocated instance (or array), or the method contour of an active
//! invocation. Contours hold named members whose current value changes as the
//! trace is built.

use serde::{Deserialize, Serialize};

use crate::types::{ContourId, EventId, MethodKey, ValueId};

/// Discriminant of a contour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContourKind {
    /// Per-type contour holding static members
    Static,
    /// Per-instance contour of an object or array
    Object,
    /// Per-invocation contour of a method
    Method,
}

/// Kind of a contour member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberKind {
    /// Static or instance field
    Field,
    /// Method argument
    Argument,
    /// Method local variable
    Local,
    /// Array element
    ArrayCell,
}

/// Named slot of a contour holding a current value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContourMember {
    /// Member name (`[i]` for array cells)
    pub name: String,
    /// Member kind
    pub kind: MemberKind,
    /// Current value
    pub value: ValueId,
}

/// Kind-specific data of a contour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContourDetail {
    /// Static contour of a loaded type
    Static {
        /// Loaded type
        type_name: String,
    },
    /// Object contour of an allocated instance
    Object {
        /// Runtime type of the instance
        type_name: String,
        /// Object identifier, unique within `type_name`
        oid: u64,
        /// Element count for arrays
        array_len: Option<usize>,
        /// Event at which the object was observed to be collected
        collected_at: Option<EventId>,
    },
    /// Method contour of an active invocation
    Method {
        /// Invoked method
        method: MethodKey,
        /// Owning thread value
        thread: ValueId,
    },
}

/// A contour and its members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contour {
    id: ContourId,
    parent: Option<ContourId>,
    detail: ContourDetail,
    members: Vec<ContourMember>,
}

impl Contour {
    /// Create a contour without members
    pub fn new(id: ContourId, parent: Option<ContourId>, detail: ContourDetail) -> Self {
        Self { id, parent, detail, members: Vec::new() }
    }

    /// Get the contour id
    pub fn id(&self) -> ContourId {
        self.id
    }

    /// Enclosing contour: the static contour for objects, the receiver or the
    /// declaring type's static contour for methods, the supertype's static
    /// contour for static contours
    pub fn parent(&self) -> Option<ContourId> {
        self.parent
    }

    /// Get the kind-specific data
    pub fn detail(&self) -> &ContourDetail {
        &self.detail
    }

    /// Get the contour kind
    pub fn kind(&self) -> ContourKind {
        match self.detail {
            ContourDetail::Static { .. } => ContourKind::Static,
            ContourDetail::Object { .. } => ContourKind::Object,
            ContourDetail::Method { .. } => ContourKind::Method,
        }
    }

    /// Type the contour belongs to (declaring type for method contours)
    pub fn type_name(&self) -> &str {
        match &self.detail {
            ContourDetail::Static { type_name } | ContourDetail::Object { type_name, .. } => {
                type_name
            }
            ContourDetail::Method { method, .. } => method.type_name(),
        }
    }

    /// Object id, for object contours
    pub fn oid(&self) -> Option<u64> {
        match self.detail {
            ContourDetail::Object { oid, .. } => Some(oid),
            _ => None,
        }
    }

    /// Element count, for array contours
    pub fn array_len(&self) -> Option<usize> {
        match self.detail {
            ContourDetail::Object { array_len, .. } => array_len,
            _ => None,
        }
    }

    /// Invoked method, for method contours
    pub fn method(&self) -> Option<&MethodKey> {
        match &self.detail {
            ContourDetail::Method { method, .. } => Some(method),
            _ => None,
        }
    }

    /// Owning thread, for method contours
    pub fn thread(&self) -> Option<ValueId> {
        match self.detail {
            ContourDetail::Method { thread, .. } => Some(thread),
            _ => None,
        }
    }

    /// Event at which the object was collected, if it was
    pub fn collected_at(&self) -> Option<EventId> {
        match self.detail {
            ContourDetail::Object { collected_at, .. } => collected_at,
            _ => None,
        }
    }

    /// Record that the object was collected at `event`. Returns `false` for
    /// non-object contours and for objects already marked.
    pub fn mark_collected(&mut self, event: EventId) -> bool {
        match &mut self.detail {
            ContourDetail::Object { collected_at: slot @ None, .. } => {
                *slot = Some(event);
                true
            }
            _ => false,
        }
    }

    /// All members in insertion order
    pub fn members(&self) -> &[ContourMember] {
        &self.members
    }

    /// Look up a member by name
    pub fn member(&self, name: &str) -> Option<&ContourMember> {
        self.members.iter().find(|member| member.name == name)
    }

    /// Set a member's value, creating the member on first assignment.
    /// Returns the previous value.
    pub fn set_member(&mut self, name: &str, kind: MemberKind, value: ValueId) -> Option<ValueId> {
        match self.members.iter_mut().find(|member| member.name == name) {
            Some(member) => Some(std::mem::replace(&mut member.value, value)),
            None => {
                self.members.push(ContourMember { name: name.to_string(), kind, value });
                None
            }
        }
    }

    /// Remove a member. Returns its last value.
    pub fn remove_member(&mut self, name: &str) -> Option<ValueId> {
        let index = self.members.iter().position(|member| member.name == name)?;
        Some(self.members.remove(index).value)
    }
}
