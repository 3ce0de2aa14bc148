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

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// Thread id reserved for the SYSTEM thread (VM-level events and offline
/// records attributed to no application thread)
pub const SYSTEM_THREAD_ID: u64 = u64::MAX;

/// Name carried by the SYSTEM thread value
pub const SYSTEM_THREAD_NAME: &str = "SYSTEM";

/// Identity of an interned runtime value
///
/// Ids are assigned by the value store in creation order. The first few ids are
/// reserved for well-known values that every store pre-interns.
#[derive(
    Debug, Display, From, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[display("v{_0}")]
pub struct ValueId(pub u64);

impl ValueId {
    /// The `null` value
    pub const NULL: Self = Self(0);
    /// A slot that has not been assigned yet
    pub const UNINITIALIZED: Self = Self(1);
    /// The caller of the first method on a thread
    pub const SYSTEM_CALLER: Self = Self(2);
    /// The SYSTEM thread sentinel
    pub const SYSTEM_THREAD: Self = Self(3);

    /// Number of reserved ids; dynamically interned values start here
    pub const RESERVED: u64 = 4;

    /// Whether this id is one of the pre-interned well-known values
    pub fn is_reserved(&self) -> bool {
        self.0 < Self::RESERVED
    }
}

/// Identity of a contour (static, object or method)
#[derive(
    Debug, Display, From, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[display("c{_0}")]
pub struct ContourId(pub u64);

/// Identity of a committed trace event
///
/// Event ids start at [`EventId::FIRST`] and grow by one per appended event.
#[derive(
    Debug, Display, From, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[display("#{_0}")]
pub struct EventId(pub u64);

impl EventId {
    /// Id of the first event of every trace
    pub const FIRST: Self = Self(1);

    /// The id following this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Zero-based position of this event in its trace
    pub fn index(&self) -> usize {
        (self.0 - Self::FIRST.0) as usize
    }
}
