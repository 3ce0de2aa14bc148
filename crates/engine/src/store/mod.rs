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

//! Value and contour stores owned by an execution model

mod contour;
mod value;

pub use contour::{remap_oid, ContourStore};
pub use value::ValueStore;

use thiserror::Error;

/// Errors raised by the stores
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An object contour already exists for the pair
    #[error("object contour for {type_name}@{oid:x} already exists")]
    DuplicateInstance {
        /// Runtime type
        type_name: String,
        /// Object id
        oid: u64,
    },
}

/// The contour and value stores of one execution model
#[derive(Debug, Clone, Default)]
pub struct ModelStore {
    /// Interned runtime values
    pub values: ValueStore,
    /// Static, object and method contours
    pub contours: ContourStore,
}

impl ModelStore {
    /// Create empty stores
    pub fn new() -> Self {
        Self::default()
    }
}
