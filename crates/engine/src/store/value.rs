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

//! Interning store for runtime values
//!
//! Every `create_*` operation follows the same pattern: build the canonical
//! value from the arguments, look it up, store it on a miss, and return the id
//! of the stored instance. Equal requests therefore yield the same id.

use std::collections::HashMap;

use contour_common::types::{
    ContourId, MethodKey, OutOfModelValue, Value, ValueId, SYSTEM_THREAD_ID, SYSTEM_THREAD_NAME,
};

/// Canonical store of runtime values
#[derive(Debug, Clone)]
pub struct ValueStore {
    values: Vec<Value>,
    index: HashMap<Value, ValueId>,
    threads: HashMap<u64, ValueId>,
}

impl Default for ValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueStore {
    /// Create a store holding only the well-known values
    pub fn new() -> Self {
        let mut store =
            Self { values: Vec::new(), index: HashMap::new(), threads: HashMap::new() };
        store.intern(Value::Null);
        store.intern(Value::Uninitialized);
        store.intern(Value::SystemCaller);
        store.intern(Value::Thread { id: SYSTEM_THREAD_ID, name: SYSTEM_THREAD_NAME.to_string() });
        debug_assert_eq!(store.values.len() as u64, ValueId::RESERVED);
        store
    }

    fn intern(&mut self, value: Value) -> ValueId {
        if let Some(id) = self.index.get(&value) {
            return *id;
        }

        let id = ValueId(self.values.len() as u64);
        if let Value::Thread { id: thread_id, .. } = &value {
            self.threads.insert(*thread_id, id);
        }
        self.values.push(value.clone());
        self.index.insert(value, id);
        id
    }

    /// The `null` value
    pub fn null(&self) -> ValueId {
        ValueId::NULL
    }

    /// The uninitialized value
    pub fn uninitialized(&self) -> ValueId {
        ValueId::UNINITIALIZED
    }

    /// The system caller value
    pub fn system_caller(&self) -> ValueId {
        ValueId::SYSTEM_CALLER
    }

    /// The SYSTEM thread value
    pub fn system_thread(&self) -> ValueId {
        ValueId::SYSTEM_THREAD
    }

    /// Primitive value from its textual form
    pub fn create_primitive(&mut self, text: impl Into<String>) -> ValueId {
        self.intern(Value::Primitive(text.into()))
    }

    /// Thread value. The SYSTEM thread id always maps to the sentinel.
    pub fn create_thread(&mut self, id: u64, name: impl Into<String>) -> ValueId {
        if id == SYSTEM_THREAD_ID {
            return ValueId::SYSTEM_THREAD;
        }
        self.intern(Value::Thread { id, name: name.into() })
    }

    /// Source line value
    pub fn create_line(&mut self, file: impl Into<String>, line: u32) -> ValueId {
        self.intern(Value::Line { file: file.into(), line })
    }

    /// Source file value
    pub fn create_file(&mut self, name: impl Into<String>) -> ValueId {
        self.intern(Value::File(name.into()))
    }

    /// Reference to a static or object contour
    pub fn create_contour_reference(&mut self, contour: ContourId) -> ValueId {
        self.intern(Value::ContourReference(contour))
    }

    /// Reference to a method contour
    pub fn create_method_contour_reference(&mut self, contour: ContourId) -> ValueId {
        self.intern(Value::MethodContourReference(contour))
    }

    /// Out-of-model value described by free text
    pub fn create_out_of_model(&mut self, description: impl Into<String>) -> ValueId {
        self.intern(Value::OutOfModel(OutOfModelValue::Description(description.into())))
    }

    /// Out-of-model object with a known runtime type
    pub fn create_resolved(
        &mut self,
        text: impl Into<String>,
        type_name: impl Into<String>,
    ) -> ValueId {
        self.intern(Value::OutOfModel(OutOfModelValue::Resolved {
            text: text.into(),
            type_name: type_name.into(),
        }))
    }

    /// Out-of-model method identified by key
    pub fn create_method_key_reference(&mut self, key: MethodKey) -> ValueId {
        self.intern(Value::OutOfModel(OutOfModelValue::MethodKeyReference(key)))
    }

    /// Out-of-model view of a method contour
    pub fn create_method_reference(&mut self, contour: ContourId) -> ValueId {
        self.intern(Value::OutOfModel(OutOfModelValue::MethodReference(contour)))
    }

    /// Get a value by id
    pub fn get(&self, id: ValueId) -> Option<&Value> {
        self.values.get(id.0 as usize)
    }

    /// Id of an already interned value
    pub fn lookup(&self, value: &Value) -> Option<ValueId> {
        self.index.get(value).copied()
    }

    /// Most recently interned thread value with the given thread id
    pub fn lookup_thread(&self, thread_id: u64) -> Option<ValueId> {
        self.threads.get(&thread_id).copied()
    }

    /// Interned line value for `file:line`
    pub fn lookup_line(&self, file: &str, line: u32) -> Option<ValueId> {
        self.lookup(&Value::Line { file: file.to_string(), line })
    }

    /// Whether `id` names a stored value
    pub fn contains(&self, id: ValueId) -> bool {
        (id.0 as usize) < self.values.len()
    }

    /// Number of stored values, well-known values included
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the store holds only the well-known values
    pub fn is_empty(&self) -> bool {
        self.values.len() as u64 == ValueId::RESERVED
    }

    /// Iterate over all stored values in creation order
    pub fn iter(&self) -> impl Iterator<Item = (ValueId, &Value)> {
        self.values.iter().enumerate().map(|(index, value)| (ValueId(index as u64), value))
    }
}
