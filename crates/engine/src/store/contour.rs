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

//! Store of static, object and method contours
//!
//! `lookup_*` operations return `None` when the contour is absent; `retrieve_*`
//! operations create it on a miss. Static contours are created in supertype
//! order: before a type's static contour exists, the static contours of all of
//! its (resolvable) supertypes exist and their `TypeLoad` events were queued
//! ahead of its own.

use std::collections::HashMap;

use contour_common::types::{
    Contour, ContourDetail, ContourId, ContourKind, EventId, EventOrigin, MethodKey, NewEvent,
    ValueId,
};
use tracing::{debug, warn};

use crate::{EventFactory, ResolverChain, StoreError};

/// Next candidate when an object id collides: `oid * 7 + oid % 19`
///
/// Zero is a fixed point of the recurrence and moves to one instead.
pub fn remap_oid(oid: u64) -> u64 {
    let next = oid.wrapping_mul(7).wrapping_add(oid % 19);
    if next == oid {
        next.wrapping_add(1)
    } else {
        next
    }
}

/// Contours of one execution model
#[derive(Debug, Clone, Default)]
pub struct ContourStore {
    contours: Vec<Contour>,
    statics: HashMap<String, ContourId>,
    instances: HashMap<(String, u64), ContourId>,
}

impl ContourStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, parent: Option<ContourId>, detail: ContourDetail) -> ContourId {
        let id = ContourId(self.contours.len() as u64);
        self.contours.push(Contour::new(id, parent, detail));
        id
    }

    fn insert_static(&mut self, type_name: &str, parent: Option<ContourId>) -> ContourId {
        let id = self.insert(parent, ContourDetail::Static { type_name: type_name.to_string() });
        self.statics.insert(type_name.to_string(), id);
        debug!(type_name, contour = %id, "created static contour");
        id
    }

    /// Static contour of a type, if it was created
    pub fn lookup_static_contour(&self, type_name: &str) -> Option<ContourId> {
        self.statics.get(type_name).copied()
    }

    /// Object contour of `(type_name, oid)`, if it was created
    pub fn lookup_instance_contour(&self, type_name: &str, oid: u64) -> Option<ContourId> {
        self.instances.get(&(type_name.to_string(), oid)).copied()
    }

    /// Static contour of a type, created on a miss together with the missing
    /// static contours of its supertype chain
    ///
    /// One `TypeLoad` event per created contour is pushed to `out`, supertypes
    /// first, all attributed to `origin`.
    pub fn retrieve_static_contour(
        &mut self,
        resolver: &ResolverChain,
        type_name: &str,
        origin: EventOrigin,
        out: &mut Vec<NewEvent>,
    ) -> ContourId {
        if let Some(id) = self.lookup_static_contour(type_name) {
            return id;
        }

        // Walk up to the first supertype that already has a contour
        let mut ancestors: Vec<String> = Vec::new();
        let mut parent = None;
        let mut current = type_name.to_string();
        while let Some(supertype) = resolver.supertype_of(&current) {
            if let Some(existing) = self.lookup_static_contour(&supertype) {
                parent = Some(existing);
                break;
            }
            if supertype == type_name || ancestors.contains(&supertype) {
                warn!(type_name, %supertype, "cyclic supertype chain, truncating");
                break;
            }
            ancestors.push(supertype.clone());
            current = supertype;
        }

        for ancestor in ancestors.iter().rev() {
            let id = self.insert_static(ancestor, parent);
            out.push(EventFactory::type_load(origin, id));
            parent = Some(id);
        }

        let id = self.insert_static(type_name, parent);
        out.push(EventFactory::type_load(origin, id));
        id
    }

    /// Create the object contour of `(type_name, oid)`
    ///
    /// Fails instead of aliasing when the pair already has a contour; callers
    /// disambiguate oids beforehand.
    pub fn create_object_contour(
        &mut self,
        type_name: &str,
        oid: u64,
        array_len: Option<usize>,
        parent: Option<ContourId>,
    ) -> Result<ContourId, StoreError> {
        let key = (type_name.to_string(), oid);
        if self.instances.contains_key(&key) {
            return Err(StoreError::DuplicateInstance { type_name: type_name.to_string(), oid });
        }

        let id = self.insert(
            parent,
            ContourDetail::Object {
                type_name: type_name.to_string(),
                oid,
                array_len,
                collected_at: None,
            },
        );
        self.instances.insert(key, id);
        Ok(id)
    }

    /// First oid free for `type_name`, starting at `oid` and following
    /// [`remap_oid`] while the pair is taken
    pub fn free_oid(&self, type_name: &str, oid: u64) -> u64 {
        let mut candidate = oid;
        while self.lookup_instance_contour(type_name, candidate).is_some() {
            candidate = remap_oid(candidate);
        }
        if candidate != oid {
            debug!(type_name, oid, remapped = candidate, "remapped colliding object id");
        }
        candidate
    }

    /// Object contour of `(type_name, oid)`, created on a miss.
    /// Returns the contour and whether it was created.
    pub fn retrieve_instance_contour(
        &mut self,
        type_name: &str,
        oid: u64,
        array_len: Option<usize>,
        parent: Option<ContourId>,
    ) -> (ContourId, bool) {
        match self.lookup_instance_contour(type_name, oid) {
            Some(id) => (id, false),
            None => {
                let id = self.insert(
                    parent,
                    ContourDetail::Object {
                        type_name: type_name.to_string(),
                        oid,
                        array_len,
                        collected_at: None,
                    },
                );
                self.instances.insert((type_name.to_string(), oid), id);
                (id, true)
            }
        }
    }

    /// Create the contour of a new invocation of `method` on `thread`
    pub fn create_method_contour(
        &mut self,
        method: MethodKey,
        thread: ValueId,
        parent: Option<ContourId>,
    ) -> ContourId {
        self.insert(parent, ContourDetail::Method { method, thread })
    }

    /// Get a contour by id
    pub fn get(&self, id: ContourId) -> Option<&Contour> {
        self.contours.get(id.0 as usize)
    }

    /// Get a contour by id (mutable)
    pub fn get_mut(&mut self, id: ContourId) -> Option<&mut Contour> {
        self.contours.get_mut(id.0 as usize)
    }

    /// Whether `id` names a stored contour
    pub fn contains(&self, id: ContourId) -> bool {
        (id.0 as usize) < self.contours.len()
    }

    /// Mark an object contour as collected at `event`
    pub fn mark_collected(&mut self, id: ContourId, event: EventId) -> bool {
        self.get_mut(id).is_some_and(|contour| contour.mark_collected(event))
    }

    /// Number of contours
    pub fn len(&self) -> usize {
        self.contours.len()
    }

    /// Whether no contour was created yet
    pub fn is_empty(&self) -> bool {
        self.contours.is_empty()
    }

    /// Number of contours of the given kind
    pub fn count(&self, kind: ContourKind) -> usize {
        self.contours.iter().filter(|contour| contour.kind() == kind).count()
    }

    /// Iterate over all contours in creation order
    pub fn iter(&self) -> impl Iterator<Item = &Contour> {
        self.contours.iter()
    }
}
