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

//! The execution model aggregate
//!
//! An [`ExecutionModel`] owns the append-only trace, the contour and value
//! stores, and the static resolver chain of one analysis session. Exactly one
//! producer (the live [`EventDispatcher`](crate::EventDispatcher) or the
//! [`TraceImporter`](crate::TraceImporter)) appends; any number of readers may
//! hold [`TraceReadGuard`]s concurrently.
//!
//! # Locking
//!
//! The trace lock is always taken before the store lock. `append` holds the
//! trace exclusively only while committing the batch, then downgrades to a
//! shared lock for listener notification, so listeners may call
//! [`ExecutionModel::read_lock`] themselves.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use contour_common::types::{
    Contour, ContourId, Event, EventId, EventKind, NewEvent, Trace, Value, ValueId,
};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::{ModelStore, ResolverChain, StaticResolver, TypeRegistry};

/// Receives every batch of events committed to a model
///
/// Notification is synchronous and in insertion order, so implementations
/// must return quickly.
pub trait TraceListener: Send + Sync {
    /// Called once per committed batch, with the batch's events in order
    fn events_inserted(&self, events: &[Event]);
}

/// Errors raised by [`ExecutionModel::append`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The model was released with [`ExecutionModel::done`]
    #[error("execution model is closed")]
    Closed,
    /// An event references a contour the store does not hold
    #[error("event {position} of the batch references unknown contour {contour}")]
    UnknownContour {
        /// Position of the event in the batch
        position: usize,
        /// The missing contour
        contour: ContourId,
    },
    /// An event references a value the store does not hold
    #[error("event {position} of the batch references unknown value {value}")]
    UnknownValue {
        /// Position of the event in the batch
        position: usize,
        /// The missing value
        value: ValueId,
    },
}

/// Trace, stores and resolvers of one analysis session
pub struct ExecutionModel {
    trace: RwLock<Trace>,
    store: RwLock<ModelStore>,
    resolver: ResolverChain,
    runtime_types: Arc<TypeRegistry>,
    listeners: RwLock<Vec<Arc<dyn TraceListener>>>,
    closed: AtomicBool,
}

impl fmt::Debug for ExecutionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionModel")
            .field("events", &self.trace.read().len())
            .field("resolver", &self.resolver)
            .field("listeners", &self.listeners.read().len())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl Default for ExecutionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionModel {
    /// Create a model that resolves types through its runtime registry only
    pub fn new() -> Self {
        Self::with_resolvers(Vec::new())
    }

    /// Create a model consulting `resolvers` in order, then its own runtime
    /// registry
    pub fn with_resolvers(mut resolvers: Vec<Arc<dyn StaticResolver>>) -> Self {
        let runtime_types = Arc::new(TypeRegistry::new("runtime"));
        resolvers.push(runtime_types.clone());

        Self {
            trace: RwLock::new(Trace::new()),
            store: RwLock::new(ModelStore::new()),
            resolver: ResolverChain::new(resolvers),
            runtime_types,
            listeners: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// The resolver chain of this model
    pub fn resolver(&self) -> &ResolverChain {
        &self.resolver
    }

    /// Registry fed with types learned while building the trace
    pub fn runtime_types(&self) -> &Arc<TypeRegistry> {
        &self.runtime_types
    }

    /// Run `f` with shared access to the stores
    pub fn with_store<R>(&self, f: impl FnOnce(&ModelStore) -> R) -> R {
        f(&self.store.read_recursive())
    }

    /// Run `f` with exclusive access to the stores. Producers only.
    pub fn with_store_mut<R>(&self, f: impl FnOnce(&mut ModelStore, &ResolverChain) -> R) -> R {
        f(&mut self.store.write(), &self.resolver)
    }

    /// Commit a batch of events and notify listeners
    ///
    /// Ids are assigned contiguously after the last committed event. The batch
    /// is validated first and committed as a whole or not at all. Returns the
    /// number of committed events.
    pub fn append(&self, batch: Vec<NewEvent>) -> Result<usize, ModelError> {
        if self.is_done() {
            return Err(ModelError::Closed);
        }
        if batch.is_empty() {
            return Ok(0);
        }

        let mut trace = self.trace.write();
        if self.is_done() {
            return Err(ModelError::Closed);
        }

        let first = trace.next_id();
        let count = batch.len();
        {
            let mut store = self.store.write();
            validate(&store, &batch)?;

            let mut id = first;
            for event in batch {
                let event = Event::commit(id, event);
                if let EventKind::Destroy { contour } = event.kind() {
                    store.contours.mark_collected(*contour, id);
                }
                let pushed = trace.push(event);
                debug_assert!(pushed, "event ids must be contiguous");
                id = id.next();
            }
        }
        debug!(first = %first, count, "appended events");

        let trace = RwLockWriteGuard::downgrade(trace);
        let listeners = self.listeners.read().clone();
        let inserted = trace.since(first);
        for listener in &listeners {
            listener.events_inserted(inserted);
        }

        Ok(count)
    }

    /// Acquire a consistent read-only view of the trace and stores
    ///
    /// The view is released when the guard is dropped.
    pub fn read_lock(&self) -> TraceReadGuard<'_> {
        TraceReadGuard { trace: self.trace.read_recursive(), store: self.store.read_recursive() }
    }

    /// Register a listener for committed batches
    pub fn add_listener(&self, listener: Arc<dyn TraceListener>) {
        self.listeners.write().push(listener);
    }

    /// Unregister a listener. Returns whether it was registered.
    pub fn remove_listener(&self, listener: &Arc<dyn TraceListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|registered| !same_listener(registered, listener));
        listeners.len() != before
    }

    /// Number of committed events
    pub fn len(&self) -> usize {
        self.trace.read_recursive().len()
    }

    /// Whether no event was committed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release the trace, stores and listeners. Idempotent; later appends fail
    /// with [`ModelError::Closed`].
    pub fn done(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.listeners.write().clear();
        let mut trace = self.trace.write();
        let released = trace.len();
        trace.clear();
        *self.store.write() = ModelStore::new();
        drop(trace);

        self.resolver.clear_cache();
        self.runtime_types.clear();
        info!(events = released, "execution model released");
    }

    /// Whether [`ExecutionModel::done`] was called
    pub fn is_done(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

fn same_listener(a: &Arc<dyn TraceListener>, b: &Arc<dyn TraceListener>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn validate(store: &ModelStore, batch: &[NewEvent]) -> Result<(), ModelError> {
    for (position, event) in batch.iter().enumerate() {
        if let Some(contour) =
            event.kind.contours().into_iter().find(|id| !store.contours.contains(*id))
        {
            return Err(ModelError::UnknownContour { position, contour });
        }

        let values = [event.origin.thread, event.origin.line]
            .into_iter()
            .chain(event.kind.values());
        for value in values {
            if !store.values.contains(value) {
                return Err(ModelError::UnknownValue { position, value });
            }
        }
    }
    Ok(())
}

/// Read-only view of a model's trace and stores
///
/// Holding the guard keeps the view consistent: no batch is committed while
/// it is alive.
pub struct TraceReadGuard<'a> {
    trace: RwLockReadGuard<'a, Trace>,
    store: RwLockReadGuard<'a, ModelStore>,
}

impl fmt::Debug for TraceReadGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceReadGuard")
            .field("events", &self.trace.len())
            .field("contours", &self.store.contours.len())
            .finish()
    }
}

impl TraceReadGuard<'_> {
    /// The committed trace
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Committed events in order
    pub fn events(&self) -> &[Event] {
        &self.trace
    }

    /// Iterate over committed events in order
    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.trace.iter()
    }

    /// Number of committed events
    pub fn len(&self) -> usize {
        self.trace.len()
    }

    /// Whether no event was committed
    pub fn is_empty(&self) -> bool {
        self.trace.is_empty()
    }

    /// Get an event by id
    pub fn event(&self, id: EventId) -> Option<&Event> {
        self.trace.get(id)
    }

    /// The stores
    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Get a contour by id
    pub fn contour(&self, id: ContourId) -> Option<&Contour> {
        self.store.contours.get(id)
    }

    /// Get a value by id
    pub fn value(&self, id: ValueId) -> Option<&Value> {
        self.store.values.get(id)
    }

    /// Static contour of a type
    pub fn static_contour(&self, type_name: &str) -> Option<&Contour> {
        self.store.contours.lookup_static_contour(type_name).and_then(|id| self.contour(id))
    }

    /// Object contour of `(type_name, oid)`
    pub fn instance_contour(&self, type_name: &str, oid: u64) -> Option<&Contour> {
        self.store.contours.lookup_instance_contour(type_name, oid).and_then(|id| self.contour(id))
    }

    /// Thread value for a thread id
    pub fn thread_value(&self, thread_id: u64) -> Option<ValueId> {
        self.store.values.lookup_thread(thread_id)
    }

    /// Line value for `file:line`
    pub fn line_value(&self, file: &str, line: u32) -> Option<ValueId> {
        self.store.values.lookup_line(file, line)
    }

    /// Export events, contours and values as JSON
    pub fn to_json_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        let values: Vec<_> = self
            .store
            .values
            .iter()
            .map(|(id, value)| json!({ "id": id, "value": value }))
            .collect();
        let contours: Vec<&Contour> = self.store.contours.iter().collect();

        Ok(json!({
            "events": self.trace.to_json_value()?,
            "contours": serde_json::to_value(contours)?,
            "values": values,
        }))
    }
}

impl<'a> IntoIterator for &'a TraceReadGuard<'_> {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;
    fn into_iter(self) -> Self::IntoIter {
        self.trace.iter()
    }
}
