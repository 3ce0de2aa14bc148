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

//! Live capture bookkeeping
//!
//! [`ExecutionState`] tracks per-thread call stacks and the caches the
//! dispatcher needs to infer events the instrumentation does not signal. The
//! contract is permissive: queries for threads or contours that were never
//! observed return `None`/`false`, and invariants are enforced by the
//! dispatcher.

use std::collections::{HashMap, HashSet};

use contour_common::types::{ContourId, MethodKey, ValueId};
use itertools::Itertools;

use crate::AccessorKind;

/// One entry of a thread's call stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// An in-model invocation with its method contour
    Method {
        /// The method contour
        contour: ContourId,
        /// Invoked method
        method: MethodKey,
    },
    /// An out-of-model invocation, tracked without a contour
    OutOfModel {
        /// Invoked method
        method: MethodKey,
        /// Whether a call event was emitted for it
        announced: bool,
    },
    /// A synthetic accessor collapsed into a single field event
    Accessor {
        /// Invoked accessor
        method: MethodKey,
        /// Contour owning the accessed field, when it is in the model
        owner: Option<ContourId>,
        /// Accessed field
        field: String,
        /// Read or write
        access: AccessorKind,
        /// Value being written, for writes
        written: Option<ValueId>,
    },
}

impl Frame {
    /// The invoked method
    pub fn method(&self) -> &MethodKey {
        match self {
            Self::Method { method, .. }
            | Self::OutOfModel { method, .. }
            | Self::Accessor { method, .. } => method,
        }
    }

    /// The method contour, for in-model frames
    pub fn contour(&self) -> Option<ContourId> {
        match self {
            Self::Method { contour, .. } => Some(*contour),
            _ => None,
        }
    }
}

/// A `MethodReturned` waiting for the next event in the caller's frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingReturn {
    /// Method contour reference or out-of-model method reference
    pub returner: ValueId,
    /// Returned value
    pub value: Option<ValueId>,
}

/// Bookkeeping of one target thread
#[derive(Debug, Clone)]
pub struct ThreadState {
    thread: ValueId,
    frames: Vec<Frame>,
    has_called: bool,
    pending_return: Option<PendingReturn>,
    exception: Option<ValueId>,
    locks: Vec<ValueId>,
}

impl ThreadState {
    fn new(thread: ValueId) -> Self {
        Self {
            thread,
            frames: Vec::new(),
            has_called: false,
            pending_return: None,
            exception: None,
            locks: Vec::new(),
        }
    }

    /// Thread value
    pub fn thread(&self) -> ValueId {
        self.thread
    }

    /// Call stack, outermost first
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Call stack depth
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Top of the call stack
    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Push a frame, recording that the thread made a call
    pub fn push(&mut self, frame: Frame) {
        self.has_called = true;
        self.frames.push(frame);
    }

    /// Pop the top frame
    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Whether the thread made any call yet
    pub fn has_called(&self) -> bool {
        self.has_called
    }

    /// Queue the returned event for the caller's frame, replacing any older one
    pub fn set_pending_return(&mut self, pending: PendingReturn) {
        self.pending_return = Some(pending);
    }

    /// Take the queued returned event
    pub fn take_pending_return(&mut self) -> Option<PendingReturn> {
        self.pending_return.take()
    }

    /// Record an in-flight exception awaiting its catch
    pub fn set_exception(&mut self, exception: Option<ValueId>) {
        self.exception = exception;
    }

    /// Take the in-flight exception
    pub fn take_exception(&mut self) -> Option<ValueId> {
        self.exception.take()
    }

    /// Monitors currently held, in acquisition order
    pub fn locks(&self) -> &[ValueId] {
        &self.locks
    }

    /// Record a monitor acquisition
    pub fn acquire(&mut self, lock: ValueId) {
        self.locks.push(lock);
    }

    /// Record a monitor release. Returns whether the monitor was held.
    pub fn release(&mut self, lock: ValueId) -> bool {
        match self.locks.iter().rposition(|held| *held == lock) {
            Some(position) => {
                self.locks.remove(position);
                true
            }
            None => false,
        }
    }
}

/// Bookkeeping of a live capture session
#[derive(Debug, Clone, Default)]
pub struct ExecutionState {
    threads: HashMap<u64, ThreadState>,
    visited: HashSet<ContourId>,
    pending_arguments: HashMap<ContourId, Vec<(String, ValueId)>>,
    observed: HashMap<ContourId, HashMap<String, ValueId>>,
    object_contours: HashMap<u64, ContourId>,
    contour_objects: HashMap<ContourId, u64>,
}

impl ExecutionState {
    /// Create empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// State of a thread, if observed
    pub fn thread(&self, thread_id: u64) -> Option<&ThreadState> {
        self.threads.get(&thread_id)
    }

    /// State of a thread, if observed (mutable)
    pub fn thread_mut(&mut self, thread_id: u64) -> Option<&mut ThreadState> {
        self.threads.get_mut(&thread_id)
    }

    /// State of a thread, created on first observation
    pub fn ensure_thread(&mut self, thread_id: u64, thread: ValueId) -> &mut ThreadState {
        self.threads.entry(thread_id).or_insert_with(|| ThreadState::new(thread))
    }

    /// Forget a thread
    pub fn remove_thread(&mut self, thread_id: u64) -> Option<ThreadState> {
        self.threads.remove(&thread_id)
    }

    /// Ids of all observed threads
    pub fn thread_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.threads.keys().copied()
    }

    /// Top frame of a thread
    pub fn top_frame(&self, thread_id: u64) -> Option<&Frame> {
        self.thread(thread_id).and_then(ThreadState::top)
    }

    /// Call stack depth of a thread (0 when unobserved)
    pub fn depth(&self, thread_id: u64) -> usize {
        self.thread(thread_id).map_or(0, ThreadState::depth)
    }

    /// Mark a method contour visited. Returns `true` the first time only.
    pub fn mark_visited(&mut self, contour: ContourId) -> bool {
        self.visited.insert(contour)
    }

    /// Whether the method contour's arguments were materialized
    pub fn is_visited(&self, contour: ContourId) -> bool {
        self.visited.contains(&contour)
    }

    /// Remember the arguments of a method contour until its first visit
    pub fn set_pending_arguments(&mut self, contour: ContourId, arguments: Vec<(String, ValueId)>) {
        self.pending_arguments.insert(contour, arguments);
    }

    /// Take the arguments of a method contour
    pub fn take_pending_arguments(&mut self, contour: ContourId) -> Vec<(String, ValueId)> {
        self.pending_arguments.remove(&contour).unwrap_or_default()
    }

    /// Record the value of a variable. Returns whether it changed.
    pub fn observe(&mut self, contour: ContourId, name: &str, value: ValueId) -> bool {
        let variables = self.observed.entry(contour).or_default();
        variables.insert(name.to_string(), value) != Some(value)
    }

    /// Last observed value of a variable
    pub fn observed(&self, contour: ContourId, name: &str) -> Option<ValueId> {
        self.observed.get(&contour).and_then(|variables| variables.get(name)).copied()
    }

    /// Names of all observed variables of a contour, sorted
    pub fn observed_names(&self, contour: ContourId) -> Vec<String> {
        self.observed
            .get(&contour)
            .map(|variables| variables.keys().cloned().sorted().collect())
            .unwrap_or_default()
    }

    /// Forget one observed variable
    pub fn forget(&mut self, contour: ContourId, name: &str) -> Option<ValueId> {
        self.observed.get_mut(&contour).and_then(|variables| variables.remove(name))
    }

    /// Forget everything recorded for a closed method contour
    pub fn close_contour(&mut self, contour: ContourId) {
        self.observed.remove(&contour);
        self.pending_arguments.remove(&contour);
    }

    /// Associate a target object id with its contour
    pub fn bind_object(&mut self, oid: u64, contour: ContourId) {
        if let Some(previous) = self.object_contours.insert(oid, contour) {
            self.contour_objects.remove(&previous);
        }
        self.contour_objects.insert(contour, oid);
    }

    /// Contour of a live target object
    pub fn contour_of(&self, oid: u64) -> Option<ContourId> {
        self.object_contours.get(&oid).copied()
    }

    /// Target object id of a contour
    pub fn oid_of(&self, contour: ContourId) -> Option<u64> {
        self.contour_objects.get(&contour).copied()
    }

    /// Dissociate a collected object. Returns its contour.
    pub fn unbind_object(&mut self, oid: u64) -> Option<ContourId> {
        let contour = self.object_contours.remove(&oid)?;
        self.contour_objects.remove(&contour);
        Some(contour)
    }

    /// Clear all state
    pub fn reset(&mut self) {
        self.threads.clear();
        self.visited.clear();
        self.pending_arguments.clear();
        self.observed.clear();
        self.object_contours.clear();
        self.contour_objects.clear();
    }
}
