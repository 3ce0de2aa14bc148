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

//! Translation of live notifications into trace events
//!
//! The [`EventDispatcher`] is the live producer of an [`ExecutionModel`]. Each
//! [`Notification`] is translated into zero or more events which are appended
//! as one batch. Anything the instrumentation does not signal directly is
//! inferred here:
//!
//! - object creation, at the first observation of an in-model object
//! - method entry, when the new frame is first visited
//! - returns, attributed to the next event in the caller's frame
//! - catches, at the first step in the catching frame
//!
//! Notifications that contradict the tracked call stacks (e.g. an exit on an
//! empty stack) are logged and ignored, leaving the state untouched.

use std::sync::Arc;

use contour_common::types::{
    ContourId, EventOrigin, LockOperation, MemberKind, MethodKey, NewEvent, TypeKind, TypeNode,
    ValueId,
};
use tracing::{debug, error, trace, warn};

use crate::{
    AccessorKind, EngineConfig, EventFactory, ExecutionModel, ExecutionState, FieldInfo, Frame,
    LocalVariable, Location, MethodInfo, ModelError, ModelFilter, ModelStore, Notification,
    ObjectRef, PendingReturn, RawValue, ResolverChain, SyntheticAccessor, ThreadRef, ThreadState,
    TypeInfo, TypeRegistry,
};

/// Live producer feeding an [`ExecutionModel`] from target notifications
#[derive(Debug)]
pub struct EventDispatcher {
    model: Arc<ExecutionModel>,
    filter: Arc<dyn ModelFilter>,
    config: EngineConfig,
    state: ExecutionState,
    system_exited: bool,
}

impl EventDispatcher {
    /// Create a dispatcher with the default configuration
    pub fn new(model: Arc<ExecutionModel>, filter: Arc<dyn ModelFilter>) -> Self {
        Self::with_config(model, filter, EngineConfig::default())
    }

    /// Create a dispatcher with an explicit configuration
    pub fn with_config(
        model: Arc<ExecutionModel>,
        filter: Arc<dyn ModelFilter>,
        config: EngineConfig,
    ) -> Self {
        Self { model, filter, config, state: ExecutionState::new(), system_exited: false }
    }

    /// The model being fed
    pub fn model(&self) -> &Arc<ExecutionModel> {
        &self.model
    }

    /// Current capture bookkeeping
    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    /// The configuration in use
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Clear capture bookkeeping before re-attaching to a target
    pub fn reset(&mut self) {
        self.state.reset();
        self.system_exited = false;
    }

    /// Translate one notification and append the resulting events.
    /// Returns the number of appended events.
    pub fn dispatch(&mut self, notification: Notification) -> Result<usize, ModelError> {
        if self.model.is_done() {
            return Err(ModelError::Closed);
        }
        if let Some(thread) = notification.thread() {
            if !self.filter.accepts_thread(thread) {
                trace!(thread = thread.id, "ignoring notification on filtered thread");
                return Ok(0);
            }
        }

        trace!(kind = notification.name(), "dispatching notification");
        let model = self.model.clone();
        let mut events = Vec::new();
        model.with_store_mut(|store, resolver| {
            Translation {
                store,
                resolver,
                runtime: model.runtime_types(),
                filter: self.filter.as_ref(),
                config: &self.config,
                state: &mut self.state,
                system_exited: &mut self.system_exited,
                out: &mut events,
            }
            .translate(notification);
        });

        model.append(events)
    }

    /// Dispatch notifications in order. Stops at the first append failure.
    pub fn dispatch_all(
        &mut self,
        notifications: impl IntoIterator<Item = Notification>,
    ) -> Result<usize, ModelError> {
        let mut appended = 0;
        for notification in notifications {
            appended += self.dispatch(notification)?;
        }
        Ok(appended)
    }
}

fn system_origin() -> EventOrigin {
    EventOrigin::new(ValueId::SYSTEM_THREAD, ValueId::NULL)
}

fn method_key(method: &MethodInfo) -> MethodKey {
    MethodKey::new(&method.type_name, &method.name, &method.parameter_types, &method.return_type)
}

/// Translation of a single notification, with the stores locked
struct Translation<'a> {
    store: &'a mut ModelStore,
    resolver: &'a ResolverChain,
    runtime: &'a TypeRegistry,
    filter: &'a dyn ModelFilter,
    config: &'a EngineConfig,
    state: &'a mut ExecutionState,
    system_exited: &'a mut bool,
    out: &'a mut Vec<NewEvent>,
}

impl Translation<'_> {
    fn translate(mut self, notification: Notification) {
        match notification {
            Notification::VmStart { thread } => {
                *self.system_exited = false;
                let origin = self.thread_origin(&thread);
                self.out.push(EventFactory::system_start(origin));
            }
            Notification::VmDeath | Notification::VmDisconnect => self.system_exit(),
            Notification::ThreadStart { thread } => {
                self.thread_value(&thread);
            }
            Notification::ThreadDeath { thread } => self.thread_death(&thread),
            Notification::ClassPrepare { thread, type_info } => {
                self.class_prepare(&thread, type_info)
            }
            Notification::MethodEntry { thread, location, method, receiver, arguments } => {
                self.method_entry(&thread, &location, &method, receiver.as_ref(), &arguments)
            }
            Notification::MethodExit { thread, location, method, return_value } => {
                self.method_exit(&thread, &location, &method, return_value.as_ref())
            }
            Notification::FieldAccess { thread, location, object, field, value } => self.field(
                &thread,
                &location,
                object.as_ref(),
                &field,
                &value,
                AccessorKind::Read,
            ),
            Notification::FieldModify { thread, location, object, field, value } => self.field(
                &thread,
                &location,
                object.as_ref(),
                &field,
                &value,
                AccessorKind::Write,
            ),
            Notification::ArrayStore { thread, location, array, index, value } => {
                self.array_store(&thread, &location, &array, index, &value)
            }
            Notification::Step { thread, location, locals } => {
                self.step(&thread, &location, &locals)
            }
            Notification::Exception { thread, location, exception, catch_location } => {
                self.exception(&thread, &location, &exception, catch_location.as_ref())
            }
            Notification::Monitor { thread, location, lock, operation } => {
                self.monitor(&thread, &location, &lock, operation)
            }
            Notification::ObjectCollected { object } => self.object_collected(&object),
            Notification::Unrecognized { name } => {
                warn!(%name, "ignoring unrecognized notification")
            }
        }
    }

    fn thread_value(&mut self, thread: &ThreadRef) -> ValueId {
        let value = self.store.values.create_thread(thread.id, thread.name.as_str());
        self.state.ensure_thread(thread.id, value);
        value
    }

    fn thread_origin(&mut self, thread: &ThreadRef) -> EventOrigin {
        EventOrigin::new(self.thread_value(thread), ValueId::NULL)
    }

    fn origin(&mut self, thread: &ThreadRef, location: &Location) -> EventOrigin {
        let thread = self.thread_value(thread);
        let line = self.store.values.create_line(location.file.as_str(), location.line);
        EventOrigin::new(thread, line)
    }

    fn static_contour(&mut self, type_name: &str, origin: EventOrigin) -> ContourId {
        self.store.contours.retrieve_static_contour(self.resolver, type_name, origin, self.out)
    }

    /// Contour of an in-model object, inferring its creation on first sight
    fn object_contour(&mut self, object: &ObjectRef, origin: EventOrigin) -> Option<ContourId> {
        if !self.filter.accepts_type(&object.type_name) {
            return None;
        }

        if let Some(contour) = self.state.contour_of(object.oid) {
            let same_type = self
                .store
                .contours
                .get(contour)
                .is_some_and(|existing| existing.type_name() == object.type_name);
            if same_type {
                return Some(contour);
            }
            debug!(oid = object.oid, type_name = %object.type_name, "object id reused by another type");
        }

        let parent = self.static_contour(&object.type_name, origin);
        let oid = self.store.contours.free_oid(&object.type_name, object.oid);
        let contour = match self.store.contours.create_object_contour(
            &object.type_name,
            oid,
            object.array_length,
            Some(parent),
        ) {
            Ok(contour) => contour,
            Err(err) => {
                error!(%err, "failed to create object contour");
                return None;
            }
        };

        self.out.push(EventFactory::new_object(origin, contour));
        self.state.bind_object(object.oid, contour);
        Some(contour)
    }

    fn value_of(&mut self, value: &RawValue, origin: EventOrigin) -> ValueId {
        match value {
            RawValue::Null => ValueId::NULL,
            RawValue::Uninitialized => ValueId::UNINITIALIZED,
            RawValue::Primitive(text) => self.store.values.create_primitive(text.as_str()),
            RawValue::Object(object) => match self.object_contour(object, origin) {
                Some(contour) => self.store.values.create_contour_reference(contour),
                None => self.store.values.create_resolved(
                    format!("{}@{:x}", object.type_name, object.oid),
                    object.type_name.as_str(),
                ),
            },
        }
    }

    fn set_member(&mut self, contour: ContourId, name: &str, kind: MemberKind, value: ValueId) {
        if let Some(contour) = self.store.contours.get_mut(contour) {
            contour.set_member(name, kind, value);
        }
    }

    /// Emit what must precede the next event in the thread's top frame: the
    /// pending returned event, then the arguments and entry of an unvisited
    /// method frame
    fn prepare(&mut self, thread_id: u64, origin: EventOrigin) {
        let Some(thread) = self.state.thread_mut(thread_id) else {
            return;
        };
        if let Some(pending) = thread.take_pending_return() {
            self.out.push(EventFactory::method_returned(origin, pending.returner, pending.value));
        }

        let Some(contour) = thread.top().and_then(Frame::contour) else {
            return;
        };
        if !self.state.mark_visited(contour) {
            return;
        }

        for (name, value) in self.state.take_pending_arguments(contour) {
            self.state.observe(contour, &name, value);
            self.set_member(contour, &name, MemberKind::Argument, value);
            self.out.push(EventFactory::var_assign(origin, contour, name, value));
        }
        self.out.push(EventFactory::method_entered(origin, contour));
    }

    fn push_frame(&mut self, thread_id: u64, frame: Frame) {
        if let Some(thread) = self.state.thread_mut(thread_id) {
            thread.push(frame);
        }
    }

    /// Pop the top frame, queueing `returned` if control goes back to an
    /// in-model frame
    fn pop_frame(&mut self, thread_id: u64, returned: Option<PendingReturn>) {
        let Some(thread) = self.state.thread_mut(thread_id) else {
            return;
        };
        thread.pop();
        let back_in_model = matches!(thread.top(), Some(Frame::Method { .. }));
        if let (Some(returned), true) = (returned, back_in_model) {
            thread.set_pending_return(returned);
        }
    }

    fn system_exit(&mut self) {
        if std::mem::replace(&mut *self.system_exited, true) {
            debug!("target already exited");
            return;
        }
        self.out.push(EventFactory::system_exit(system_origin()));
    }

    fn thread_death(&mut self, thread: &ThreadRef) {
        let origin = self.thread_origin(thread);
        let Some(mut state) = self.state.remove_thread(thread.id) else {
            return;
        };

        if let Some(pending) = state.take_pending_return() {
            self.out.push(EventFactory::method_returned(origin, pending.returner, pending.value));
        }
        if state.depth() > 0 {
            debug!(thread = thread.id, depth = state.depth(), "closing frames of a dead thread");
        }
        while let Some(frame) = state.pop() {
            if let Frame::Method { contour, .. } = frame {
                self.out.push(EventFactory::method_exit(origin, contour, None));
                self.state.close_contour(contour);
            }
        }
        self.out.push(EventFactory::thread_end(origin));
    }

    fn class_prepare(&mut self, thread: &ThreadRef, type_info: TypeInfo) {
        let mut node = if type_info.is_interface {
            TypeNode::interface(type_info.name.as_str())
        } else {
            TypeNode::class(type_info.name.as_str())
        };
        if type_info.name.ends_with("[]") {
            node.kind = TypeKind::Array;
        }
        node.supertype = type_info.supertype.filter(|supertype| self.filter.accepts_type(supertype));
        self.runtime.register_type(node);

        if self.filter.accepts_type(&type_info.name) {
            let origin = self.thread_origin(thread);
            self.static_contour(&type_info.name, origin);
        }
    }

    fn method_entry(
        &mut self,
        thread: &ThreadRef,
        location: &Location,
        method: &MethodInfo,
        receiver: Option<&ObjectRef>,
        arguments: &[LocalVariable],
    ) {
        let origin = self.origin(thread, location);
        let key = method_key(method);
        let top = self.state.top_frame(thread.id).cloned();

        if self.config.collapse_synthetic_accessors {
            if let Some(accessor) = &method.accessor {
                self.enter_accessor(thread.id, origin, key, accessor, receiver, arguments);
                return;
            }
        }

        if !self.filter.accepts_method(&method.type_name, &method.name) {
            // Only calls made by in-model code are visible in the trace
            let announced = if let Some(Frame::Method { contour, .. }) = top {
                self.prepare(thread.id, origin);
                let caller = self.store.values.create_method_contour_reference(contour);
                let target = self.store.values.create_method_key_reference(key.clone());
                self.out.push(EventFactory::method_call(origin, caller, target));
                true
            } else {
                false
            };
            self.push_frame(thread.id, Frame::OutOfModel { method: key, announced });
            return;
        }

        self.prepare(thread.id, origin);
        let first_call = self.state.thread(thread.id).map_or(true, |state| !state.has_called());
        let caller = match &top {
            _ if first_call => ValueId::SYSTEM_CALLER,
            None => ValueId::SYSTEM_CALLER,
            Some(Frame::Method { contour, .. }) => {
                self.store.values.create_method_contour_reference(*contour)
            }
            Some(frame) => self.store.values.create_method_key_reference(frame.method().clone()),
        };

        let receiver = receiver.filter(|_| !method.is_static);
        let parent = match receiver.and_then(|object| self.object_contour(object, origin)) {
            Some(contour) => contour,
            None => self.static_contour(&method.type_name, origin),
        };
        let arguments: Vec<(String, ValueId)> = arguments
            .iter()
            .map(|argument| (argument.name.clone(), self.value_of(&argument.value, origin)))
            .collect();

        let contour = self.store.contours.create_method_contour(key.clone(), origin.thread, Some(parent));
        let target = self.store.values.create_method_contour_reference(contour);
        self.out.push(EventFactory::method_call(origin, caller, target));
        self.state.set_pending_arguments(contour, arguments);
        self.push_frame(thread.id, Frame::Method { contour, method: key });

        trace!(thread = thread.id, %contour, depth = self.state.depth(thread.id), "entered method");
    }

    fn enter_accessor(
        &mut self,
        thread_id: u64,
        origin: EventOrigin,
        method: MethodKey,
        accessor: &SyntheticAccessor,
        receiver: Option<&ObjectRef>,
        arguments: &[LocalVariable],
    ) {
        self.prepare(thread_id, origin);

        let owner = if accessor.is_static {
            self.filter
                .accepts_type(&accessor.owner_type)
                .then(|| self.static_contour(&accessor.owner_type, origin))
        } else {
            // Accessors of instance fields take the instance as first argument
            let object = receiver.or_else(|| {
                arguments.iter().find_map(|argument| match &argument.value {
                    RawValue::Object(object) => Some(object),
                    _ => None,
                })
            });
            object.and_then(|object| self.object_contour(object, origin))
        };

        let written = match accessor.kind {
            AccessorKind::Write => {
                arguments.last().map(|argument| self.value_of(&argument.value, origin))
            }
            AccessorKind::Read => None,
        };

        self.push_frame(
            thread_id,
            Frame::Accessor {
                method,
                owner,
                field: accessor.field.clone(),
                access: accessor.kind,
                written,
            },
        );
    }

    fn method_exit(
        &mut self,
        thread: &ThreadRef,
        location: &Location,
        method: &MethodInfo,
        return_value: Option<&RawValue>,
    ) {
        let key = method_key(method);
        let Some(top) = self.state.top_frame(thread.id).cloned() else {
            warn!(thread = thread.id, method = %key, "method exit on an empty call stack, ignoring");
            return;
        };
        if top.method() != &key {
            warn!(
                thread = thread.id,
                method = %key,
                top = %top.method(),
                "method exit does not match the top frame, ignoring"
            );
            return;
        }

        let origin = self.origin(thread, location);
        match top {
            Frame::Method { contour, .. } => {
                self.prepare(thread.id, origin);
                let returned = return_value.map(|value| self.value_of(value, origin));
                self.out.push(EventFactory::method_exit(origin, contour, returned));
                let returner = self.store.values.create_method_contour_reference(contour);
                self.state.close_contour(contour);
                self.pop_frame(thread.id, Some(PendingReturn { returner, value: returned }));
            }
            Frame::OutOfModel { method, announced: true } => {
                let returned = return_value.map(|value| self.value_of(value, origin));
                let returner = self.store.values.create_method_key_reference(method);
                self.pop_frame(thread.id, Some(PendingReturn { returner, value: returned }));
            }
            Frame::OutOfModel { announced: false, .. } => self.pop_frame(thread.id, None),
            Frame::Accessor { owner, field, access, written, .. } => {
                self.pop_frame(thread.id, None);
                let Some(owner) = owner else {
                    return;
                };
                let value = match access {
                    AccessorKind::Read => return_value.map(|value| self.value_of(value, origin)),
                    AccessorKind::Write => written,
                }
                .unwrap_or(ValueId::UNINITIALIZED);
                self.field_event(origin, owner, &field, MemberKind::Field, value, access);
            }
        }
    }

    fn field_event(
        &mut self,
        origin: EventOrigin,
        owner: ContourId,
        field: &str,
        kind: MemberKind,
        value: ValueId,
        access: AccessorKind,
    ) {
        self.set_member(owner, field, kind, value);
        let event = match access {
            AccessorKind::Read => EventFactory::field_read(origin, owner, field, value),
            AccessorKind::Write => EventFactory::field_write(origin, owner, field, value),
        };
        self.out.push(event);
    }

    fn field(
        &mut self,
        thread: &ThreadRef,
        location: &Location,
        object: Option<&ObjectRef>,
        field: &FieldInfo,
        value: &RawValue,
        access: AccessorKind,
    ) {
        // Accesses inside a collapsed accessor are represented by its event
        if matches!(self.state.top_frame(thread.id), Some(Frame::Accessor { .. })) {
            return;
        }
        if !self.filter.accepts_type(&field.type_name) {
            return;
        }

        let origin = self.origin(thread, location);
        self.prepare(thread.id, origin);
        let owner = match object.filter(|_| !field.is_static) {
            Some(object) => {
                let Some(contour) = self.object_contour(object, origin) else {
                    return;
                };
                contour
            }
            None => self.static_contour(&field.type_name, origin),
        };
        let value = self.value_of(value, origin);
        self.field_event(origin, owner, &field.name, MemberKind::Field, value, access);
    }

    fn array_store(
        &mut self,
        thread: &ThreadRef,
        location: &Location,
        array: &ObjectRef,
        index: usize,
        value: &RawValue,
    ) {
        if matches!(self.state.top_frame(thread.id), Some(Frame::Accessor { .. })) {
            return;
        }

        let origin = self.origin(thread, location);
        self.prepare(thread.id, origin);
        let Some(contour) = self.object_contour(array, origin) else {
            return;
        };
        let value = self.value_of(value, origin);
        let cell = format!("[{index}]");
        self.field_event(origin, contour, &cell, MemberKind::ArrayCell, value, AccessorKind::Write);
    }

    fn step(&mut self, thread: &ThreadRef, location: &Location, locals: &[LocalVariable]) {
        let Some(Frame::Method { contour, .. }) = self.state.top_frame(thread.id).cloned() else {
            trace!(thread = thread.id, "step outside of an in-model frame");
            return;
        };
        if !self.filter.accepts_location(location) {
            trace!(thread = thread.id, file = %location.file, line = location.line, "step filtered");
            return;
        }

        let origin = self.origin(thread, location);
        self.prepare(thread.id, origin);

        let locals: Vec<(String, ValueId)> = locals
            .iter()
            .map(|local| (local.name.clone(), self.value_of(&local.value, origin)))
            .collect();

        if let Some(exception) = self.state.thread_mut(thread.id).and_then(ThreadState::take_exception)
        {
            let variable = locals
                .iter()
                .find(|(_, value)| *value == exception)
                .map(|(name, _)| name.clone());
            self.out.push(EventFactory::exception_catch(origin, exception, Some(contour), variable));
        }

        for (name, value) in &locals {
            let changed = self.state.observe(contour, name, *value);
            if changed || !self.config.suppress_redundant_assignments {
                let kind = self
                    .store
                    .contours
                    .get(contour)
                    .and_then(|owner| owner.member(name))
                    .map_or(MemberKind::Local, |member| member.kind);
                self.set_member(contour, name, kind, *value);
                self.out.push(EventFactory::var_assign(origin, contour, name.as_str(), *value));
            }
        }

        // Arguments stay in scope for the whole invocation
        for name in self.state.observed_names(contour) {
            let is_local = self
                .store
                .contours
                .get(contour)
                .and_then(|contour| contour.member(&name))
                .is_some_and(|member| member.kind == MemberKind::Local);
            if !is_local || locals.iter().any(|(visible, _)| *visible == name) {
                continue;
            }
            self.state.forget(contour, &name);
            if let Some(contour) = self.store.contours.get_mut(contour) {
                contour.remove_member(&name);
            }
            self.out.push(EventFactory::var_delete(origin, contour, name));
        }

        self.out.push(EventFactory::line_step(origin));
    }

    fn exception(
        &mut self,
        thread: &ThreadRef,
        location: &Location,
        exception: &ObjectRef,
        catch_location: Option<&Location>,
    ) {
        let Some(top) = self.state.top_frame(thread.id).cloned() else {
            trace!(thread = thread.id, "exception outside of any tracked frame");
            return;
        };
        let in_model = self.state.thread(thread.id).is_some_and(|state| {
            state.frames().iter().any(|frame| matches!(frame, Frame::Method { .. }))
        });
        if !in_model {
            return;
        }

        let origin = self.origin(thread, location);
        self.prepare(thread.id, origin);
        let thrower = match &top {
            Frame::Method { contour, .. } => {
                self.store.values.create_method_contour_reference(*contour)
            }
            frame => self.store.values.create_method_key_reference(frame.method().clone()),
        };
        let exception = self.value_of(&RawValue::Object(exception.clone()), origin);
        let frames_popped = catch_location.map_or(true, |catch| {
            catch.type_name != top.method().type_name()
                || catch.method_name != top.method().method_name()
        });
        self.out.push(EventFactory::exception_throw(origin, exception, thrower, frames_popped));

        let caught = catch_location
            .filter(|catch| self.filter.accepts_method(&catch.type_name, &catch.method_name))
            .map(|_| exception);
        if let Some(state) = self.state.thread_mut(thread.id) {
            state.set_exception(caught);
        }
    }

    fn monitor(
        &mut self,
        thread: &ThreadRef,
        location: &Location,
        lock: &ObjectRef,
        operation: LockOperation,
    ) {
        let origin = self.origin(thread, location);
        self.prepare(thread.id, origin);
        let lock = self.value_of(&RawValue::Object(lock.clone()), origin);

        if let Some(state) = self.state.thread_mut(thread.id) {
            match operation {
                LockOperation::Acquire => state.acquire(lock),
                LockOperation::Release => {
                    if !state.release(lock) {
                        debug!(thread = thread.id, "released a monitor that was not held");
                    }
                }
                LockOperation::Wait | LockOperation::Notified => {}
            }
        }
        self.out.push(EventFactory::lock(origin, operation, lock));
    }

    fn object_collected(&mut self, object: &ObjectRef) {
        let Some(contour) = self.state.unbind_object(object.oid) else {
            trace!(oid = object.oid, "collected object was never observed");
            return;
        };
        self.out.push(EventFactory::destroy(system_origin(), contour));
    }
}
