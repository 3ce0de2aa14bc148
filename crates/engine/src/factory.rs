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

//! Event construction.
//!
//! Constructors are pure: they neither touch the stores nor assign ids. The
//! referenced contours and values must already exist; ids are assigned by
//! [`ExecutionModel::append`](crate::ExecutionModel::append).

use contour_common::types::{
    ContourId, EventKind, EventOrigin, LockOperation, NewEvent, ValueId,
};

/// Builds [`NewEvent`]s for producers
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFactory;

impl EventFactory {
    fn event(origin: EventOrigin, kind: EventKind) -> NewEvent {
        NewEvent { origin, kind }
    }

    /// Target started
    pub fn system_start(origin: EventOrigin) -> NewEvent {
        Self::event(origin, EventKind::SystemStart)
    }

    /// Target terminated
    pub fn system_exit(origin: EventOrigin) -> NewEvent {
        Self::event(origin, EventKind::SystemExit)
    }

    /// Thread terminated
    pub fn thread_end(origin: EventOrigin) -> NewEvent {
        Self::event(origin, EventKind::ThreadEnd)
    }

    /// Type loaded
    pub fn type_load(origin: EventOrigin, contour: ContourId) -> NewEvent {
        Self::event(origin, EventKind::TypeLoad { contour })
    }

    /// Object allocated
    pub fn new_object(origin: EventOrigin, contour: ContourId) -> NewEvent {
        Self::event(origin, EventKind::NewObject { contour })
    }

    /// Object collected
    pub fn destroy(origin: EventOrigin, contour: ContourId) -> NewEvent {
        Self::event(origin, EventKind::Destroy { contour })
    }

    /// Method called
    pub fn method_call(origin: EventOrigin, caller: ValueId, target: ValueId) -> NewEvent {
        Self::event(origin, EventKind::MethodCall { caller, target })
    }

    /// Callee body entered
    pub fn method_entered(origin: EventOrigin, contour: ContourId) -> NewEvent {
        Self::event(origin, EventKind::MethodEntered { contour })
    }

    /// Method contour closed
    pub fn method_exit(
        origin: EventOrigin,
        contour: ContourId,
        returned: Option<ValueId>,
    ) -> NewEvent {
        Self::event(origin, EventKind::MethodExit { contour, returned })
    }

    /// Control back in the caller's frame
    pub fn method_returned(
        origin: EventOrigin,
        returner: ValueId,
        value: Option<ValueId>,
    ) -> NewEvent {
        Self::event(origin, EventKind::MethodReturned { returner, value })
    }

    /// Field read
    pub fn field_read(
        origin: EventOrigin,
        contour: ContourId,
        field: impl Into<String>,
        value: ValueId,
    ) -> NewEvent {
        Self::event(origin, EventKind::FieldRead { contour, field: field.into(), value })
    }

    /// Field or array cell written
    pub fn field_write(
        origin: EventOrigin,
        contour: ContourId,
        field: impl Into<String>,
        value: ValueId,
    ) -> NewEvent {
        Self::event(origin, EventKind::FieldWrite { contour, field: field.into(), value })
    }

    /// Variable assigned
    pub fn var_assign(
        origin: EventOrigin,
        contour: ContourId,
        variable: impl Into<String>,
        value: ValueId,
    ) -> NewEvent {
        Self::event(origin, EventKind::VarAssign { contour, variable: variable.into(), value })
    }

    /// Variable out of scope
    pub fn var_delete(
        origin: EventOrigin,
        contour: ContourId,
        variable: impl Into<String>,
    ) -> NewEvent {
        Self::event(origin, EventKind::VarDelete { contour, variable: variable.into() })
    }

    /// Exception thrown
    pub fn exception_throw(
        origin: EventOrigin,
        exception: ValueId,
        thrower: ValueId,
        frames_popped: bool,
    ) -> NewEvent {
        Self::event(origin, EventKind::ExceptionThrow { exception, thrower, frames_popped })
    }

    /// Exception caught
    pub fn exception_catch(
        origin: EventOrigin,
        exception: ValueId,
        catcher: Option<ContourId>,
        variable: Option<String>,
    ) -> NewEvent {
        Self::event(origin, EventKind::ExceptionCatch { exception, catcher, variable })
    }

    /// Monitor operation
    pub fn lock(origin: EventOrigin, operation: LockOperation, lock: ValueId) -> NewEvent {
        Self::event(origin, EventKind::Lock { operation, lock })
    }

    /// New source line reached
    pub fn line_step(origin: EventOrigin) -> NewEvent {
        Self::event(origin, EventKind::LineStep)
    }
}
