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

//! Contour Engine - execution and contour reconstruction
//!
//! Turns low-level execution signals of a running (or recorded) program into a
//! navigable model of program state: loaded types, live objects, active method
//! invocations and the append-only trace of state transitions.
//!
//! Two producers feed an [`ExecutionModel`]:
//! - [`EventDispatcher`] translates live [`Notification`]s, inferring what the
//!   instrumentation does not signal (object creation, returns, catches).
//! - [`TraceImporter`] replays a recorded XML log into the same model.

pub mod capture;
pub use capture::*;

pub mod config;
pub use config::*;

pub mod factory;
pub use factory::*;

pub mod filter;
pub use filter::*;

pub mod import;
pub use import::*;

pub mod model;
pub use model::*;

pub mod resolver;
pub use resolver::*;

pub mod store;
pub use store::*;
