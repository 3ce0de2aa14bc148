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

//! Contour Common - Shared data model for Contour components
//!
//! This crate provides the types shared by the reconstruction engine and the
//! command line front end: runtime values, contours, trace events, static
//! model nodes, and the logging setup used by every binary and test.

/// Data model types: values, contours, events, identifiers and static model nodes
pub mod types;

/// Logging setup and utilities for consistent logging across Contour components
pub mod logging;

pub use logging::*;
