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

use std::{collections::BTreeMap, fmt, ops::Deref};

use serde::{Deserialize, Serialize};

use crate::types::{Event, EventId, ValueId};

/// Append-only sequence of committed events
///
/// Event ids are contiguous from [`EventId::FIRST`], so an event's position in
/// the sequence is derived from its id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trace {
    inner: Vec<Event>,
}

impl Deref for Trace {
    type Target = [Event];

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

// IntoIterator for owned Trace (moves out its contents)
impl IntoIterator for Trace {
    type Item = Event;
    type IntoIter = std::vec::IntoIter<Event>;
    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

// IntoIterator for &Trace (shared iteration)
impl<'a> IntoIterator for &'a Trace {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;
    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl Trace {
    /// Create a new empty trace
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert trace to serde_json::Value for export
    pub fn to_json_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Id the next appended event must carry
    pub fn next_id(&self) -> EventId {
        self.inner.last().map_or(EventId::FIRST, |event| event.id().next())
    }

    /// Append a committed event. Returns `false`, leaving the trace untouched,
    /// when the event does not carry [`Trace::next_id`].
    pub fn push(&mut self, event: Event) -> bool {
        if event.id() != self.next_id() {
            return false;
        }
        self.inner.push(event);
        true
    }

    /// Get an event by id
    pub fn get(&self, id: EventId) -> Option<&Event> {
        if id < EventId::FIRST {
            return None;
        }
        self.inner.get(id.index())
    }

    /// Events with an id greater than or equal to `from`
    pub fn since(&self, from: EventId) -> &[Event] {
        let start = from.max(EventId::FIRST).index().min(self.inner.len());
        &self.inner[start..]
    }

    /// Events attributed to the given thread value
    pub fn events_on_thread(&self, thread: ValueId) -> impl Iterator<Item = &Event> {
        self.inner.iter().filter(move |event| event.thread() == thread)
    }

    /// Drop every event
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Count events per kind name
    pub fn summary(&self) -> TraceSummary {
        let mut by_kind = BTreeMap::new();
        for event in &self.inner {
            *by_kind.entry(event.kind().name()).or_insert(0) += 1;
        }
        TraceSummary { total: self.inner.len(), by_kind }
    }
}

/// Per-kind event counts of a trace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraceSummary {
    /// Total number of events
    pub total: usize,
    /// Number of events per kind name
    pub by_kind: BTreeMap<&'static str, usize>,
}

impl fmt::Display for TraceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Events: {}", self.total)?;
        for (kind, count) in &self.by_kind {
            writeln!(f, "  {kind:<16} {count}")?;
        }
        Ok(())
    }
}
