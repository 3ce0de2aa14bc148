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

//! Model filters decide which types, methods, locations and threads are part
//! of the model. Anything rejected is represented out-of-model.

use std::fmt;

use crate::{Location, ThreadRef};

/// Decides what belongs to the model
pub trait ModelFilter: Send + Sync + fmt::Debug {
    /// Whether instances and static state of the type are modelled
    fn accepts_type(&self, type_name: &str) -> bool;

    /// Whether invocations of the method are modelled
    fn accepts_method(&self, type_name: &str, _method_name: &str) -> bool {
        self.accepts_type(type_name)
    }

    /// Whether a step to this location produces a line step
    fn accepts_location(&self, location: &Location) -> bool {
        location.line > 0 && self.accepts_method(&location.type_name, &location.method_name)
    }

    /// Whether events of the thread are modelled
    fn accepts_thread(&self, _thread: &ThreadRef) -> bool {
        true
    }
}

/// Accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ModelFilter for AcceptAll {
    fn accepts_type(&self, _type_name: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    Prefix(String),
    Exact(String),
}

impl Pattern {
    fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => Self::Prefix(prefix.to_string()),
            None => Self::Exact(pattern.to_string()),
        }
    }

    fn matches(&self, type_name: &str) -> bool {
        match self {
            Self::Prefix(prefix) => type_name.starts_with(prefix.as_str()),
            Self::Exact(name) => type_name == name,
        }
    }
}

/// Rejects types matching any of a list of patterns
///
/// `pkg.*` matches every type whose name starts with `pkg.`; any other pattern
/// matches exactly. Array types are judged by their element type.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    patterns: Vec<Pattern>,
}

impl ExclusionFilter {
    /// Build a filter from exclusion patterns
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self { patterns: patterns.iter().map(|p| Pattern::parse(p.as_ref())).collect() }
    }

    /// Number of patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the filter excludes nothing
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl ModelFilter for ExclusionFilter {
    fn accepts_type(&self, type_name: &str) -> bool {
        let mut element = type_name;
        while let Some(inner) = element.strip_suffix("[]") {
            element = inner;
        }
        !self.patterns.iter().any(|pattern| pattern.matches(element))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_and_exact_patterns() {
        let filter = ExclusionFilter::new(&["java.*", "com.acme.Generated"]);
        assert!(!filter.accepts_type("java.lang.String"));
        assert!(!filter.accepts_type("java.util.ArrayList[]"));
        assert!(!filter.accepts_type("com.acme.Generated"));
        assert!(filter.accepts_type("com.acme.GeneratedTwo"));
        assert!(filter.accepts_type("javax2.Foo"));
        assert!(filter.accepts_type("int[]"));
    }

    #[test]
    fn test_location_requires_a_line() {
        let filter = AcceptAll;
        assert!(filter.accepts_location(&Location::new("Main.java", 3, "Main", "main")));
        assert!(!filter.accepts_location(&Location::new("Main.java", 0, "Main", "main")));

        let filter = ExclusionFilter::new(&["java.*"]);
        assert!(!filter.accepts_location(&Location::new("List.java", 10, "java.util.List", "add")));
    }

    #[test]
    fn test_threads_are_accepted_by_default() {
        let filter = ExclusionFilter::new::<&str>(&[]);
        assert!(filter.is_empty());
        assert!(filter.accepts_thread(&ThreadRef::new(1, "main")));
    }
}
