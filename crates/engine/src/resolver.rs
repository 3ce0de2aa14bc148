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

//! Lazy resolution of type and method identifiers to static model nodes
//!
//! Resolution goes through an ordered [`ResolverChain`]: each
//! [`StaticResolver`] is offered the identifier in turn and the first one that
//! knows it wins. Positive answers are cached by the chain; misses are not, so
//! a resolver that learns about a type later (e.g. the runtime registry fed by
//! class-prepare notifications) is consulted again.

use std::{fmt, sync::Arc};

use contour_common::types::{MethodNode, TypeNode};
use dashmap::DashMap;
use tracing::trace;

/// A source of static model information
pub trait StaticResolver: Send + Sync + fmt::Debug {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    /// Resolve a type by fully qualified name
    fn resolve_type(&self, type_name: &str) -> Option<TypeNode>;

    /// Resolve a method by declaring type and simple name
    fn resolve_method(&self, _type_name: &str, _method_name: &str) -> Option<MethodNode> {
        None
    }
}

/// In-memory resolver that can be fed concurrently
///
/// Used both for statically known types (e.g. from source analysis) and as
/// the runtime registry an execution model learns into.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    name: String,
    types: DashMap<String, TypeNode>,
    methods: DashMap<(String, String), MethodNode>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// Create a registry pre-filled with `types`
    pub fn with_types(name: impl Into<String>, types: impl IntoIterator<Item = TypeNode>) -> Self {
        let registry = Self::new(name);
        for node in types {
            registry.register_type(node);
        }
        registry
    }

    /// Register or replace a type
    pub fn register_type(&self, node: TypeNode) {
        self.types.insert(node.name.clone(), node);
    }

    /// Register or replace a method
    pub fn register_method(&self, node: MethodNode) {
        self.methods.insert((node.type_name.clone(), node.name.clone()), node);
    }

    /// Number of registered types
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Forget everything
    pub fn clear(&self) {
        self.types.clear();
        self.methods.clear();
    }
}

impl StaticResolver for TypeRegistry {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve_type(&self, type_name: &str) -> Option<TypeNode> {
        self.types.get(type_name).map(|node| node.clone())
    }

    fn resolve_method(&self, type_name: &str, method_name: &str) -> Option<MethodNode> {
        self.methods
            .get(&(type_name.to_string(), method_name.to_string()))
            .map(|node| node.clone())
    }
}

/// Ordered list of resolvers tried in sequence
#[derive(Debug, Default)]
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn StaticResolver>>,
    types: DashMap<String, TypeNode>,
    methods: DashMap<(String, String), MethodNode>,
}

impl ResolverChain {
    /// Create a chain trying `resolvers` in order
    pub fn new(resolvers: Vec<Arc<dyn StaticResolver>>) -> Self {
        Self { resolvers, ..Default::default() }
    }

    /// The resolvers, in the order they are consulted
    pub fn resolvers(&self) -> &[Arc<dyn StaticResolver>] {
        &self.resolvers
    }

    /// Resolve a type through the chain
    pub fn resolve_type(&self, type_name: &str) -> Option<TypeNode> {
        if let Some(node) = self.types.get(type_name) {
            return Some(node.clone());
        }

        let (resolver, node) = self
            .resolvers
            .iter()
            .find_map(|resolver| resolver.resolve_type(type_name).map(|node| (resolver, node)))?;
        trace!(type_name, resolver = resolver.name(), "resolved type");
        self.types.insert(type_name.to_string(), node.clone());
        Some(node)
    }

    /// Resolve a method through the chain
    pub fn resolve_method(&self, type_name: &str, method_name: &str) -> Option<MethodNode> {
        let key = (type_name.to_string(), method_name.to_string());
        if let Some(node) = self.methods.get(&key) {
            return Some(node.clone());
        }

        let node = self
            .resolvers
            .iter()
            .find_map(|resolver| resolver.resolve_method(type_name, method_name))?;
        self.methods.insert(key, node.clone());
        Some(node)
    }

    /// Supertype of a type, if both the type and its supertype are known
    pub fn supertype_of(&self, type_name: &str) -> Option<String> {
        self.resolve_type(type_name).and_then(|node| node.supertype)
    }

    /// Drop cached answers
    pub fn clear_cache(&self) {
        self.types.clear();
        self.methods.clear();
    }
}
