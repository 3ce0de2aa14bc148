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

//! Static model nodes produced by type/method resolution

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical text key of a method: `Type#name(p1,p2):ret`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodKey(String);

impl MethodKey {
    /// Build a key from its parts
    pub fn new(
        type_name: &str,
        method_name: &str,
        parameter_types: &[String],
        return_type: &str,
    ) -> Self {
        Self(format!("{type_name}#{method_name}({}):{return_type}", parameter_types.join(",")))
    }

    /// Wrap an already-canonical key text
    pub fn from_canonical(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The key text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Declaring type part of the key
    pub fn type_name(&self) -> &str {
        self.0.split_once('#').map_or(self.0.as_str(), |(ty, _)| ty)
    }

    /// Method name part of the key
    pub fn method_name(&self) -> &str {
        let rest = self.0.split_once('#').map_or("", |(_, rest)| rest);
        rest.split_once('(').map_or(rest, |(name, _)| name)
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of a resolved type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TypeKind {
    /// Regular class
    #[default]
    Class,
    /// Interface type
    Interface,
    /// Array type
    Array,
}

/// Static description of a type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeNode {
    /// Fully qualified type name
    pub name: String,
    /// Fully qualified name of the supertype, if it belongs to the model
    pub supertype: Option<String>,
    /// Kind of the type
    pub kind: TypeKind,
}

impl TypeNode {
    /// A class without a modelled supertype
    pub fn class(name: impl Into<String>) -> Self {
        Self { name: name.into(), supertype: None, kind: TypeKind::Class }
    }

    /// An interface type
    pub fn interface(name: impl Into<String>) -> Self {
        Self { name: name.into(), supertype: None, kind: TypeKind::Interface }
    }

    /// Set the supertype
    pub fn with_supertype(mut self, supertype: impl Into<String>) -> Self {
        self.supertype = Some(supertype.into());
        self
    }
}

/// Static description of a method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodNode {
    /// Declaring type
    pub type_name: String,
    /// Simple method name
    pub name: String,
    /// Parameter type names in declaration order
    pub parameter_types: Vec<String>,
    /// Return type name (`void` for procedures)
    pub return_type: String,
}

impl MethodNode {
    /// Canonical key of this method
    pub fn key(&self) -> MethodKey {
        MethodKey::new(&self.type_name, &self.name, &self.parameter_types, &self.return_type)
    }
}
