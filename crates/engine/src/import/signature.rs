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

//! Method signatures of recorded calls: `Type#name(p1,p2):ReturnType`

use std::fmt;

use contour_common::types::MethodKey;

/// A parsed method signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Declaring type
    pub type_name: String,
    /// Simple method name
    pub method_name: String,
    /// Parameter types
    pub parameter_types: Vec<String>,
    /// Return type (`void` when omitted)
    pub return_type: String,
}

impl Signature {
    /// Parse a signature. Returns `None` when the text does not follow the
    /// encoding.
    pub fn parse(text: &str) -> Option<Self> {
        let (type_name, rest) = text.trim().split_once('#')?;
        let (method_name, rest) = rest.split_once('(')?;
        let (parameters, rest) = rest.split_once(')')?;
        let return_type = match rest.trim() {
            "" => "void",
            ret => ret.strip_prefix(':')?.trim(),
        };

        let type_name = type_name.trim();
        let method_name = method_name.trim();
        if type_name.is_empty() || method_name.is_empty() || return_type.is_empty() {
            return None;
        }

        let parameter_types = parameters
            .split(',')
            .map(str::trim)
            .filter(|parameter| !parameter.is_empty())
            .map(str::to_string)
            .collect();

        Some(Self {
            type_name: type_name.to_string(),
            method_name: method_name.to_string(),
            parameter_types,
            return_type: return_type.to_string(),
        })
    }

    /// Canonical key of the signed method
    pub fn key(&self) -> MethodKey {
        MethodKey::new(&self.type_name, &self.method_name, &self.parameter_types, &self.return_type)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
