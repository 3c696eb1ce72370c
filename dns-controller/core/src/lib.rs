#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Core value types shared by the registry and the nameserver publishers.

mod record;

pub use self::record::{Record, RecordKey, RecordSet, DEFAULT_PORT};

use std::fmt;

/// Identifies a namespaced cluster resource.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

// === impl ResourceId ===

impl ResourceId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
