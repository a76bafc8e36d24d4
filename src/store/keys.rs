//! Store key layout.
//!
//! ```text
//! <root><Category>/<Category>-<name>/<Attribute>
//! /Service/Service-users/Node
//! ```
//! The logical name is recovered by stripping `<root><Category>/<Category>-`
//! and splitting the rest on `/`.

use crate::error::RoutingError;

pub const DEFAULT_ROOT: &str = "/";
pub const SLASH: char = '/';

/// Entity categories stored under the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Router,
    Service,
    Node,
    HealthCheck,
}

impl Category {
    pub fn segment(&self) -> &'static str {
        match self {
            Category::Router => "Router",
            Category::Service => "Service",
            Category::Node => "Node",
            Category::HealthCheck => "HealthCheck",
        }
    }

    /// Prefix watched for this category, e.g. `/Service/`.
    pub fn watch_prefix(&self, root: &str) -> String {
        format!("{}{}/", root, self.segment())
    }

    /// Prefix of one entity's attributes, e.g. `/Service/Service-users/`.
    pub fn entity_prefix(&self, root: &str, name: &str) -> String {
        format!("{}{}-{}/", self.watch_prefix(root), self.segment(), name)
    }

    /// Full key of one attribute.
    pub fn attribute_key(&self, root: &str, name: &str, attribute: &str) -> String {
        format!("{}{}", self.entity_prefix(root, name), attribute)
    }
}

/// A key split into its logical name and attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityKey {
    pub name: String,
    pub attribute: String,
}

/// Recover `(name, attribute)` from a raw event key.
pub fn parse_key(root: &str, category: Category, key: &str) -> Result<EntityKey, RoutingError> {
    let head = format!("{}{}-", category.watch_prefix(root), category.segment());
    let rest = key.strip_prefix(head.as_str()).unwrap_or(key);
    let parts: Vec<&str> = rest.split(SLASH).collect();
    if parts.len() < 2 || parts[0].is_empty() {
        tracing::warn!(key = %key, category = category.segment(), "Invalid key");
        return Err(RoutingError::InvalidKey(key.to_string()));
    }
    Ok(EntityKey {
        name: parts[0].to_string(),
        attribute: parts[1..].join("/"),
    })
}
