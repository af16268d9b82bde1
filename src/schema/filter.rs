// Schema filtering and inclusion management
//
// Filtering removes nodes rejected by a predicate. Objects left without
// properties and arrays left without usable items are removed as well, so a
// filtered tree never contains empty containers below the root.

use crate::internal::error::{Error, Result};
use crate::schema::types::Schema;
use crate::schema::utils::ARRAY_SEGMENT;

impl Schema {
    /// Returns a copy of this schema keeping only the nodes accepted by `keep`
    pub fn filter<F: Fn(&Schema) -> bool>(&self, keep: &F) -> Schema {
        let mut result = self.clone();
        prune(&mut result, keep);
        result
    }

    /// Returns a copy of this schema restricted to included nodes
    pub fn filter_included(&self) -> Schema {
        self.filter(&|schema: &Schema| schema.configuration.included)
    }

    /// Finds a node by variable path
    pub fn find(&self, path: &str) -> Option<&Schema> {
        if path.is_empty() {
            return Some(self);
        }
        let mut current = self;
        for segment in path.split('.') {
            current = step(current, segment)?;
        }
        Some(current)
    }

    /// Includes or excludes the node at `path`.
    ///
    /// Excluding a node excludes everything beneath it. Including a node also
    /// includes every ancestor so the node stays reachable.
    pub fn set_included(&mut self, path: &str, included: bool) -> Result<()> {
        let segments: Vec<&str> = if path.is_empty() {
            Vec::new()
        } else {
            path.split('.').collect()
        };
        set_included_along(self, &segments, included)
            .then_some(())
            .ok_or_else(|| Error::SchemaError(format!("No schema node at path '{}'", path)))
    }
}

fn step<'a>(schema: &'a Schema, segment: &str) -> Option<&'a Schema> {
    if segment == ARRAY_SEGMENT {
        schema.items.as_deref()
    } else {
        schema.properties.as_ref()?.get(segment)
    }
}

fn set_included_along(schema: &mut Schema, segments: &[&str], included: bool) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        if included {
            schema.configuration.included = true;
        } else {
            set_subtree_included(schema, false);
        }
        return true;
    };

    let child = if *head == ARRAY_SEGMENT {
        schema.items.as_deref_mut()
    } else {
        schema.properties.as_mut().and_then(|p| p.get_mut(*head))
    };
    let found = match child {
        Some(child) => set_included_along(child, rest, included),
        None => false,
    };
    if found && included {
        schema.configuration.included = true;
    }
    found
}

fn set_subtree_included(schema: &mut Schema, included: bool) {
    schema.configuration.included = included;
    if let Some(properties) = schema.properties.as_mut() {
        for child in properties.values_mut() {
            set_subtree_included(child, included);
        }
    }
    if let Some(items) = schema.items.as_deref_mut() {
        set_subtree_included(items, included);
    }
}

/// Prunes the subtree and reports whether the node still holds anything
fn prune<F: Fn(&Schema) -> bool>(schema: &mut Schema, keep: &F) -> bool {
    if schema.is_object() {
        let Some(properties) = schema.properties.as_mut() else {
            return false;
        };
        properties.retain(|_, child| keep(child) && prune(child, keep));
        !properties.is_empty()
    } else if schema.is_array() {
        match schema.items.as_deref_mut() {
            Some(items) => keep(items) && prune(items, keep),
            None => false,
        }
    } else {
        true
    }
}
