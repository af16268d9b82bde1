// Schema assembly
//
// Rebuilds the nested schema tree from the flat map of detected paths. Only
// leaf paths drive the shape: a path set holding just the current root is a
// leaf, otherwise the remaining paths are grouped by their next segment into
// array items ("[]") or object properties.

use std::collections::BTreeMap;

use crate::schema::types::{Schema, SchemaType};
use crate::schema::utils::{join_path, ARRAY_SEGMENT};

/// Remainder of `path` below `root`, or None when `path` lies elsewhere
fn remainder<'a>(root: &str, path: &'a str) -> Option<&'a str> {
    if root.is_empty() {
        Some(path)
    } else if path == root {
        Some("")
    } else {
        path.strip_prefix(root).and_then(|rest| rest.strip_prefix('.'))
    }
}

/// First segment of a relative path
fn head(relative: &str) -> &str {
    relative.split('.').next().unwrap_or(relative)
}

/// Assembles the subtree rooted at `root`.
///
/// `leaves` must be sorted. `nodes` holds a template for every detected path,
/// carrying metadata and configuration; container templates only lend their
/// metadata and configuration to the assembled node.
pub fn assemble(root: &str, leaves: &[&str], nodes: &BTreeMap<String, Schema>) -> Schema {
    let fields: Vec<&str> = leaves
        .iter()
        .copied()
        .filter(|path| remainder(root, path).is_some())
        .collect();

    if fields.len() == 1 && fields[0] == root && !root.is_empty() {
        return nodes
            .get(root)
            .cloned()
            .unwrap_or_else(|| Schema::leaf(root, SchemaType::String));
    }

    // A path seen both as a leaf and as a container is assembled as the container
    let fields: Vec<&str> = fields.into_iter().filter(|path| *path != root).collect();
    let Some(first) = fields.first() else {
        return container(root, Schema::object(root, BTreeMap::new()), nodes);
    };

    let first_head = remainder(root, first).map(head).unwrap_or_default();
    if first_head == ARRAY_SEGMENT {
        let item_root = join_path(root, ARRAY_SEGMENT);
        let items = assemble(&item_root, &fields, nodes);
        return container(root, Schema::array(root, items), nodes);
    }

    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for path in &fields {
        if let Some(segment) = remainder(root, path).map(head) {
            if !segment.is_empty() {
                groups.entry(segment).or_default().push(path);
            }
        }
    }

    let properties = groups
        .into_iter()
        .map(|(segment, paths)| {
            let child_root = join_path(root, segment);
            (segment.to_string(), assemble(&child_root, &paths, nodes))
        })
        .collect();
    container(root, Schema::object(root, properties), nodes)
}

fn container(root: &str, mut schema: Schema, nodes: &BTreeMap<String, Schema>) -> Schema {
    if let Some(template) = nodes.get(root) {
        schema.metadata = template.metadata.clone();
        if template.schema_type == schema.schema_type {
            schema.configuration = template.configuration.clone();
        }
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes_for(paths: &[(&str, SchemaType)]) -> BTreeMap<String, Schema> {
        paths
            .iter()
            .map(|(path, schema_type)| (path.to_string(), Schema::leaf(path, *schema_type)))
            .collect()
    }

    #[test]
    fn test_nested_objects_and_arrays() {
        let nodes = nodes_for(&[
            ("", SchemaType::Object),
            ("a", SchemaType::Number),
            ("b", SchemaType::Object),
            ("b.c", SchemaType::Number),
            ("list", SchemaType::Array),
            ("list.[]", SchemaType::Object),
            ("list.[].x", SchemaType::String),
            ("list.[].y", SchemaType::Boolean),
        ]);
        let leaves = vec!["a", "b.c", "list.[].x", "list.[].y"];
        let schema = assemble("", &leaves, &nodes);

        assert!(schema.is_object());
        let properties = schema.properties.as_ref().unwrap();
        assert_eq!(properties["a"].schema_type, SchemaType::Number);
        // A single child does not turn its parent into a leaf
        assert!(properties["b"].is_object());
        assert_eq!(properties["b"].children().len(), 1);

        let items = properties["list"].items().unwrap();
        assert!(items.is_object());
        assert_eq!(items.children().len(), 2);
        assert_eq!(items.properties.as_ref().unwrap()["y"].schema_type, SchemaType::Boolean);
    }

    #[test]
    fn test_array_of_scalars() {
        let nodes = nodes_for(&[("", SchemaType::Object), ("tags", SchemaType::Array), ("tags.[]", SchemaType::String)]);
        let schema = assemble("", &["tags.[]"], &nodes);
        let tags = &schema.properties.as_ref().unwrap()["tags"];
        assert!(tags.is_array());
        assert_eq!(tags.items().unwrap().schema_type, SchemaType::String);
        assert_eq!(tags.items().unwrap().title, "tags.[]");
    }

    #[test]
    fn test_empty_field_set() {
        let schema = assemble("", &[], &BTreeMap::new());
        assert!(schema.is_object());
        assert!(schema.children().is_empty());
    }

    #[test]
    fn test_mixed_leaf_and_container() {
        let nodes = nodes_for(&[("", SchemaType::Object), ("v", SchemaType::String), ("v.w", SchemaType::Number)]);
        let schema = assemble("", &["v", "v.w"], &nodes);
        let v = &schema.properties.as_ref().unwrap()["v"];
        assert!(v.is_object());
        assert_eq!(v.children()[0].title, "v.w");
    }
}
