// Utility functions for the schema module
//
// Variable path helpers shared by detection and compilation. Paths use "."
// for object descent and "[]" as the segment for array items, for example
// `orders.[].price`.

/// Path segment used for array items
pub const ARRAY_SEGMENT: &str = "[]";

/// Appends a segment to a variable path
pub fn join_path(root: &str, segment: &str) -> String {
    if root.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", root, segment)
    }
}

/// Returns the final segment of a variable path
pub fn last_segment(path: &str) -> &str {
    match path.rfind('.') {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

/// Removes every character that is not a word character
pub fn machine_name(name: &str) -> String {
    name.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect()
}

/// Converts a variable path into a single identifier
///
/// Array segments become `array` and object descent becomes `_`, so
/// `orders.[].price` maps to `orders_array_price`.
pub fn machine_path(path: &str) -> String {
    let replaced = path.replace(ARRAY_SEGMENT, "array").replace('.', "_");
    machine_name(&replaced)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "a"), "a");
        assert_eq!(join_path("a", "[]"), "a.[]");
        assert_eq!(join_path("a.[]", "b"), "a.[].b");
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment(""), "");
        assert_eq!(last_segment("a"), "a");
        assert_eq!(last_segment("a.[].b"), "b");
        assert_eq!(last_segment("a.[]"), "[]");
    }

    #[test]
    fn test_machine_names() {
        assert_eq!(machine_name("first name!"), "firstname");
        assert_eq!(machine_path("orders.[].unit price"), "orders_array_unitprice");
        assert_eq!(machine_path(""), "");
    }
}
