// Tensor schema
//
// A TensorSchema mirrors a Schema tree and describes how its values occupy
// tensors inside the network. Only tensor nodes carry concrete dimensions;
// array and object sizes are derived from their children.
//
// Runtime representation of each variant:
// - tensor: a single tensor of the given dimensions
// - array:  the table {lengths, {item_1, ..., item_n}}
// - object: the table {property_1, ..., property_n} in property order

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::lua::{binary, call, index, len, local_function, method, num, raw, Block, Expr, Stmt};
use crate::internal::error::{Error, Result};
use crate::schema::utils::machine_name;

pub mod batch;

/// One dimension of a tensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorDimension {
    pub size: usize,
    pub label: String,
}

/// Named slice of the data dimension, 1-based
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSlice {
    pub start: usize,
    pub size: usize,
}

/// Layout of tensors flowing through the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum TensorSchema {
    Tensor {
        variable_name: String,
        tensor_dimensions: Vec<TensorDimension>,
        #[serde(default)]
        tensor_map: BTreeMap<String, TensorSlice>,
    },
    Array {
        variable_name: String,
        items: Box<TensorSchema>,
    },
    Object {
        variable_name: String,
        properties: Vec<TensorSchema>,
    },
}

impl TensorSchema {
    /// A `[batch, data]` tensor of `size` elements whose map names the whole range
    pub fn data_tensor(size: usize, name: &str) -> Self {
        let mut tensor_map = BTreeMap::new();
        tensor_map.insert(name.to_string(), TensorSlice { start: 1, size });
        TensorSchema::Tensor {
            variable_name: name.to_string(),
            tensor_dimensions: vec![
                TensorDimension {
                    size: 1,
                    label: "batch".to_string(),
                },
                TensorDimension {
                    size,
                    label: "data".to_string(),
                },
            ],
            tensor_map,
        }
    }

    /// Array of `items`
    pub fn array(name: &str, items: TensorSchema) -> Self {
        TensorSchema::Array {
            variable_name: name.to_string(),
            items: Box::new(items),
        }
    }

    /// Object with ordered properties
    pub fn object(name: &str, properties: Vec<TensorSchema>) -> Self {
        TensorSchema::Object {
            variable_name: name.to_string(),
            properties,
        }
    }

    pub fn variable_name(&self) -> &str {
        match self {
            TensorSchema::Tensor { variable_name, .. }
            | TensorSchema::Array { variable_name, .. }
            | TensorSchema::Object { variable_name, .. } => variable_name,
        }
    }

    /// Variable name with every non-word character removed
    pub fn machine_variable_name(&self) -> String {
        machine_name(self.variable_name())
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self, TensorSchema::Tensor { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, TensorSchema::Array { .. })
    }

    pub fn is_object(&self) -> bool {
        matches!(self, TensorSchema::Object { .. })
    }

    /// Product of the dimensions for a tensor, 0 for containers
    pub fn tensor_size(&self) -> usize {
        match self {
            TensorSchema::Tensor { tensor_dimensions, .. } => {
                tensor_dimensions.iter().map(|d| d.size).product()
            }
            _ => 0,
        }
    }

    /// Number of data elements per time step: objects sum their properties
    /// and arrays take the size of one item
    pub fn size(&self) -> usize {
        match self {
            TensorSchema::Tensor { .. } => self.tensor_size(),
            TensorSchema::Array { items, .. } => items.size(),
            TensorSchema::Object { properties, .. } => properties.iter().map(|p| p.size()).sum(),
        }
    }

    /// Properties of an object, empty otherwise
    pub fn properties(&self) -> &[TensorSchema] {
        match self {
            TensorSchema::Object { properties, .. } => properties,
            _ => &[],
        }
    }

    /// Items of an array
    pub fn items(&self) -> Result<&TensorSchema> {
        match self {
            TensorSchema::Array { items, .. } => Ok(items),
            _ => Err(Error::SchemaError(format!(
                "Tensor schema '{}' is not an array",
                self.variable_name()
            ))),
        }
    }

    /// Zero based position of the property named `name`
    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties().iter().position(|p| p.variable_name() == name)
    }

    /// Searches this schema and every descendant for a node named `name`.
    ///
    /// Returns the path of zero based property indexes leading to the match,
    /// or `None` when no object property carries that name.
    pub fn find_named(&self, name: &str) -> Option<Vec<usize>> {
        if let TensorSchema::Object { properties, .. } = self {
            for (position, property) in properties.iter().enumerate() {
                if property.variable_name() == name {
                    return Some(vec![position]);
                }
                if let Some(mut rest) = property.find_named(name) {
                    rest.insert(0, position);
                    return Some(rest);
                }
            }
        }
        None
    }

    /// Follows a path produced by `find_named`
    pub fn at_path(&self, path: &[usize]) -> Option<&TensorSchema> {
        match path.split_first() {
            None => Some(self),
            Some((head, rest)) => self.properties().get(*head)?.at_path(rest),
        }
    }

    /// Generates `local <name> = function (value)` moving every tensor of a
    /// value with this layout onto the GPU
    pub fn localize_function(&self, name: &str) -> Stmt {
        let mut body = Block::new();
        match self {
            TensorSchema::Object { properties, .. } => {
                for (position, property) in properties.iter().enumerate() {
                    let sub_name = format!("{}_localize", property.machine_variable_name());
                    let slot = index(raw("value"), num(position as f64 + 1.0));
                    body.push(property.localize_function(&sub_name));
                    body.push(Stmt::Assign(slot.clone(), call(&sub_name, vec![slot])));
                }
                body.push(Stmt::Return(raw("value")));
            }
            TensorSchema::Array { items, .. } => {
                let sub_name = format!("{}_localizeItems", name);
                let slot = index(index(raw("value"), num(2)), raw("n"));
                body.push(items.localize_function(&sub_name));
                body.push(Stmt::NumericFor(
                    "n".to_string(),
                    num(1),
                    len(index(raw("value"), num(2))),
                    Block(vec![Stmt::Assign(slot.clone(), call(&sub_name, vec![slot]))]),
                ));
                body.push(Stmt::Return(raw("value")));
            }
            TensorSchema::Tensor { .. } => {
                body.push(Stmt::If(
                    binary(call("torch.type", vec![raw("value")]), "==", Expr::Str("table".to_string())),
                    Block(vec![Stmt::Return(raw("value"))]),
                    None,
                ));
                body.push(Stmt::Return(method(raw("value"), "cuda", Vec::new())));
            }
        }
        local_function(name, &["value"], body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TensorSchema {
        TensorSchema::object(
            "root",
            vec![
                TensorSchema::data_tensor(1, "a"),
                TensorSchema::object(
                    "b",
                    vec![TensorSchema::data_tensor(1, "c"), TensorSchema::data_tensor(1, "d")],
                ),
            ],
        )
    }

    #[test]
    fn test_sizes() {
        let schema = sample();
        assert_eq!(schema.size(), 3);
        assert_eq!(schema.tensor_size(), 0);
        assert_eq!(schema.properties().len(), 2);
        assert_eq!(TensorSchema::data_tensor(7, "x").tensor_size(), 7);

        let array = TensorSchema::array("list", TensorSchema::data_tensor(4, "item"));
        assert_eq!(array.size(), 4);
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let value = serde_json::to_value(TensorSchema::data_tensor(2, "x")).unwrap();
        assert_eq!(value["type"], "tensor");
        assert_eq!(value["variableName"], "x");
        assert_eq!(value["tensorDimensions"][1]["size"], 2);
        assert_eq!(value["tensorMap"]["x"]["start"], 1);

        let parsed: TensorSchema = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, TensorSchema::data_tensor(2, "x"));
    }

    #[test]
    fn test_find_named_searches_recursively() {
        let schema = sample();
        assert_eq!(schema.property_index("b"), Some(1));
        assert_eq!(schema.find_named("d"), Some(vec![1, 1]));
        assert_eq!(schema.at_path(&[1, 1]).map(|s| s.variable_name()), Some("d"));
        assert_eq!(schema.find_named("missing"), None);
    }

    #[test]
    fn test_localize_function() {
        let array = TensorSchema::array("list", TensorSchema::data_tensor(4, "item"));
        let code = Block(vec![array.localize_function("localize")]).render();
        let expected = "\
local localize = function (value)
    local localize_localizeItems = function (value)
        if torch.type(value) == \"table\" then
            return value
        end
        return value:cuda()
    end
    for n=1,#value[2] do
        value[2][n] = localize_localizeItems(value[2][n])
    end
    return value
end
";
        assert_eq!(code, expected);
    }
}
