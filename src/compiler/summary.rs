// Summary reduction
//
// Fixed-size layer stacks only accept a single tensor. A summary module
// collapses any tensor layout into one: array items are summarized one by
// one and summed across time, object properties are summarized and joined
// along the data dimension.

use crate::graph::lua::{call, local, local_function, raw, table_insert, Block, Expr, Stmt};
use crate::graph::module::{Module, Parameter};
use crate::tensor::TensorSchema;

/// A module reducing a layout to a single tensor
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub module: Module,
    /// Layout of the single tensor the module produces
    pub tensor_schema: TensorSchema,
}

/// Builds the summary module for `tensor_schema`
pub fn summary_module(tensor_schema: &TensorSchema) -> Summary {
    match tensor_schema {
        TensorSchema::Tensor { .. } => Summary {
            module: Module::new("nn.Identity"),
            tensor_schema: tensor_schema.clone(),
        },
        TensorSchema::Array { items, .. } => {
            let item = summary_module(items);
            let module = Module::container(
                "nn.Sequential",
                vec![
                    Module::with_params("nn.SelectTable", vec![2.into()]),
                    Module::with_params("nn.MapTable", vec![Parameter::Module(item.module)]),
                    Module::new("nn.CAddTable"),
                ],
            );
            Summary {
                module,
                tensor_schema: item.tensor_schema,
            }
        }
        TensorSchema::Object { properties, .. } => {
            let summaries: Vec<Summary> = properties.iter().map(summary_module).collect();
            let total: usize = summaries.iter().map(|s| s.tensor_schema.tensor_size()).sum();
            let parallel = Module::container(
                "nn.ParallelTable",
                summaries.into_iter().map(|s| s.module).collect(),
            );
            Summary {
                module: Module::container(
                    "nn.Sequential",
                    vec![parallel, Module::with_params("nn.JoinTable", vec![2.into()])],
                ),
                tensor_schema: TensorSchema::data_tensor(total, "joinedTensor"),
            }
        }
    }
}

/// Generates `local <name> = function ()` returning a zero filled value of the layout.
///
/// A nested sequence is empty, `{torch.zeros(1), {}}`: a length of zero and no items.
pub fn empty_tensor_function(tensor_schema: &TensorSchema, name: &str) -> Stmt {
    let mut body = Block::new();
    match tensor_schema {
        TensorSchema::Object { properties, .. } => {
            body.push(local("emptyObject", Expr::Table(Vec::new())));
            for property in properties {
                let sub_name = format!("{}_generateEmpty", property.machine_variable_name());
                body.push(empty_tensor_function(property, &sub_name));
                body.push(table_insert(raw("emptyObject"), call(&sub_name, Vec::new())));
            }
            body.push(Stmt::Return(raw("emptyObject")));
        }
        TensorSchema::Tensor { tensor_dimensions, .. } => {
            let sizes = tensor_dimensions.iter().map(|d| Expr::Num(d.size as f64)).collect();
            body.push(local("emptyTensor", call("torch.zeros", sizes)));
            body.push(Stmt::Return(raw("emptyTensor")));
        }
        TensorSchema::Array { .. } => {
            body.push(Stmt::Return(Expr::Table(vec![
                call("torch.zeros", vec![Expr::Num(1.0)]),
                Expr::Table(Vec::new()),
            ])));
        }
    }
    local_function(name, &[], body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_summary_is_identity() {
        let summary = summary_module(&TensorSchema::data_tensor(4, "x"));
        assert_eq!(summary.module.render(0), "nn.Identity()");
        assert_eq!(summary.tensor_schema.tensor_size(), 4);
    }

    #[test]
    fn test_object_summary_joins_properties() {
        let schema = TensorSchema::object(
            "o",
            vec![
                TensorSchema::data_tensor(3, "a"),
                TensorSchema::array("b", TensorSchema::data_tensor(5, "item")),
            ],
        );
        let summary = summary_module(&schema);
        assert_eq!(summary.tensor_schema.tensor_size(), 8);
        assert_eq!(summary.tensor_schema.variable_name(), "joinedTensor");

        let rendered = summary.module.render(0);
        assert!(rendered.starts_with("nn.Sequential()"));
        assert!(rendered.contains(":add(nn.ParallelTable()"));
        assert!(rendered.contains("nn.MapTable(nn.Identity())"));
        assert!(rendered.contains(":add(nn.CAddTable())"));
        assert!(rendered.ends_with(":add(nn.JoinTable(2))"));
    }

    #[test]
    fn test_empty_tensor_function() {
        let schema = TensorSchema::object("item", vec![TensorSchema::data_tensor(2, "a")]);
        let code = Block(vec![empty_tensor_function(&schema, "generateEmpty")]).render();
        let expected = "\
local generateEmpty = function ()
    local emptyObject = {}
    local a_generateEmpty = function ()
        local emptyTensor = torch.zeros(1, 2)
        return emptyTensor
    end
    table.insert(emptyObject, a_generateEmpty())
    return emptyObject
end
";
        assert_eq!(code, expected);

    }

    #[test]
    fn test_empty_nested_sequence() {
        let schema = TensorSchema::object(
            "item",
            vec![TensorSchema::array("digits", TensorSchema::data_tensor(1, "digit"))],
        );
        let code = Block(vec![empty_tensor_function(&schema, "generateEmpty")]).render();
        assert!(code.contains("    local digits_generateEmpty = function ()\n        return {torch.zeros(1), {}}\n    end\n"));
    }
}
