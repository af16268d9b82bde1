// Number strategy
//
// A plain number occupies a single element of a `[batch, data]` tensor. The
// output stack summarizes the shared representation and regresses the value
// through a fixed-size layer stack.

use crate::compiler::layers::create_module_chain;
use crate::compiler::summary::summary_module;
use crate::compiler::{fixed_layers, module_name, output_size, StackOutput, StrategyDispatch, TensorStrategy};
use crate::graph::lua::{call, index, len, local, local_function, method, num, raw, table_insert, Block, Stmt};
use crate::graph::{Module, Node};
use crate::internal::error::Result;
use crate::schema::types::{Schema, SchemaType};
use crate::tensor::TensorSchema;

/// `local <name> = function (input)` stacking single-row tensors of `width` into a batch
pub(crate) fn stack_rows_function(name: &str, width: usize) -> Stmt {
    let row = method(raw("batch"), "narrow", vec![num(1), raw("k"), num(1)]);
    local_function(
        name,
        &["input"],
        Block(vec![
            local("batch", call("torch.zeros", vec![len(raw("input")), num(width as f64)])),
            Stmt::GenericFor(
                vec!["k".to_string(), "v".to_string()],
                call("pairs", vec![raw("input")]),
                Block(vec![Stmt::Call(method(row, "copy", vec![index(raw("input"), raw("k"))]))]),
            ),
            Stmt::Return(raw("batch")),
        ]),
    )
}

/// `local <name> = function (input)` splitting a batch into one-row tensors
pub(crate) fn split_rows_function(name: &str) -> Stmt {
    let rows = index(method(raw("input"), "size", Vec::new()), num(1));
    local_function(
        name,
        &["input"],
        Block(vec![
            local("samples", raw("{}")),
            Stmt::NumericFor(
                "k".to_string(),
                num(1),
                rows,
                Block(vec![table_insert(
                    raw("samples"),
                    method(raw("input"), "narrow", vec![num(1), raw("k"), num(1)]),
                )]),
            ),
            Stmt::Return(raw("samples")),
        ]),
    )
}

/// Summarizes the shared representation and projects it to `size` outputs
pub(crate) fn regression_stack(
    schema: &Schema,
    input_node: &Node,
    input_tensor_schema: &TensorSchema,
    root_name: &str,
    size: usize,
) -> Result<(Node, Module)> {
    let name = module_name(root_name, schema);
    let summary = summary_module(input_tensor_schema);
    let summary_node = Node::unary(summary.module, input_node, format!("{}_summaryNode", name));
    let (chain, _) = create_module_chain(&fixed_layers(schema), &summary.tensor_schema, &output_size(size))?;
    Ok((summary_node, chain))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NumberStrategy;

impl TensorStrategy for NumberStrategy {
    fn name(&self) -> &'static str {
        "number"
    }

    fn accepts(&self, schema: &Schema) -> bool {
        schema.schema_type == SchemaType::Number && schema.enum_values.is_none()
    }

    fn tensor_schema(&self, schema: &Schema, _dispatch: &StrategyDispatch) -> Result<TensorSchema> {
        Ok(TensorSchema::data_tensor(1, schema.variable_name()))
    }

    fn input_stack(
        &self,
        schema: &Schema,
        input_node: &Node,
        root_name: &str,
        _dispatch: &StrategyDispatch,
    ) -> Result<StackOutput> {
        let name = format!("{}_inputStack", module_name(root_name, schema));
        Ok(StackOutput {
            output_node: Node::unary(Module::new("nn.Identity"), input_node, name),
            output_tensor_schema: TensorSchema::data_tensor(1, schema.variable_name()),
            additional_modules: Vec::new(),
        })
    }

    fn output_stack(
        &self,
        schema: &Schema,
        input_node: &Node,
        input_tensor_schema: &TensorSchema,
        root_name: &str,
        _dispatch: &StrategyDispatch,
    ) -> Result<StackOutput> {
        let (summary_node, chain) = regression_stack(schema, input_node, input_tensor_schema, root_name, 1)?;
        let linear = Node::unary(chain, &summary_node, format!("{}_linearUnit", module_name(root_name, schema)));
        Ok(StackOutput {
            output_node: linear,
            output_tensor_schema: TensorSchema::data_tensor(1, schema.variable_name()),
            additional_modules: Vec::new(),
        })
    }

    fn criterion(&self, _schema: &Schema, _dispatch: &StrategyDispatch) -> Result<Module> {
        Ok(Module::new("nn.MSECriterion"))
    }

    fn tensor_input_code(&self, _schema: &Schema, name: &str, _dispatch: &StrategyDispatch) -> Result<Stmt> {
        Ok(local_function(
            name,
            &["input"],
            Block(vec![
                local("result", call("torch.zeros", vec![num(1), num(1)])),
                Stmt::Assign(index(index(raw("result"), num(1)), num(1)), raw("input")),
                Stmt::Return(raw("result")),
            ]),
        ))
    }

    fn tensor_output_code(&self, _schema: &Schema, name: &str, _dispatch: &StrategyDispatch) -> Result<Stmt> {
        Ok(local_function(
            name,
            &["input"],
            Block(vec![Stmt::Return(index(index(raw("input"), num(1)), num(1)))]),
        ))
    }

    fn prepare_batch_code(&self, _schema: &Schema, name: &str, _dispatch: &StrategyDispatch) -> Result<Stmt> {
        Ok(stack_rows_function(name, 1))
    }

    fn unwind_batch_code(&self, _schema: &Schema, name: &str, _dispatch: &StrategyDispatch) -> Result<Stmt> {
        Ok(split_rows_function(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::config::CompilerConfig;

    fn price() -> Schema {
        let mut schema = Schema::leaf("", SchemaType::Number);
        schema.update_variable_names_from("price");
        schema
    }

    #[test]
    fn test_stacks() {
        let dispatch = StrategyDispatch::with_defaults(CompilerConfig::default());
        let input = Node::source(Module::new("nn.Identity"), "input");

        let stack = NumberStrategy.input_stack(&price(), &input, "main", &dispatch).unwrap();
        assert_eq!(stack.output_node.name(), "main_price_inputStack");
        assert_eq!(stack.output_tensor_schema.tensor_size(), 1);

        let shared = TensorSchema::data_tensor(7, "shared");
        let output = NumberStrategy
            .output_stack(&price(), &input, &shared, "main", &dispatch)
            .unwrap();
        assert_eq!(output.output_node.name(), "main_price_linearUnit");
        assert_eq!(output.output_node.inputs()[0].name(), "main_price_summaryNode");
        let layers = output.output_node.module().children();
        assert_eq!(layers.first().map(|m| m.render(0)), Some("nn.Linear(7, 250)".to_string()));
        assert_eq!(layers.last().map(|m| m.render(0)), Some("nn.Linear(250, 1)".to_string()));
    }

    #[test]
    fn test_conversion_code() {
        let dispatch = StrategyDispatch::with_defaults(CompilerConfig::default());
        let code = Block(vec![
            NumberStrategy.tensor_input_code(&price(), "convert", &dispatch).unwrap(),
            NumberStrategy.prepare_batch_code(&price(), "prepare", &dispatch).unwrap(),
            NumberStrategy.unwind_batch_code(&price(), "unwind", &dispatch).unwrap(),
        ])
        .render();
        let expected = "\
local convert = function (input)
    local result = torch.zeros(1, 1)
    result[1][1] = input
    return result
end
local prepare = function (input)
    local batch = torch.zeros(#input, 1)
    for k,v in pairs(input) do
        batch:narrow(1, k, 1):copy(input[k])
    end
    return batch
end
local unwind = function (input)
    local samples = {}
    for k=1,input:size()[1] do
        table.insert(samples, input:narrow(1, k, 1))
    end
    return samples
end
";
        assert_eq!(code, expected);
    }
}
