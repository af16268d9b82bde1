// Word strategy
//
// Plain strings are treated as single words and represented by their
// embedding vector. Vectors are looked up by the runtime's `EBWordVectors`
// table during conversion; the output stack regresses a vector and converts
// it back to the nearest known word.

use crate::compiler::number::{regression_stack, split_rows_function, stack_rows_function};
use crate::compiler::{module_name, StackOutput, StrategyDispatch, TensorStrategy};
use crate::graph::lua::{call, index, local, local_function, method, num, raw, Block, Stmt};
use crate::graph::{Module, Node};
use crate::internal::error::Result;
use crate::schema::types::{Schema, SchemaType};
use crate::tensor::TensorSchema;

#[derive(Debug, Clone, Copy, Default)]
pub struct WordStrategy;

impl TensorStrategy for WordStrategy {
    fn name(&self) -> &'static str {
        "word"
    }

    fn accepts(&self, schema: &Schema) -> bool {
        schema.schema_type == SchemaType::String && schema.enum_values.is_none()
    }

    fn tensor_schema(&self, schema: &Schema, dispatch: &StrategyDispatch) -> Result<TensorSchema> {
        Ok(TensorSchema::data_tensor(dispatch.config().word_vector_size, schema.variable_name()))
    }

    fn input_stack(
        &self,
        schema: &Schema,
        input_node: &Node,
        root_name: &str,
        dispatch: &StrategyDispatch,
    ) -> Result<StackOutput> {
        let name = format!("{}_inputStack", module_name(root_name, schema));
        Ok(StackOutput {
            output_node: Node::unary(Module::new("nn.Identity"), input_node, name),
            output_tensor_schema: self.tensor_schema(schema, dispatch)?,
            additional_modules: Vec::new(),
        })
    }

    fn output_stack(
        &self,
        schema: &Schema,
        input_node: &Node,
        input_tensor_schema: &TensorSchema,
        root_name: &str,
        dispatch: &StrategyDispatch,
    ) -> Result<StackOutput> {
        let size = dispatch.config().word_vector_size;
        let (summary_node, chain) = regression_stack(schema, input_node, input_tensor_schema, root_name, size)?;
        let linear = Node::unary(chain, &summary_node, format!("{}_linearUnit", module_name(root_name, schema)));
        Ok(StackOutput {
            output_node: linear,
            output_tensor_schema: self.tensor_schema(schema, dispatch)?,
            additional_modules: Vec::new(),
        })
    }

    fn criterion(&self, _schema: &Schema, _dispatch: &StrategyDispatch) -> Result<Module> {
        Ok(Module::new("nn.MSECriterion"))
    }

    fn tensor_input_code(&self, _schema: &Schema, name: &str, dispatch: &StrategyDispatch) -> Result<Stmt> {
        let size = dispatch.config().word_vector_size;
        Ok(local_function(
            name,
            &["input"],
            Block(vec![
                local("result", call("torch.zeros", vec![num(1), num(size as f64)])),
                local("vector", call("EBWordVectors.lookup", vec![raw("input")])),
                Stmt::If(
                    raw("vector"),
                    Block(vec![Stmt::Call(method(
                        index(raw("result"), num(1)),
                        "copy",
                        vec![raw("vector")],
                    ))]),
                    None,
                ),
                Stmt::Return(raw("result")),
            ]),
        ))
    }

    fn tensor_output_code(&self, _schema: &Schema, name: &str, _dispatch: &StrategyDispatch) -> Result<Stmt> {
        Ok(local_function(
            name,
            &["input"],
            Block(vec![Stmt::Return(call(
                "EBWordVectors.nearest",
                vec![index(raw("input"), num(1))],
            ))]),
        ))
    }

    fn prepare_batch_code(&self, _schema: &Schema, name: &str, dispatch: &StrategyDispatch) -> Result<Stmt> {
        Ok(stack_rows_function(name, dispatch.config().word_vector_size))
    }

    fn unwind_batch_code(&self, _schema: &Schema, name: &str, _dispatch: &StrategyDispatch) -> Result<Stmt> {
        Ok(split_rows_function(name))
    }
}
