// Classification strategy
//
// Enumerated nodes are carried as a single class index. Position 1 of the
// enumeration is reserved for values absent from the vocabulary, so known
// values occupy the contiguous indexes after it. Inside the network the index
// is expanded to a one-hot vector and outputs are log probabilities.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::compiler::number::{regression_stack, split_rows_function};
use crate::compiler::{module_name, StackOutput, StrategyDispatch, TensorStrategy};
use crate::graph::lua::{
    binary, call, index, len, local, local_function, method, num, raw, string, Block, Expr, Stmt,
};
use crate::graph::{Module, Node};
use crate::internal::error::{Error, Result};
use crate::schema::types::{Schema, SchemaType};
use crate::tensor::{TensorDimension, TensorSchema, TensorSlice};

#[derive(Debug, Clone, Copy, Default)]
pub struct ClassificationStrategy;

impl ClassificationStrategy {
    fn enum_size(schema: &Schema) -> Result<usize> {
        schema.enum_len().ok_or_else(|| {
            Error::SchemaShapeMismatch(format!("Field '{}' has no enumeration", schema.title))
        })
    }

    /// String enumerations are looked up by value instead of offset by one
    fn is_lookup(schema: &Schema) -> bool {
        schema.schema_type != SchemaType::Number
    }

    fn enum_entries(schema: &Schema) -> Vec<&Value> {
        schema.enum_values.iter().flatten().collect()
    }
}

impl TensorStrategy for ClassificationStrategy {
    fn name(&self) -> &'static str {
        "classification"
    }

    fn accepts(&self, schema: &Schema) -> bool {
        schema.enum_values.is_some() && schema.is_field()
    }

    fn tensor_schema(&self, schema: &Schema, _dispatch: &StrategyDispatch) -> Result<TensorSchema> {
        let name = schema.variable_name().to_string();
        let mut tensor_map = BTreeMap::new();
        tensor_map.insert(name.clone(), TensorSlice { start: 1, size: 1 });
        Ok(TensorSchema::Tensor {
            variable_name: name,
            tensor_dimensions: vec![TensorDimension {
                size: 1,
                label: "batch".to_string(),
            }],
            tensor_map,
        })
    }

    fn input_stack(
        &self,
        schema: &Schema,
        input_node: &Node,
        root_name: &str,
        _dispatch: &StrategyDispatch,
    ) -> Result<StackOutput> {
        let size = Self::enum_size(schema)?;
        let name = format!("{}_inputStack", module_name(root_name, schema));
        Ok(StackOutput {
            output_node: Node::unary(Module::with_params("nn.EBOneHot", vec![size.into()]), input_node, name),
            output_tensor_schema: TensorSchema::data_tensor(size, schema.variable_name()),
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
        let size = Self::enum_size(schema)?;
        let (summary_node, mut chain) = regression_stack(schema, input_node, input_tensor_schema, root_name, size)?;
        chain.add(Module::new("nn.LogSoftMax"));
        let linear = Node::unary(chain, &summary_node, format!("{}_linearUnit", module_name(root_name, schema)));
        Ok(StackOutput {
            output_node: linear,
            output_tensor_schema: TensorSchema::data_tensor(size, schema.variable_name()),
            additional_modules: Vec::new(),
        })
    }

    fn criterion(&self, _schema: &Schema, _dispatch: &StrategyDispatch) -> Result<Module> {
        Ok(Module::new("nn.ClassNLLCriterion"))
    }

    fn tensor_input_code(&self, schema: &Schema, name: &str, _dispatch: &StrategyDispatch) -> Result<Stmt> {
        let mut body = Block(vec![local("result", call("torch.zeros", vec![num(1)]))]);
        let slot = index(raw("result"), num(1));
        if Self::is_lookup(schema) {
            // Unknown values fall into the reserved first class
            let entries = Self::enum_entries(schema)
                .into_iter()
                .enumerate()
                .filter_map(|(position, value)| {
                    value.as_str().map(|text| (text.to_string(), num(position as f64 + 1.0)))
                })
                .collect();
            body.push(local("classes", Expr::Record(entries)));
            body.push(Stmt::Assign(
                slot,
                binary(index(raw("classes"), raw("input")), "or", num(1)),
            ));
        } else {
            body.push(Stmt::Assign(slot, binary(raw("input"), "+", num(1))));
        }
        body.push(Stmt::Return(raw("result")));
        Ok(local_function(name, &["input"], body))
    }

    fn tensor_output_code(&self, schema: &Schema, name: &str, _dispatch: &StrategyDispatch) -> Result<Stmt> {
        let class = index(index(raw("index"), num(1)), num(1));
        let mut body = Block(vec![local(
            "probs, index",
            call("torch.max", vec![raw("input"), num(2)]),
        )]);
        if Self::is_lookup(schema) {
            let values = Self::enum_entries(schema)
                .into_iter()
                .map(|value| value.as_str().map_or(raw("nil"), string))
                .collect();
            body.push(local("values", Expr::Table(values)));
            body.push(Stmt::Return(index(raw("values"), class)));
        } else {
            body.push(Stmt::Return(binary(class, "-", num(1))));
        }
        Ok(local_function(name, &["input"], body))
    }

    fn prepare_batch_code(&self, schema: &Schema, name: &str, _dispatch: &StrategyDispatch) -> Result<Stmt> {
        let size = Self::enum_size(schema)?;
        let each_sample = |body: Block| {
            Stmt::GenericFor(
                vec!["k".to_string(), "v".to_string()],
                call("pairs", vec![raw("input")]),
                body,
            )
        };
        let sample = index(raw("input"), raw("k"));
        let row = method(raw("batch"), "narrow", vec![num(1), raw("k"), num(1)]);

        // Network outputs arrive as rows of class scores, inputs as bare indexes
        let body = Block(vec![
            Stmt::Local("batch".to_string(), None),
            local("expandedFound", raw("false")),
            each_sample(Block(vec![Stmt::If(
                binary(method(sample.clone(), "dim", Vec::new()), "==", num(2)),
                Block(vec![Stmt::Assign(raw("expandedFound"), raw("true"))]),
                None,
            )])),
            Stmt::If(
                raw("expandedFound"),
                Block(vec![Stmt::Assign(
                    raw("batch"),
                    call("torch.zeros", vec![len(raw("input")), num(size as f64)]),
                )]),
                Some(Block(vec![Stmt::Assign(
                    raw("batch"),
                    call("torch.zeros", vec![len(raw("input"))]),
                )])),
            ),
            each_sample(Block(vec![Stmt::If(
                binary(method(sample.clone(), "sum", Vec::new()), "~=", num(0)),
                Block(vec![Stmt::Call(method(row, "copy", vec![sample]))]),
                None,
            )])),
            Stmt::Return(raw("batch")),
        ]);
        Ok(local_function(name, &["input"], body))
    }

    fn unwind_batch_code(&self, _schema: &Schema, name: &str, _dispatch: &StrategyDispatch) -> Result<Stmt> {
        Ok(split_rows_function(name))
    }
}
