// Sequence strategy
//
// A sequence travels as the pair {lengths, {item_1, ..., item_n}}. The item
// stack is emitted as its own custom module and mapped over the time steps.
// Item summaries are stacked along a new time axis, run through the recurrent
// layers and split back into one tensor per step.
//
// Batches are padded to the longest sequence with empty items. The true
// lengths travel alongside so unwinding can drop the padding again.

use crate::compiler::layers::{create_module_chain, Substitutions};
use crate::compiler::summary::{empty_tensor_function, summary_module};
use crate::compiler::{module_name, sequence_layers, StackOutput, StrategyDispatch, TensorStrategy};
use crate::graph::lua::{
    binary, call, index, len, local, local_function, method, num, raw, table_insert, Block, Expr, Stmt,
};
use crate::graph::module::Parameter;
use crate::graph::{CustomModule, Module, Node};
use crate::internal::error::{Error, Result};
use crate::schema::types::Schema;
use crate::tensor::TensorSchema;

/// `torch.Tensor(1):fill(<length>)`
fn length_tensor(length: Expr) -> Expr {
    method(call("torch.Tensor", vec![num(1)]), "fill", vec![length])
}

fn each_sample(body: Block) -> Stmt {
    Stmt::GenericFor(
        vec!["k".to_string(), "v".to_string()],
        call("pairs", vec![raw("input")]),
        body,
    )
}

/// Instantiates a custom module inside a map over the time steps
fn map_module(module: &CustomModule) -> Module {
    Module::with_params(
        "nn.MapTable",
        vec![Parameter::Module(Module::new(&format!("nn.{}", module.identifier())))],
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceStrategy;

impl TensorStrategy for SequenceStrategy {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn accepts(&self, schema: &Schema) -> bool {
        schema.is_array()
    }

    fn tensor_schema(&self, schema: &Schema, dispatch: &StrategyDispatch) -> Result<TensorSchema> {
        let items = dispatch.tensor_schema(schema.items()?)?;
        Ok(TensorSchema::array(schema.variable_name(), items))
    }

    fn input_stack(
        &self,
        schema: &Schema,
        input_node: &Node,
        root_name: &str,
        dispatch: &StrategyDispatch,
    ) -> Result<StackOutput> {
        let name = module_name(root_name, schema);

        let sub_name = format!("{}_itemInputStack", name);
        let sub_input = Node::source(Module::new("nn.Identity"), format!("{}_input", sub_name));
        let item_stack = dispatch.input_stack(schema.items()?, &sub_input, root_name)?;
        let dependencies = item_stack.additional_modules.iter().map(|m| m.name().to_string()).collect();
        let sub_module = CustomModule::new(sub_name, sub_input, item_stack.output_node.clone(), dependencies);

        let length_node = Node::unary(
            Module::with_params("nn.SelectTable", vec![1.into()]),
            input_node,
            format!("{}_lengthNode", name),
        );
        let sequence_node = Node::unary(
            Module::with_params("nn.SelectTable", vec![2.into()]),
            input_node,
            format!("{}_sequenceNode", name),
        );
        let processor = Node::unary(map_module(&sub_module), &sequence_node, format!("{}_subModuleProcessor", name));

        let summary = summary_module(&item_stack.output_tensor_schema);
        let summarizer = Node::unary(
            Module::with_params("nn.MapTable", vec![Parameter::Module(summary.module)]),
            &processor,
            format!("{}_summarizerNode", name),
        );
        let unsqueeze = Node::unary(
            Module::with_params(
                "nn.MapTable",
                vec![Parameter::Module(Module::with_params("nn.Unsqueeze", vec![1.into()]))],
            ),
            &summarizer,
            format!("{}_unsqueezeInput", name),
        );
        let fused = Node::unary(
            Module::with_params("nn.JoinTable", vec![1.into()]),
            &unsqueeze,
            format!("{}_fuseRNNInputTensors", name),
        );

        let (rnn_stack, rnn_output) =
            create_module_chain(&sequence_layers(schema), &summary.tensor_schema, &Substitutions::new())?;
        let rnn = Node::unary(rnn_stack, &fused, format!("{}_rnnStackModule", name));
        let split = Node::unary(
            Module::with_params("nn.SplitTable", vec![1.into()]),
            &rnn,
            format!("{}_splitNode", name),
        );
        let output_node = Node::new(Module::new("nn.Identity"), vec![length_node, split], format!("{}_outputNode", name));

        let lstm_output = format!("{}_lstmOutput", name);
        let items = TensorSchema::data_tensor(rnn_output.tensor_size(), &format!("{}_items", lstm_output));

        let mut additional_modules = vec![sub_module];
        additional_modules.extend(item_stack.additional_modules);
        Ok(StackOutput {
            output_node,
            output_tensor_schema: TensorSchema::array(&lstm_output, items),
            additional_modules,
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
        let name = module_name(root_name, schema);
        let target = format!("{}_lstmOutput", name);

        let path = if input_tensor_schema.variable_name() == target {
            Vec::new()
        } else {
            input_tensor_schema.find_named(&target).ok_or_else(|| {
                Error::MissingNamedTensor(format!(
                    "Output sequence '{}' needs the input tensor {}",
                    schema.title, target
                ))
            })?
        };
        let sequence_tensor_schema = input_tensor_schema
            .at_path(&path)
            .ok_or_else(|| Error::MissingNamedTensor(target.clone()))?;

        // One selection per level of nesting, the last one names the field
        let mut extracted = input_node.clone();
        for (depth, position) in path.iter().enumerate() {
            let node_name = if depth + 1 == path.len() {
                format!("{}_extractField", name)
            } else {
                format!("{}_extractField_{}", name, depth + 1)
            };
            extracted = Node::unary(
                Module::with_params("nn.SelectTable", vec![(position + 1).into()]),
                &extracted,
                node_name,
            );
        }

        let length_node = Node::unary(
            Module::with_params("nn.SelectTable", vec![1.into()]),
            &extracted,
            format!("{}_outputLengthNode", name),
        );
        let sequence_node = Node::unary(
            Module::with_params("nn.SelectTable", vec![2.into()]),
            &extracted,
            format!("{}_outputSequenceNode", name),
        );

        let sub_name = format!("{}_itemOutputStack", name);
        let sub_input = Node::source(Module::new("nn.Identity"), format!("{}_input", sub_name));
        let item_stack =
            dispatch.output_stack(schema.items()?, &sub_input, sequence_tensor_schema.items()?, root_name)?;
        let dependencies = item_stack.additional_modules.iter().map(|m| m.name().to_string()).collect();
        let sub_module = CustomModule::new(sub_name, sub_input, item_stack.output_node.clone(), dependencies);

        let processor = Node::unary(map_module(&sub_module), &sequence_node, format!("{}_outputProcessor", name));
        let joint = Node::new(
            Module::new("nn.Identity"),
            vec![length_node, processor],
            format!("{}_jointOutputNode", name),
        );

        let mut additional_modules = vec![sub_module];
        additional_modules.extend(item_stack.additional_modules);
        Ok(StackOutput {
            output_node: joint,
            output_tensor_schema: TensorSchema::array(&name, item_stack.output_tensor_schema),
            additional_modules,
        })
    }

    fn criterion(&self, schema: &Schema, dispatch: &StrategyDispatch) -> Result<Module> {
        let item = dispatch.criterion(schema.items()?)?;
        Ok(Module::container(
            "nn.ParallelCriterion",
            vec![
                Module::new("nn.EBSequenceLengthCriterion"),
                Module::with_params("nn.SequencerCriterion", vec![Parameter::Module(item)]),
            ],
        ))
    }

    fn tensor_input_code(&self, schema: &Schema, name: &str, dispatch: &StrategyDispatch) -> Result<Stmt> {
        let sub_name = format!("{}_items", name);
        let body = Block(vec![
            dispatch.tensor_input_code(schema.items()?, &sub_name)?,
            local(
                "transformed",
                Expr::Table(vec![length_tensor(len(raw("input"))), Expr::Table(Vec::new())]),
            ),
            Stmt::NumericFor(
                "n".to_string(),
                num(1),
                len(raw("input")),
                Block(vec![
                    local("item", call(&sub_name, vec![index(raw("input"), raw("n"))])),
                    table_insert(index(raw("transformed"), num(2)), raw("item")),
                ]),
            ),
            Stmt::Return(raw("transformed")),
        ]);
        Ok(local_function(name, &["input"], body))
    }

    fn tensor_output_code(&self, schema: &Schema, name: &str, dispatch: &StrategyDispatch) -> Result<Stmt> {
        let sub_name = format!("{}_items", name);
        let body = Block(vec![
            dispatch.tensor_output_code(schema.items()?, &sub_name)?,
            local("transformed", Expr::Table(Vec::new())),
            Stmt::NumericFor(
                "n".to_string(),
                num(1),
                index(index(raw("input"), num(1)), num(1)),
                Block(vec![
                    local(
                        "item",
                        call(&sub_name, vec![index(index(raw("input"), num(2)), raw("n"))]),
                    ),
                    table_insert(raw("transformed"), raw("item")),
                ]),
            ),
            Stmt::Return(raw("transformed")),
        ]);
        Ok(local_function(name, &["input"], body))
    }

    fn prepare_batch_code(&self, schema: &Schema, name: &str, dispatch: &StrategyDispatch) -> Result<Stmt> {
        let items = schema.items()?;
        let sub_name = format!("{}_items", name);
        let empty_name = format!("generateEmpty_{}_item", name);
        let length_of = |sample: Expr| index(index(sample, num(1)), num(1));
        let sample = index(raw("input"), raw("k"));

        let mut body = Block(vec![
            dispatch.prepare_batch_code(items, &sub_name)?,
            empty_tensor_function(&dispatch.tensor_schema(items)?, &empty_name),
            local("longest", num(0)),
            each_sample(Block(vec![Stmt::Assign(
                raw("longest"),
                call("math.max", vec![raw("longest"), length_of(sample.clone())]),
            )])),
            local(
                "batch",
                Expr::Table(vec![
                    call("torch.Tensor", vec![len(raw("input"))]),
                    Expr::Table(Vec::new()),
                ]),
            ),
            each_sample(Block(vec![Stmt::Assign(
                index(index(raw("batch"), num(1)), raw("k")),
                length_of(sample.clone()),
            )])),
        ]);

        let component = schema.component();
        if component.enforce_sequence_length_limit {
            body.push(Stmt::Comment("Enforce a maximum length".to_string()));
            body.push(Stmt::Assign(
                raw("longest"),
                call(
                    "math.min",
                    vec![raw("longest"), num(component.max_sequence_length as f64)],
                ),
            ));
        }

        body.push(Stmt::NumericFor(
            "n".to_string(),
            num(1),
            raw("longest"),
            Block(vec![
                local("samples", Expr::Table(Vec::new())),
                each_sample(Block(vec![Stmt::If(
                    binary(length_of(sample.clone()), ">=", raw("n")),
                    Block(vec![table_insert(raw("samples"), index(index(sample, num(2)), raw("n")))]),
                    Some(Block(vec![table_insert(raw("samples"), call(&empty_name, Vec::new()))])),
                )])),
                local("item", call(&sub_name, vec![raw("samples")])),
                table_insert(index(raw("batch"), num(2)), raw("item")),
            ]),
        ));
        body.push(Stmt::Return(raw("batch")));
        Ok(local_function(name, &["input"], body))
    }

    fn unwind_batch_code(&self, schema: &Schema, name: &str, dispatch: &StrategyDispatch) -> Result<Stmt> {
        let sub_name = format!("{}_items", name);
        let output = index(raw("outputs"), raw("s"));
        let length = index(index(raw("input"), num(1)), raw("s"));

        let per_sample = Block(vec![Stmt::If(
            binary(raw("n"), "<=", length.clone()),
            Block(vec![
                Stmt::If(
                    Expr::Not(Box::new(output.clone())),
                    Block(vec![Stmt::Assign(
                        output.clone(),
                        Expr::Table(vec![length_tensor(length), Expr::Table(Vec::new())]),
                    )]),
                    None,
                ),
                table_insert(index(output, num(2)), index(raw("items"), raw("s"))),
            ]),
            None,
        )]);

        let body = Block(vec![
            dispatch.unwind_batch_code(schema.items()?, &sub_name)?,
            local("outputs", Expr::Table(Vec::new())),
            Stmt::NumericFor(
                "n".to_string(),
                num(1),
                len(index(raw("input"), num(2))),
                Block(vec![
                    local("items", call(&sub_name, vec![index(index(raw("input"), num(2)), raw("n"))])),
                    Stmt::NumericFor("s".to_string(), num(1), len(raw("items")), per_sample),
                ]),
            ),
            Stmt::Return(raw("outputs")),
        ]);
        Ok(local_function(name, &["input"], body))
    }
}
