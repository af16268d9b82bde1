// Object strategy
//
// Objects are tables holding one value per property, in sorted property
// order. Every stack and every conversion procedure delegates to the
// strategies of the properties and assembles their results positionally.

use crate::compiler::{module_name, StackOutput, StrategyDispatch, TensorStrategy};
use crate::graph::lua::{
    binary, call, index, len, local, local_function, num, raw, string, table_insert, Block, Expr, Stmt,
};
use crate::graph::{Module, Node};
use crate::internal::error::Result;
use crate::schema::types::Schema;
use crate::tensor::TensorSchema;

/// Gathers child outputs into a single table node
fn collect_outputs(outputs: Vec<Node>, name: String) -> Node {
    match outputs.len() {
        1 => Node::new(Module::new("nn.EBWrapTable"), outputs, name),
        _ => Node::new(Module::new("nn.Identity"), outputs, name),
    }
}

fn object_name(schema: &Schema) -> String {
    let name = schema.machine_variable_path();
    if name.is_empty() {
        "root".to_string()
    } else {
        name
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectStrategy;

impl TensorStrategy for ObjectStrategy {
    fn name(&self) -> &'static str {
        "object"
    }

    fn accepts(&self, schema: &Schema) -> bool {
        schema.is_object()
    }

    fn tensor_schema(&self, schema: &Schema, dispatch: &StrategyDispatch) -> Result<TensorSchema> {
        let properties = schema
            .children()
            .into_iter()
            .map(|child| dispatch.tensor_schema(child))
            .collect::<Result<Vec<_>>>()?;
        Ok(TensorSchema::object(&object_name(schema), properties))
    }

    fn input_stack(
        &self,
        schema: &Schema,
        input_node: &Node,
        root_name: &str,
        dispatch: &StrategyDispatch,
    ) -> Result<StackOutput> {
        let name = module_name(root_name, schema);
        let mut outputs = Vec::new();
        let mut tensor_schemas = Vec::new();
        let mut additional_modules = Vec::new();

        for (position, child) in schema.children().into_iter().enumerate() {
            let select = Node::unary(
                Module::with_params("nn.SelectTable", vec![(position + 1).into()]),
                input_node,
                format!("{}_selectField_{}", name, child.machine_variable_name()),
            );
            let stack = dispatch.input_stack(child, &select, root_name)?;
            outputs.push(stack.output_node);
            tensor_schemas.push(stack.output_tensor_schema);
            additional_modules.extend(stack.additional_modules);
        }

        Ok(StackOutput {
            output_node: collect_outputs(outputs, format!("{}_outputs", name)),
            output_tensor_schema: TensorSchema::object(&name, tensor_schemas),
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
        let mut outputs = Vec::new();
        let mut tensor_schemas = Vec::new();
        let mut additional_modules = Vec::new();

        for child in schema.children() {
            let stack = dispatch.output_stack(child, input_node, input_tensor_schema, root_name)?;
            outputs.push(stack.output_node);
            tensor_schemas.push(stack.output_tensor_schema);
            additional_modules.extend(stack.additional_modules);
        }

        let name = module_name(root_name, schema);
        Ok(StackOutput {
            output_node: collect_outputs(outputs, format!("{}_outputObject", name)),
            output_tensor_schema: TensorSchema::object(&object_name(schema), tensor_schemas),
            additional_modules,
        })
    }

    fn criterion(&self, schema: &Schema, dispatch: &StrategyDispatch) -> Result<Module> {
        let children = schema
            .children()
            .into_iter()
            .map(|child| dispatch.criterion(child))
            .collect::<Result<Vec<_>>>()?;
        Ok(Module::container("nn.ParallelCriterion", children))
    }

    fn tensor_input_code(&self, schema: &Schema, name: &str, dispatch: &StrategyDispatch) -> Result<Stmt> {
        let mut body = Block(vec![local("transformed", Expr::Table(Vec::new()))]);
        for child in schema.children() {
            let sub_name = format!("generateTensor_{}", child.machine_variable_name());
            body.push(dispatch.tensor_input_code(child, &sub_name)?);
            let field = index(raw("input"), string(child.variable_name()));
            body.push(table_insert(raw("transformed"), call(&sub_name, vec![field])));
        }
        body.push(Stmt::Return(raw("transformed")));
        Ok(local_function(name, &["input"], body))
    }

    fn tensor_output_code(&self, schema: &Schema, name: &str, dispatch: &StrategyDispatch) -> Result<Stmt> {
        let mut body = Block(vec![local("transformed", Expr::Table(Vec::new()))]);
        for (position, child) in schema.children().into_iter().enumerate() {
            let sub_name = format!("generateJSON_{}", child.machine_variable_name());
            body.push(dispatch.tensor_output_code(child, &sub_name)?);
            let value = call(&sub_name, vec![index(raw("input"), num(position as f64 + 1.0))]);
            body.push(Stmt::Assign(index(raw("transformed"), string(child.variable_name())), value));
        }
        body.push(Stmt::Return(raw("transformed")));
        Ok(local_function(name, &["input"], body))
    }

    fn prepare_batch_code(&self, schema: &Schema, name: &str, dispatch: &StrategyDispatch) -> Result<Stmt> {
        let mut body = Block(vec![local("batch", Expr::Table(Vec::new()))]);
        for (position, child) in schema.children().into_iter().enumerate() {
            let machine = child.machine_variable_name();
            let sub_name = format!("prepareBatch_{}", machine);
            let values = format!("values_{}", machine);
            let slot = num(position as f64 + 1.0);

            body.push(dispatch.prepare_batch_code(child, &sub_name)?);
            body.push(local(&values, Expr::Table(Vec::new())));
            body.push(Stmt::GenericFor(
                vec!["k".to_string(), "v".to_string()],
                call("pairs", vec![raw("input")]),
                Block(vec![table_insert(
                    raw(values.as_str()),
                    index(index(raw("input"), raw("k")), slot.clone()),
                )]),
            ));
            body.push(Stmt::Assign(index(raw("batch"), slot), call(&sub_name, vec![raw(values)])));
        }
        body.push(Stmt::Return(raw("batch")));
        Ok(local_function(name, &["input"], body))
    }

    fn unwind_batch_code(&self, schema: &Schema, name: &str, dispatch: &StrategyDispatch) -> Result<Stmt> {
        let mut body = Block(vec![
            local("samples", Expr::Table(Vec::new())),
            local("decomposed", Expr::Table(Vec::new())),
        ]);
        for (position, child) in schema.children().into_iter().enumerate() {
            let sub_name = format!("unwindBatch_{}", child.machine_variable_name());
            let slot = num(position as f64 + 1.0);
            let part = index(raw("decomposed"), slot.clone());
            let sample = index(raw("samples"), raw("s"));

            body.push(dispatch.unwind_batch_code(child, &sub_name)?);
            body.push(Stmt::Assign(
                part.clone(),
                call(&sub_name, vec![index(raw("input"), slot.clone())]),
            ));
            body.push(Stmt::NumericFor(
                "s".to_string(),
                num(1),
                len(part.clone()),
                Block(vec![
                    Stmt::Assign(sample.clone(), binary(sample.clone(), "or", Expr::Table(Vec::new()))),
                    Stmt::Assign(index(sample, slot), index(part, raw("s"))),
                ]),
            ));
        }
        body.push(Stmt::Return(raw("samples")));
        Ok(local_function(name, &["input"], body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::config::CompilerConfig;
    use crate::schema::types::SchemaType;
    use std::collections::BTreeMap;

    /// `{a: number, b: {c: number, d: number}}`
    fn nested() -> Schema {
        let mut inner = BTreeMap::new();
        inner.insert("c".to_string(), Schema::leaf("", SchemaType::Number));
        inner.insert("d".to_string(), Schema::leaf("", SchemaType::Number));
        let mut properties = BTreeMap::new();
        properties.insert("a".to_string(), Schema::leaf("", SchemaType::Number));
        properties.insert("b".to_string(), Schema::object("", inner));
        let mut schema = Schema::object("", properties);
        schema.update_variable_names_and_paths();
        schema
    }

    #[test]
    fn test_tensor_schema_sizes() {
        let dispatch = StrategyDispatch::with_defaults(CompilerConfig::default());
        let tensor = ObjectStrategy.tensor_schema(&nested(), &dispatch).unwrap();
        assert!(tensor.is_object());
        assert_eq!(tensor.properties().len(), 2);
        assert_eq!(tensor.size(), 3);
        assert_eq!(tensor.properties()[1].variable_name(), "b");
    }

    #[test]
    fn test_input_stack_selects_fields_in_order() {
        let dispatch = StrategyDispatch::with_defaults(CompilerConfig::default());
        let input = Node::source(Module::new("nn.Identity"), "input");
        let stack = ObjectStrategy.input_stack(&nested(), &input, "main", &dispatch).unwrap();

        assert_eq!(stack.output_node.name(), "main_root_outputs");
        let inputs: Vec<&str> = stack.output_node.inputs().iter().map(|n| n.name()).collect();
        assert_eq!(inputs, vec!["main_a_inputStack", "main_b_outputs"]);

        let select = &stack.output_node.inputs()[0].inputs()[0];
        assert_eq!(select.name(), "main_root_selectField_a");
        assert_eq!(select.module().render(0), "nn.SelectTable(1)");
        assert_eq!(stack.output_tensor_schema.size(), 3);
    }

    #[test]
    fn test_single_child_is_wrapped() {
        let mut properties = BTreeMap::new();
        properties.insert("only".to_string(), Schema::leaf("", SchemaType::Number));
        let mut schema = Schema::object("", properties);
        schema.update_variable_names_and_paths();

        let dispatch = StrategyDispatch::with_defaults(CompilerConfig::default());
        let input = Node::source(Module::new("nn.Identity"), "input");
        let stack = ObjectStrategy.input_stack(&schema, &input, "main", &dispatch).unwrap();
        assert_eq!(stack.output_node.module().class(), "nn.EBWrapTable");
    }

    #[test]
    fn test_criterion_is_parallel() {
        let dispatch = StrategyDispatch::with_defaults(CompilerConfig::default());
        let criterion = ObjectStrategy.criterion(&nested(), &dispatch).unwrap();
        assert_eq!(criterion.class(), "nn.ParallelCriterion");
        assert_eq!(criterion.children()[1].children().len(), 2);
    }

    #[test]
    fn test_conversion_code_nests_children() {
        let dispatch = StrategyDispatch::with_defaults(CompilerConfig::default());
        let code = Block(vec![ObjectStrategy.tensor_input_code(&nested(), "convert", &dispatch).unwrap()]).render();
        assert!(code.contains("    local generateTensor_b = function (input)\n"));
        assert!(code.contains("        local generateTensor_c = function (input)\n"));
        assert!(code.contains("    table.insert(transformed, generateTensor_a(input[\"a\"]))\n"));

        let unwind = Block(vec![ObjectStrategy.unwind_batch_code(&nested(), "unwind", &dispatch).unwrap()]).render();
        assert!(unwind.contains("    decomposed[2] = unwindBatch_b(input[2])\n"));
        assert!(unwind.contains("    for s=1,#decomposed[2] do\n"));
        assert!(unwind.contains("        samples[s] = samples[s] or {}\n"));
        assert!(unwind.contains("        samples[s][2] = decomposed[2][s]\n"));
    }
}
