// Architecture compiler
//
// Strategies turn schema nodes into tensor layouts, graph stacks, loss
// criteria and conversion code. The dispatch picks a strategy by the shape of
// each node and is threaded through every strategy call so nested nodes are
// compiled by whichever strategy fits them.

use std::fmt::Debug;

use tracing::debug;

use crate::graph::lua::Stmt;
use crate::graph::{CustomModule, Module, Node};
use crate::internal::config::CompilerConfig;
use crate::internal::error::{Error, Result};
use crate::schema::types::Schema;
use crate::tensor::TensorSchema;

use self::layers::{multi_layer_lstm, multi_layer_perceptron, LayerSpec, NetworkSize, Substitutions};

pub mod architecture;
pub mod classification;
pub mod layers;
pub mod number;
pub mod object;
pub mod sequence;
pub mod summary;
pub mod word;

pub use self::architecture::{ArchitectureCompiler, CompiledArchitecture, GeneratedFile};

/// Result of building an input or output stack
#[derive(Debug, Clone)]
pub struct StackOutput {
    /// Last node of the stack
    pub output_node: Node,
    /// Layout of the values leaving `output_node`
    pub output_tensor_schema: TensorSchema,
    /// Sub-graphs the stack instantiates, emitted as their own files
    pub additional_modules: Vec<CustomModule>,
}

/// Compiler plugin for one schema shape.
///
/// Conversion code operations return `local <name> = function (input) ... end`
/// so callers can nest them under any unique name they choose.
pub trait TensorStrategy: Debug + Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Whether this strategy compiles the given node
    fn accepts(&self, schema: &Schema) -> bool;

    /// Layout of the node's values inside the network
    fn tensor_schema(&self, schema: &Schema, dispatch: &StrategyDispatch) -> Result<TensorSchema>;

    /// Graph converting the node's tensors into a network representation
    fn input_stack(
        &self,
        schema: &Schema,
        input_node: &Node,
        root_name: &str,
        dispatch: &StrategyDispatch,
    ) -> Result<StackOutput>;

    /// Graph producing the node's tensors from the shared upstream representation
    fn output_stack(
        &self,
        schema: &Schema,
        input_node: &Node,
        input_tensor_schema: &TensorSchema,
        root_name: &str,
        dispatch: &StrategyDispatch,
    ) -> Result<StackOutput>;

    /// Loss module for the node
    fn criterion(&self, schema: &Schema, dispatch: &StrategyDispatch) -> Result<Module>;

    /// Converts one network value into its tensor form
    fn tensor_input_code(&self, schema: &Schema, name: &str, dispatch: &StrategyDispatch) -> Result<Stmt>;

    /// Converts one tensor value back into its network form
    fn tensor_output_code(&self, schema: &Schema, name: &str, dispatch: &StrategyDispatch) -> Result<Stmt>;

    /// Combines a list of tensor values into a batch
    fn prepare_batch_code(&self, schema: &Schema, name: &str, dispatch: &StrategyDispatch) -> Result<Stmt>;

    /// Splits a batch back into a list of tensor values
    fn unwind_batch_code(&self, schema: &Schema, name: &str, dispatch: &StrategyDispatch) -> Result<Stmt>;
}

/// Registry of strategies, consulted in registration order
#[derive(Debug)]
pub struct StrategyDispatch {
    config: CompilerConfig,
    strategies: Vec<Box<dyn TensorStrategy>>,
}

impl StrategyDispatch {
    /// Creates a dispatch without any strategy
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            strategies: Vec::new(),
        }
    }

    /// Creates a dispatch holding every built-in strategy
    pub fn with_defaults(config: CompilerConfig) -> Self {
        let mut dispatch = Self::new(config);
        dispatch.register(Box::new(object::ObjectStrategy));
        dispatch.register(Box::new(sequence::SequenceStrategy));
        dispatch.register(Box::new(classification::ClassificationStrategy));
        dispatch.register(Box::new(number::NumberStrategy));
        dispatch.register(Box::new(word::WordStrategy));
        dispatch
    }

    /// Adds a strategy after the existing ones
    pub fn register(&mut self, strategy: Box<dyn TensorStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// First registered strategy accepting `schema`
    pub fn strategy_for(&self, schema: &Schema) -> Result<&dyn TensorStrategy> {
        let strategy = self
            .strategies
            .iter()
            .find(|strategy| strategy.accepts(schema))
            .ok_or_else(|| {
                Error::SchemaShapeMismatch(format!(
                    "No strategy compiles field '{}' of type {}{}",
                    schema.title,
                    schema.schema_type,
                    if schema.enum_values.is_some() { " with enum" } else { "" }
                ))
            })?;
        debug!(field = %schema.title, strategy = strategy.name(), "Dispatching field");
        Ok(strategy.as_ref())
    }

    pub fn tensor_schema(&self, schema: &Schema) -> Result<TensorSchema> {
        self.strategy_for(schema)?.tensor_schema(schema, self)
    }

    pub fn input_stack(&self, schema: &Schema, input_node: &Node, root_name: &str) -> Result<StackOutput> {
        self.strategy_for(schema)?.input_stack(schema, input_node, root_name, self)
    }

    pub fn output_stack(
        &self,
        schema: &Schema,
        input_node: &Node,
        input_tensor_schema: &TensorSchema,
        root_name: &str,
    ) -> Result<StackOutput> {
        self.strategy_for(schema)?
            .output_stack(schema, input_node, input_tensor_schema, root_name, self)
    }

    pub fn criterion(&self, schema: &Schema) -> Result<Module> {
        self.strategy_for(schema)?.criterion(schema, self)
    }

    pub fn tensor_input_code(&self, schema: &Schema, name: &str) -> Result<Stmt> {
        self.strategy_for(schema)?.tensor_input_code(schema, name, self)
    }

    pub fn tensor_output_code(&self, schema: &Schema, name: &str) -> Result<Stmt> {
        self.strategy_for(schema)?.tensor_output_code(schema, name, self)
    }

    pub fn prepare_batch_code(&self, schema: &Schema, name: &str) -> Result<Stmt> {
        self.strategy_for(schema)?.prepare_batch_code(schema, name, self)
    }

    pub fn unwind_batch_code(&self, schema: &Schema, name: &str) -> Result<Stmt> {
        self.strategy_for(schema)?.unwind_batch_code(schema, name, self)
    }
}

/// Name prefix shared by every node a stack creates for `schema`
pub fn module_name(root_name: &str, schema: &Schema) -> String {
    let path = schema.machine_variable_path();
    if path.is_empty() {
        format!("{}_root", root_name)
    } else {
        format!("{}_{}", root_name, path)
    }
}

/// Configured fixed-size layers, or the medium perceptron when none are set
pub fn fixed_layers(schema: &Schema) -> Vec<LayerSpec> {
    let layers = schema.component().layers;
    if layers.is_empty() {
        multi_layer_perceptron(NetworkSize::Medium)
    } else {
        layers
    }
}

/// Configured recurrent layers, or the medium LSTM stack when none are set
pub fn sequence_layers(schema: &Schema) -> Vec<LayerSpec> {
    let layers = schema.component().layers;
    if layers.is_empty() {
        multi_layer_lstm(NetworkSize::Medium)
    } else {
        layers
    }
}

/// Substitutions binding `outputSize`
pub fn output_size(size: usize) -> Substitutions {
    let mut substitutions = Substitutions::new();
    substitutions.insert("outputSize".to_string(), size as f64);
    substitutions
}
