// Layer catalog
//
// Layer stacks are stored in schema configuration as lists of `LayerSpec`
// entries. The catalog knows every supported layer, its parameters with
// defaults, and how it changes the shape of the tensor flowing through it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::module::{Module, Parameter};
use crate::internal::error::{Error, Result};
use crate::tensor::TensorSchema;

/// Values substituted for symbolic layer parameters, such as `outputSize`
pub type Substitutions = BTreeMap<String, f64>;

/// A configured layer inside a stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Catalog name of the layer
    pub name: String,
    /// Locked layers are not meant to be edited by users
    #[serde(default)]
    pub locked: bool,
    /// Layer parameters; strings may name a substitution value
    #[serde(flatten)]
    pub parameters: BTreeMap<String, Value>,
}

/// How a layer changes its input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayerShape {
    /// Output has the same shape as the input
    Preserving,
    /// `nn.<Name>(inputSize, outputSize)` with a data tensor of `outputSize`
    Projecting,
}

struct LayerInfo {
    name: &'static str,
    parameters: &'static [(&'static str, f64)],
    shape: LayerShape,
}

const KNOWN_LAYERS: &[LayerInfo] = &[
    LayerInfo { name: "HardTanh", parameters: &[("min_value", -1.0), ("max_value", 1.0)], shape: LayerShape::Preserving },
    LayerInfo { name: "HardShrink", parameters: &[("lambda", 0.5)], shape: LayerShape::Preserving },
    LayerInfo { name: "SoftShrink", parameters: &[("lambda", 0.5)], shape: LayerShape::Preserving },
    LayerInfo { name: "SoftMax", parameters: &[], shape: LayerShape::Preserving },
    LayerInfo { name: "SoftMin", parameters: &[], shape: LayerShape::Preserving },
    LayerInfo { name: "SoftPlus", parameters: &[], shape: LayerShape::Preserving },
    LayerInfo { name: "SoftSign", parameters: &[], shape: LayerShape::Preserving },
    LayerInfo { name: "LogSigmoid", parameters: &[], shape: LayerShape::Preserving },
    LayerInfo { name: "LogSoftMax", parameters: &[], shape: LayerShape::Preserving },
    LayerInfo { name: "Sigmoid", parameters: &[], shape: LayerShape::Preserving },
    LayerInfo { name: "Tanh", parameters: &[], shape: LayerShape::Preserving },
    LayerInfo { name: "ReLU", parameters: &[], shape: LayerShape::Preserving },
    LayerInfo { name: "ReLU6", parameters: &[], shape: LayerShape::Preserving },
    LayerInfo { name: "PReLU", parameters: &[], shape: LayerShape::Preserving },
    LayerInfo { name: "RReLU", parameters: &[("l", 1.0 / 8.0), ("u", 1.0 / 3.0)], shape: LayerShape::Preserving },
    LayerInfo { name: "ELU", parameters: &[("alpha", 1.0)], shape: LayerShape::Preserving },
    LayerInfo { name: "LeakyReLU", parameters: &[("negval", 0.01)], shape: LayerShape::Preserving },
    LayerInfo { name: "SpatialSoftMax", parameters: &[], shape: LayerShape::Preserving },
    LayerInfo { name: "SpatialLogSoftMax", parameters: &[], shape: LayerShape::Preserving },
    LayerInfo { name: "AddConstant", parameters: &[("constant", 1.0)], shape: LayerShape::Preserving },
    LayerInfo { name: "MulConstant", parameters: &[("constant", 1.0)], shape: LayerShape::Preserving },
    LayerInfo { name: "Dropout", parameters: &[("p", 0.4)], shape: LayerShape::Preserving },
    LayerInfo { name: "Linear", parameters: &[("outputSize", 100.0)], shape: LayerShape::Projecting },
    LayerInfo { name: "SparseLinear", parameters: &[("outputSize", 100.0)], shape: LayerShape::Projecting },
    LayerInfo { name: "SeqBRNN", parameters: &[("outputSize", 100.0)], shape: LayerShape::Projecting },
    LayerInfo { name: "SeqLSTM", parameters: &[("outputSize", 100.0)], shape: LayerShape::Projecting },
    LayerInfo { name: "SeqGRU", parameters: &[("outputSize", 100.0)], shape: LayerShape::Projecting },
];

fn layer_info(name: &str) -> Result<&'static LayerInfo> {
    KNOWN_LAYERS
        .iter()
        .find(|info| info.name == name)
        .ok_or_else(|| Error::LayerError(format!("Unknown layer type {}", name)))
}

/// Names of every layer in the catalog
pub fn known_layer_names() -> Vec<&'static str> {
    KNOWN_LAYERS.iter().map(|info| info.name).collect()
}

impl LayerSpec {
    /// Creates a layer with the catalog defaults for every parameter
    pub fn new(name: &str) -> Result<Self> {
        let info = layer_info(name)?;
        let parameters = info
            .parameters
            .iter()
            .map(|(param, default)| (param.to_string(), Value::from(*default)))
            .collect();
        Ok(Self {
            name: name.to_string(),
            locked: false,
            parameters,
        })
    }

    /// Sets a parameter, returning the updated layer
    pub fn with(mut self, parameter: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(parameter.to_string(), value.into());
        self
    }

    /// Marks the layer as locked
    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    /// Resolves a parameter to a number.
    ///
    /// A string naming a substitution takes the substituted value; anything
    /// else must parse as a number. Absent parameters use the catalog default.
    pub fn parameter_value(&self, parameter: &str, substitutions: &Substitutions) -> Result<f64> {
        let default = layer_info(&self.name)?
            .parameters
            .iter()
            .find(|(name, _)| *name == parameter)
            .map(|(_, value)| *value);

        match self.parameters.get(parameter) {
            None | Some(Value::Null) => default.ok_or_else(|| {
                Error::LayerError(format!("Layer {} has no parameter {}", self.name, parameter))
            }),
            Some(Value::String(text)) => match substitutions.get(text) {
                Some(value) => Ok(*value),
                None => text.trim().parse::<f64>().map_err(|_| {
                    Error::LayerError(format!(
                        "Parameter {} of layer {} has unresolvable value '{}'",
                        parameter, self.name, text
                    ))
                }),
            },
            Some(Value::Number(number)) => number.as_f64().ok_or_else(|| {
                Error::LayerError(format!("Parameter {} of layer {} is not finite", parameter, self.name))
            }),
            Some(other) => Err(Error::LayerError(format!(
                "Parameter {} of layer {} has unsupported value {}",
                parameter, self.name, other
            ))),
        }
    }

    /// Builds the module for this layer given the tensor flowing into it
    pub fn create_module(&self, input: &TensorSchema, substitutions: &Substitutions) -> Result<Module> {
        let info = layer_info(&self.name)?;
        require_tensor(&self.name, input)?;

        let class = format!("nn.{}", info.name);
        match info.shape {
            LayerShape::Projecting => {
                let output_size = self.parameter_value("outputSize", substitutions)?;
                Ok(Module::with_params(
                    &class,
                    vec![Parameter::from(input.tensor_size()), Parameter::Number(output_size)],
                ))
            }
            LayerShape::Preserving => {
                let params = info
                    .parameters
                    .iter()
                    .map(|(name, _)| self.parameter_value(name, substitutions).map(Parameter::Number))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Module::with_params(&class, params))
            }
        }
    }

    /// Tensor schema produced by this layer
    pub fn output_tensor_schema(&self, input: &TensorSchema, substitutions: &Substitutions) -> Result<TensorSchema> {
        let info = layer_info(&self.name)?;
        require_tensor(&self.name, input)?;
        match info.shape {
            LayerShape::Projecting => {
                let output_size = self.parameter_value("outputSize", substitutions)?;
                Ok(TensorSchema::data_tensor(output_size.max(0.0) as usize, "output"))
            }
            LayerShape::Preserving => Ok(input.clone()),
        }
    }
}

fn require_tensor(layer: &str, input: &TensorSchema) -> Result<()> {
    if input.is_tensor() {
        Ok(())
    } else {
        Err(Error::LayerError(format!(
            "Layer {} only accepts a raw tensor as input, '{}' describes a table",
            layer,
            input.variable_name()
        )))
    }
}

/// Chains `layers` into an `nn.Sequential`, returning it with the output layout
pub fn create_module_chain(
    layers: &[LayerSpec],
    input: &TensorSchema,
    substitutions: &Substitutions,
) -> Result<(Module, TensorSchema)> {
    let mut modules = Vec::with_capacity(layers.len());
    let mut current = input.clone();
    for layer in layers {
        modules.push(layer.create_module(&current, substitutions)?);
        current = layer.output_tensor_schema(&current, substitutions)?;
    }
    Ok((Module::container("nn.Sequential", modules), current))
}

/// Size of a generated layer template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl FromStr for NetworkSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "small" => Ok(NetworkSize::Small),
            "medium" => Ok(NetworkSize::Medium),
            "large" => Ok(NetworkSize::Large),
            other => Err(Error::UnrecognizedMode(format!("Unknown network size {}", other))),
        }
    }
}

impl fmt::Display for NetworkSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NetworkSize::Small => "small",
            NetworkSize::Medium => "medium",
            NetworkSize::Large => "large",
        })
    }
}

fn layer(name: &str, parameters: &[(&str, Value)]) -> LayerSpec {
    LayerSpec {
        name: name.to_string(),
        locked: false,
        parameters: parameters.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
    }
}

/// Multi-layer perceptron ending in a locked projection to `outputSize`
pub fn multi_layer_perceptron(size: NetworkSize) -> Vec<LayerSpec> {
    let hidden: &[u64] = match size {
        NetworkSize::Small => &[150],
        NetworkSize::Medium => &[250, 250],
        NetworkSize::Large => &[500, 500],
    };
    let mut layers = Vec::new();
    for width in hidden {
        layers.push(layer("Linear", &[("outputSize", Value::from(*width))]));
        layers.push(layer("ELU", &[("alpha", Value::from(1))]));
    }
    layers.push(layer("Linear", &[("outputSize", Value::from("outputSize"))]).locked());
    layers
}

/// Stack of bidirectional recurrent layers
pub fn multi_layer_lstm(size: NetworkSize) -> Vec<LayerSpec> {
    let (count, width) = match size {
        NetworkSize::Small => (2, 100u64),
        NetworkSize::Medium => (2, 300),
        NetworkSize::Large => (3, 500),
    };
    (0..count)
        .map(|_| layer("SeqBRNN", &[("outputSize", Value::from(width))]))
        .collect()
}
