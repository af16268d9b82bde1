// Neural network modules
//
// A module is an operator class with ordered constructor parameters and an
// ordered list of child modules. Children are attached with `:add(...)`, the
// container convention of the target runtime.

use crate::graph::lua::{format_number, quote, INDENT};

/// Constructor parameter of a module
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    Number(f64),
    /// Rendered as a quoted string literal
    Str(String),
    /// Nested module, rendered inline
    Module(Module),
    /// Verbatim expression text
    Raw(String),
}

impl Parameter {
    fn render(&self, depth: usize) -> String {
        match self {
            Parameter::Number(value) => format_number(*value),
            Parameter::Str(text) => quote(text),
            Parameter::Module(module) => module.render(depth),
            Parameter::Raw(text) => text.clone(),
        }
    }
}

impl From<f64> for Parameter {
    fn from(value: f64) -> Self {
        Parameter::Number(value)
    }
}

impl From<usize> for Parameter {
    fn from(value: usize) -> Self {
        Parameter::Number(value as f64)
    }
}

impl From<i32> for Parameter {
    fn from(value: i32) -> Self {
        Parameter::Number(f64::from(value))
    }
}

impl From<Module> for Parameter {
    fn from(module: Module) -> Self {
        Parameter::Module(module)
    }
}

/// An operator instance such as `nn.Linear(10, 20)`
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    class: String,
    parameters: Vec<Parameter>,
    children: Vec<Module>,
}

impl Module {
    /// Creates a module without parameters
    pub fn new(class: &str) -> Self {
        Self {
            class: class.to_string(),
            parameters: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Creates a module with constructor parameters
    pub fn with_params(class: &str, parameters: Vec<Parameter>) -> Self {
        Self {
            class: class.to_string(),
            parameters,
            children: Vec::new(),
        }
    }

    /// Creates a container module holding `children` in order
    pub fn container(class: &str, children: Vec<Module>) -> Self {
        Self {
            class: class.to_string(),
            parameters: Vec::new(),
            children,
        }
    }

    /// Appends a child module
    pub fn add(&mut self, child: Module) -> &mut Self {
        self.children.push(child);
        self
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn children(&self) -> &[Module] {
        &self.children
    }

    /// Renders the constructor call; children render one level deeper
    pub fn render(&self, depth: usize) -> String {
        let params: Vec<String> = self.parameters.iter().map(|p| p.render(depth + 1)).collect();
        let mut out = format!("{}({})", self.class, params.join(", "));
        let child_indent = INDENT.repeat(depth + 2);
        for child in &self.children {
            out.push('\n');
            out.push_str(&child_indent);
            out.push_str(":add(");
            out.push_str(&child.render(depth + 1));
            out.push(')');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_parameters() {
        let module = Module::with_params("nn.Linear", vec![Parameter::from(10usize), Parameter::from(2.5)]);
        assert_eq!(module.render(0), "nn.Linear(10, 2.5)");

        let debug = Module::with_params(
            "nn.EBWrapDebug",
            vec![Parameter::Module(Module::new("nn.Identity")), Parameter::Str("x".to_string())],
        );
        assert_eq!(debug.render(0), "nn.EBWrapDebug(nn.Identity(), \"x\")");
    }

    #[test]
    fn test_render_children() {
        let mut inner = Module::new("nn.ParallelTable");
        inner.add(Module::new("nn.Identity"));

        let module = Module::container("nn.Sequential", vec![inner, Module::with_params("nn.JoinTable", vec![2.into()])]);
        let expected = "nn.Sequential()\n\
                        \x20       :add(nn.ParallelTable()\n\
                        \x20           :add(nn.Identity()))\n\
                        \x20       :add(nn.JoinTable(2))";
        assert_eq!(module.render(0), expected);
    }
}
