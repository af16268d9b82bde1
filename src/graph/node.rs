// Computation graph nodes
//
// Nodes are shared, immutable DAG vertices. Identity is pointer identity: two
// nodes built with the same module and name are still distinct vertices.

use std::fmt;
use std::rc::Rc;

use crate::graph::lua::{raw, Expr};
use crate::graph::module::{Module, Parameter};

#[derive(Debug)]
struct NodeData {
    module: Module,
    inputs: Vec<Node>,
    name: String,
}

/// A graph vertex applying a module to zero or more input nodes
#[derive(Clone)]
pub struct Node(Rc<NodeData>);

impl Node {
    /// Creates a node fed by the given inputs
    pub fn new(module: Module, inputs: Vec<Node>, name: impl Into<String>) -> Self {
        Node(Rc::new(NodeData {
            module,
            inputs,
            name: name.into(),
        }))
    }

    /// Creates a node without inputs, the entry point of a graph
    pub fn source(module: Module, name: impl Into<String>) -> Self {
        Self::new(module, Vec::new(), name)
    }

    /// Creates a node fed by a single input
    pub fn unary(module: Module, input: &Node, name: impl Into<String>) -> Self {
        Self::new(module, vec![input.clone()], name)
    }

    pub fn module(&self) -> &Module {
        &self.0.module
    }

    pub fn inputs(&self) -> &[Node] {
        &self.0.inputs
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Pointer identity
    pub fn same(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Input argument of the node call: nothing, a name, or a table of names
    pub fn input_expr(&self) -> String {
        match self.inputs() {
            [] => String::new(),
            [single] => single.name().to_string(),
            many => {
                let names: Vec<&str> = many.iter().map(|n| n.name()).collect();
                format!("{{{}}}", names.join(", "))
            }
        }
    }

    /// Declaration expression `<module>(<inputs>)`, optionally wrapped for debugging
    pub fn declaration(&self, debug: bool) -> Expr {
        let module = if debug {
            Module::with_params(
                "nn.EBWrapDebug",
                vec![
                    Parameter::Module(self.module().clone()),
                    Parameter::Str(self.name().to_string()),
                ],
            )
        } else {
            self.module().clone()
        };
        Expr::Call(Box::new(Expr::Module(module)), vec![raw(self.input_expr())])
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs: Vec<&str> = self.inputs().iter().map(|n| n.name()).collect();
        f.debug_struct("Node")
            .field("name", &self.name())
            .field("module", &self.module().class())
            .field("inputs", &inputs)
            .finish()
    }
}
