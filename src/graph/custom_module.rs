// Reusable sub-graphs
//
// A custom module is a named graph with its own input and output node. It is
// emitted as an independent source file defining a constructor `nn.<name>`
// that can be instantiated any number of times by other graphs.

use tracing::trace;

use crate::graph::lua::{call, method, raw, string, Block, Expr, Stmt};
use crate::graph::node::Node;

/// A named sub-graph emitted as its own source file
#[derive(Debug, Clone)]
pub struct CustomModule {
    name: String,
    input: Node,
    output: Node,
    dependencies: Vec<String>,
}

impl CustomModule {
    /// Creates a custom module from the input and output of an arranged graph
    pub fn new(name: impl Into<String>, input: Node, output: Node, dependencies: Vec<String>) -> Self {
        Self {
            name: name.into(),
            input,
            output,
            dependencies,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input(&self) -> &Node {
        &self.input
    }

    pub fn output(&self) -> &Node {
        &self.output
    }

    /// Names of the custom modules this one instantiates
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Module name with whitespace removed, used for the constructor and file
    pub fn identifier(&self) -> String {
        self.name.chars().filter(|c| !c.is_whitespace()).collect()
    }

    /// File name for the emitted source
    pub fn filename(&self) -> String {
        format!("{}.lua", self.identifier())
    }

    /// Nodes reachable from the output, every node after all of its inputs.
    ///
    /// Collection walks breadth first from the output. A node reached again
    /// through another path moves to the end of the collection and is walked
    /// again so its own inputs move with it. Reversing the collection yields
    /// the declaration order.
    pub fn build_order(&self) -> Vec<Node> {
        let mut all_nodes = vec![self.output.clone()];
        let mut queue = std::collections::VecDeque::from([self.output.clone()]);

        while let Some(node) = queue.pop_front() {
            for input in node.inputs() {
                if let Some(position) = all_nodes.iter().position(|n| n.same(input)) {
                    let moved = all_nodes.remove(position);
                    all_nodes.push(moved);
                } else {
                    all_nodes.push(input.clone());
                }
                queue.push_back(input.clone());
            }
        }

        all_nodes.reverse();
        all_nodes
    }

    /// Body of the constructor: declarations, annotations and the graph module
    pub fn graph_block(&self, debug: bool) -> Block {
        let nodes = self.build_order();
        trace!(module = %self.name, nodes = nodes.len(), "Emitting custom module");

        let mut block = Block::new();
        for node in &nodes {
            block.push(Stmt::Local(node.name().to_string(), Some(node.declaration(debug))));
        }
        block.push(Stmt::Blank);
        block.push(Stmt::Blank);
        block.push(Stmt::Comment("Annotations".to_string()));
        for node in &nodes {
            block.push(Stmt::Call(method(
                raw(node.name()),
                "annotate",
                vec![Expr::Raw(format!("{{name=\"{}\"}}", node.name()))],
            )));
        }
        block.push(Stmt::Blank);
        block.push(Stmt::Blank);
        block.push(Stmt::Local(
            "module".to_string(),
            Some(call(
                "nn.gModule",
                vec![
                    Expr::Table(vec![raw(self.input.name())]),
                    Expr::Table(vec![raw(self.output.name())]),
                ],
            )),
        ));
        block.push(Stmt::Return(raw("module")));
        block
    }

    /// Complete source file for the module
    pub fn generate_code(&self, debug: bool) -> String {
        let mut file = Block::new();
        for package in ["nn", "nngraph"] {
            file.push(Stmt::Call(call("require", vec![string(package)])));
        }
        for dependency in &self.dependencies {
            file.push(Stmt::Call(call("require", vec![string(dependency.as_str())])));
        }
        file.push(Stmt::Blank);

        let constructor = format!("nn.{}", self.identifier());
        file.push(Stmt::FunctionDecl(constructor.clone(), Vec::new(), self.graph_block(debug)));
        file.push(Stmt::Blank);
        file.push(Stmt::Return(raw(constructor)));
        file.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::module::Module;

    fn diamond() -> CustomModule {
        let input = Node::source(Module::new("nn.Identity"), "input");
        let left = Node::unary(Module::with_params("nn.SelectTable", vec![1.into()]), &input, "left");
        let right = Node::unary(Module::with_params("nn.SelectTable", vec![2.into()]), &input, "right");
        let deep = Node::unary(Module::new("nn.Tanh"), &right, "deep");
        let output = Node::new(Module::new("nn.CAddTable"), vec![left, deep], "output");
        CustomModule::new("my Module", input, output, vec!["dep".to_string()])
    }

    #[test]
    fn test_build_order_declares_each_node_once_after_inputs() {
        let module = diamond();
        let names: Vec<String> = module.build_order().iter().map(|n| n.name().to_string()).collect();
        assert_eq!(names.len(), 5);
        assert_eq!(names.first().map(String::as_str), Some("input"));
        assert_eq!(names.last().map(String::as_str), Some("output"));

        let position = |name: &str| names.iter().position(|n| n == name).unwrap();
        assert!(position("right") < position("deep"));
        assert!(position("left") < position("output"));
    }

    #[test]
    fn test_generate_code() {
        let module = diamond();
        assert_eq!(module.filename(), "myModule.lua");

        let code = module.generate_code(false);
        assert!(code.starts_with("require(\"nn\")\nrequire(\"nngraph\")\nrequire(\"dep\")\n"));
        assert!(code.contains("function nn.myModule()\n"));
        assert!(code.ends_with("return nn.myModule\n"));
        assert!(code.contains("    local input = nn.Identity()()\n"));
        assert!(code.contains("    local output = nn.CAddTable()({left, deep})\n"));
        assert!(code.contains("    output:annotate({name=\"output\"})\n"));
        assert!(code.contains("    local module = nn.gModule({input}, {output})\n"));
        assert!(code.contains("    return module\n"));

        let debug = module.generate_code(true);
        assert!(debug.contains("nn.EBWrapDebug(nn.Tanh(), \"deep\")(right)"));
    }

    #[test]
    fn test_emission_is_deterministic() {
        let module = diamond();
        assert_eq!(module.generate_code(false), module.generate_code(false));
    }
}
