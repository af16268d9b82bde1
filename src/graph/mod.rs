// Computation graph model
//
// Modules, graph nodes and reusable sub-graphs, plus the Lua syntax tree used
// to render them as source text for the tensor runtime.

pub mod custom_module;
pub mod lua;
pub mod module;
pub mod node;

pub use self::custom_module::CustomModule;
pub use self::module::{Module, Parameter};
pub use self::node::Node;
