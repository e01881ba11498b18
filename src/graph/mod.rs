//! Module graph and in-place rewriting
//!
//! A [`ModelGraph`] is an owned tree: containers hold their children in named,
//! ordered slots, and any node is reachable through its dotted path. Rewrites
//! swap a slot's module without touching the rest of the tree, so the set of
//! paths is the same before and after quantization.

mod container;
mod module;
mod path;
mod tree;

pub use container::{Container, ContainerKind};
pub use module::{Module, ModuleKind};
pub use path::{join_path, split_path};
pub use tree::ModelGraph;
