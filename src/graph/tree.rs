//! Module tree with path-addressed lookup and in-place substitution.

use super::path::{join_path, split_path};
use super::{Container, Module, ModuleKind};
use crate::error::{Error, Result};
use crate::gemm::GemmDispatcher;
use crate::tensor::Tensor;
use std::collections::BTreeMap;

/// Ordered tree of named modules rooted at a sequential container.
///
/// Every node is addressed by the dotted path of child names leading to it.
/// The root itself has no path and is never a substitution target.
#[derive(Debug, Clone)]
pub struct ModelGraph {
    root: Container,
}

impl ModelGraph {
    /// Wrap a root container.
    pub fn new(root: Container) -> Self {
        Self { root }
    }

    /// Get the root container.
    pub fn root(&self) -> &Container {
        &self.root
    }

    /// Pre-order snapshot of every `(path, module)` below the root.
    pub fn named_modules(&self) -> Vec<(String, &Module)> {
        let mut out = Vec::new();
        collect(&self.root, "", &mut out);
        out
    }

    /// Pre-order list of module paths.
    pub fn module_paths(&self) -> Vec<String> {
        self.named_modules().into_iter().map(|(p, _)| p).collect()
    }

    /// Number of modules of each kind.
    pub fn count_by_kind(&self) -> BTreeMap<ModuleKind, usize> {
        let mut counts = BTreeMap::new();
        for (_, module) in self.named_modules() {
            *counts.entry(module.kind()).or_insert(0) += 1;
        }
        counts
    }

    /// Resolve a dotted path such as `layers.0.mlp.up_proj`.
    pub fn get_submodule(&self, path: &str) -> Result<&Module> {
        let (parent, leaf) = split_path(path)?;
        self.resolve_container(parent, path)?
            .child(leaf)
            .ok_or_else(|| unresolved(path))
    }

    /// Rebind the slot at `path`, returning the module it held.
    ///
    /// The parent container is resolved from the path prefix and only the
    /// leaf slot changes. Nothing is modified if the path does not resolve.
    pub fn set_submodule(&mut self, path: &str, module: Module) -> Result<Module> {
        let (parent, leaf) = split_path(path)?;
        self.resolve_container_mut(parent, path)?
            .replace_child(leaf, module)
            .ok_or_else(|| unresolved(path))
    }

    /// Replace every module matching `predicate` with the output of `factory`.
    ///
    /// Matches are snapshotted before any substitution, so replacements are
    /// never revisited. The factory borrows the old module; if it fails, that
    /// slot and all later ones keep their current module. Returns the rewritten
    /// paths in pre-order.
    pub fn replace_modules<P, F>(&mut self, mut predicate: P, mut factory: F) -> Result<Vec<String>>
    where
        P: FnMut(&str, &Module) -> bool,
        F: FnMut(&str, &Module) -> Result<Module>,
    {
        let targets: Vec<String> = self
            .named_modules()
            .into_iter()
            .filter(|(path, module)| predicate(path, module))
            .map(|(path, _)| path)
            .collect();

        for path in &targets {
            let replacement = factory(path, self.get_submodule(path)?)?;
            self.set_submodule(path, replacement)?;
        }
        Ok(targets)
    }

    pub fn forward(&mut self, input: &Tensor, gemm: &GemmDispatcher) -> Result<Tensor> {
        self.root.forward(input, gemm)
    }

    fn resolve_container(&self, parent: &str, full: &str) -> Result<&Container> {
        let mut current = &self.root;
        if parent.is_empty() {
            return Ok(current);
        }
        for segment in parent.split('.') {
            current = current
                .child(segment)
                .and_then(Module::as_container)
                .ok_or_else(|| unresolved(full))?;
        }
        Ok(current)
    }

    fn resolve_container_mut(&mut self, parent: &str, full: &str) -> Result<&mut Container> {
        let mut current = &mut self.root;
        if parent.is_empty() {
            return Ok(current);
        }
        for segment in parent.split('.') {
            current = match current.child_mut(segment) {
                Some(Module::Container(c)) => c,
                _ => return Err(unresolved(full)),
            };
        }
        Ok(current)
    }
}

fn collect<'a>(container: &'a Container, prefix: &str, out: &mut Vec<(String, &'a Module)>) {
    for (name, module) in container.children() {
        let path = join_path(prefix, name);
        if let Module::Container(child) = module {
            out.push((path.clone(), module));
            collect(child, &path, out);
        } else {
            out.push((path, module));
        }
    }
}

fn unresolved(path: &str) -> Error {
    Error::UnresolvedPath {
        path: path.to_string(),
    }
}
