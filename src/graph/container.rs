//! Internal graph nodes: ordered, named child slots plus a wiring rule.

use super::Module;
use crate::error::{Error, Result};
use crate::gemm::GemmDispatcher;
use crate::nn::{causal_attention, AttentionShape};
use crate::tensor::{ops, Tensor};
use serde::{Deserialize, Serialize};

/// How a container wires its children together in `forward`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ContainerKind {
    /// Children applied in order.
    Sequential,
    /// Pre-norm residual block: `input_layernorm`, `self_attn`,
    /// `post_attention_layernorm`, `mlp`.
    DecoderLayer,
    /// Causal attention over `q_proj`, `k_proj`, `v_proj`, `o_proj`.
    Attention {
        num_heads: usize,
        num_kv_heads: usize,
        rope_theta: f32,
    },
    /// `down_proj(act_fn(gate_proj(x)) * up_proj(x))`.
    GatedMlp,
}

impl ContainerKind {
    /// Get the display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            ContainerKind::Sequential => "Sequential",
            ContainerKind::DecoderLayer => "DecoderLayer",
            ContainerKind::Attention { .. } => "Attention",
            ContainerKind::GatedMlp => "GatedMlp",
        }
    }
}

/// Internal node owning its children in named, ordered slots.
#[derive(Debug, Clone)]
pub struct Container {
    kind: ContainerKind,
    children: Vec<(String, Module)>,
}

impl Container {
    /// Create an empty container of `kind`.
    pub fn new(kind: ContainerKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    /// Create an empty sequential container.
    pub fn sequential() -> Self {
        Self::new(ContainerKind::Sequential)
    }

    /// Builder-style [`push`](Self::push).
    pub fn with_child(mut self, name: impl Into<String>, module: impl Into<Module>) -> Result<Self> {
        self.push(name, module)?;
        Ok(self)
    }

    /// Append a child slot. Names must be unique and free of `.`.
    pub fn push(&mut self, name: impl Into<String>, module: impl Into<Module>) -> Result<()> {
        let name = name.into();
        if name.is_empty() || name.contains('.') {
            return Err(Error::InvalidGraph(format!("invalid child name '{name}'")));
        }
        if self.child(&name).is_some() {
            return Err(Error::InvalidGraph(format!("duplicate child name '{name}'")));
        }
        self.children.push((name, module.into()));
        Ok(())
    }

    /// Get the container kind.
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Get the children in insertion order.
    pub fn children(&self) -> &[(String, Module)] {
        &self.children
    }

    /// Get the number of direct children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Check if there are no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Get a direct child by name.
    pub fn child(&self, name: &str) -> Option<&Module> {
        self.children.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    /// Get a direct child by name, mutably.
    pub fn child_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.children
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, m)| m)
    }

    /// Rebind an existing slot, returning the module it held.
    ///
    /// Returns `None` and leaves the container untouched if `name` is not a slot.
    pub fn replace_child(&mut self, name: &str, module: Module) -> Option<Module> {
        self.child_mut(name).map(|slot| std::mem::replace(slot, module))
    }

    fn required(&mut self, name: &str) -> Result<&mut Module> {
        let kind = self.kind.display_name();
        self.child_mut(name)
            .ok_or_else(|| Error::InvalidGraph(format!("{kind} container is missing child '{name}'")))
    }

    /// Run the container according to its kind.
    pub fn forward(&mut self, x: &Tensor, gemm: &GemmDispatcher) -> Result<Tensor> {
        match self.kind {
            ContainerKind::Sequential => {
                let mut h = x.clone();
                for (_, child) in &mut self.children {
                    h = child.forward(&h, gemm)?;
                }
                Ok(h)
            }
            ContainerKind::DecoderLayer => {
                let normed = self.required("input_layernorm")?.forward(x, gemm)?;
                let attn = self.required("self_attn")?.forward(&normed, gemm)?;
                let h = ops::add(x, &attn)?;
                let normed = self.required("post_attention_layernorm")?.forward(&h, gemm)?;
                let mlp = self.required("mlp")?.forward(&normed, gemm)?;
                ops::add(&h, &mlp)
            }
            ContainerKind::Attention {
                num_heads,
                num_kv_heads,
                rope_theta,
            } => {
                let q = self.required("q_proj")?.forward(x, gemm)?;
                let k = self.required("k_proj")?.forward(x, gemm)?;
                let v = self.required("v_proj")?.forward(x, gemm)?;
                let shape = AttentionShape {
                    num_heads,
                    num_kv_heads,
                    rope_theta,
                };
                let attn = causal_attention(&q, &k, &v, shape)?;
                self.required("o_proj")?.forward(&attn, gemm)
            }
            ContainerKind::GatedMlp => {
                let gate = self.required("gate_proj")?.forward(x, gemm)?;
                let gate = self.required("act_fn")?.forward(&gate, gemm)?;
                let up = self.required("up_proj")?.forward(x, gemm)?;
                let h = ops::mul(&gate, &up)?;
                self.required("down_proj")?.forward(&h, gemm)
            }
        }
    }
}
