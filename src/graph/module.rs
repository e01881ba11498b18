//! The closed set of modules a graph node can hold.

use super::Container;
use crate::error::Result;
use crate::gemm::GemmDispatcher;
use crate::nn::{Activation, Embedding, Linear, RmsNorm};
use crate::quant::{CalibratingObserver, DynamicQuantLinear, StaticQuantLinear};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A node of a [`ModelGraph`](super::ModelGraph).
#[derive(Debug, Clone)]
pub enum Module {
    Container(Container),
    Embedding(Embedding),
    RmsNorm(RmsNorm),
    Activation(Activation),
    Linear(Linear),
    DynamicQuantLinear(DynamicQuantLinear),
    CalibratingObserver(CalibratingObserver),
    StaticQuantLinear(StaticQuantLinear),
}

/// Discriminant of [`Module`], for matching and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    Container,
    Embedding,
    RmsNorm,
    Activation,
    Linear,
    DynamicQuantLinear,
    CalibratingObserver,
    StaticQuantLinear,
}

impl ModuleKind {
    /// Get the display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            ModuleKind::Container => "Container",
            ModuleKind::Embedding => "Embedding",
            ModuleKind::RmsNorm => "RmsNorm",
            ModuleKind::Activation => "Activation",
            ModuleKind::Linear => "Linear",
            ModuleKind::DynamicQuantLinear => "FP8 Dynamic Linear",
            ModuleKind::CalibratingObserver => "FP8 Calibrating Observer",
            ModuleKind::StaticQuantLinear => "FP8 Static Linear",
        }
    }

    /// Affine layers in any precision.
    pub fn is_affine(&self) -> bool {
        matches!(
            self,
            ModuleKind::Linear
                | ModuleKind::DynamicQuantLinear
                | ModuleKind::CalibratingObserver
                | ModuleKind::StaticQuantLinear
        )
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl Module {
    /// Get the node kind.
    pub fn kind(&self) -> ModuleKind {
        match self {
            Module::Container(_) => ModuleKind::Container,
            Module::Embedding(_) => ModuleKind::Embedding,
            Module::RmsNorm(_) => ModuleKind::RmsNorm,
            Module::Activation(_) => ModuleKind::Activation,
            Module::Linear(_) => ModuleKind::Linear,
            Module::DynamicQuantLinear(_) => ModuleKind::DynamicQuantLinear,
            Module::CalibratingObserver(_) => ModuleKind::CalibratingObserver,
            Module::StaticQuantLinear(_) => ModuleKind::StaticQuantLinear,
        }
    }

    /// Check if this is an unquantized linear layer.
    pub fn is_linear(&self) -> bool {
        matches!(self, Module::Linear(_))
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Module::Container(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_container_mut(&mut self) -> Option<&mut Container> {
        match self {
            Module::Container(c) => Some(c),
            _ => None,
        }
    }

    /// Bytes held by this node's own affine weight (containers report 0).
    pub fn weight_bytes(&self) -> u64 {
        match self {
            Module::Linear(l) => l.weight().storage_bytes(),
            Module::DynamicQuantLinear(l) => l.weight().memory_bytes(),
            Module::CalibratingObserver(l) => l.weight().memory_bytes(),
            Module::StaticQuantLinear(l) => l.weight().memory_bytes(),
            _ => 0,
        }
    }

    /// Forward pass; observers update their running scale.
    pub fn forward(&mut self, x: &Tensor, gemm: &GemmDispatcher) -> Result<Tensor> {
        match self {
            Module::Container(c) => c.forward(x, gemm),
            Module::Embedding(e) => e.forward(x),
            Module::RmsNorm(n) => n.forward(x),
            Module::Activation(a) => Ok(a.apply(x)),
            Module::Linear(l) => l.forward(x),
            Module::DynamicQuantLinear(l) => l.forward(x, gemm),
            Module::CalibratingObserver(l) => l.forward(x, gemm),
            Module::StaticQuantLinear(l) => l.forward(x, gemm),
        }
    }
}

impl From<Container> for Module {
    fn from(c: Container) -> Self {
        Module::Container(c)
    }
}

impl From<Linear> for Module {
    fn from(l: Linear) -> Self {
        Module::Linear(l)
    }
}
