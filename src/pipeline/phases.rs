//! The three graph-rewriting phases.
//!
//! Each phase is one full traversal of the graph. The phases only swap
//! affine layers for their next state; the set of module paths never changes.

use super::metrics::LayerScale;
use crate::calibration::CalibrationSet;
use crate::error::{Error, Result};
use crate::gemm::GemmDispatcher;
use crate::graph::{ModelGraph, Module};
use crate::quant::{CalibratingObserver, DynamicQuantLinear, StaticQuantLinear};

/// Phase 1: replace every full-precision `Linear` with a `DynamicQuantLinear`.
///
/// Already-quantized layers are left alone, so a second call rewrites nothing.
pub fn quantize_weights(graph: &mut ModelGraph) -> Result<Vec<String>> {
    graph.replace_modules(
        |_, m| m.is_linear(),
        |path, m| match m {
            Module::Linear(linear) => Ok(Module::DynamicQuantLinear(DynamicQuantLinear::from_linear(
                linear,
            ))),
            other => Err(unexpected(path, "Linear", other)),
        },
    )
}

/// Phase 2a: wrap every `DynamicQuantLinear` in a `CalibratingObserver`.
pub fn insert_observers(graph: &mut ModelGraph) -> Result<Vec<String>> {
    graph.replace_modules(
        |_, m| matches!(m, Module::DynamicQuantLinear(_)),
        |path, m| match m {
            Module::DynamicQuantLinear(layer) => Ok(Module::CalibratingObserver(
                CalibratingObserver::from_dynamic(layer),
            )),
            other => Err(unexpected(path, "DynamicQuantLinear", other)),
        },
    )
}

/// Phase 2b: run every calibration row through the graph as a `[1, seq_len]`
/// batch, discarding the outputs. Returns the number of passes.
pub fn run_calibration(
    graph: &mut ModelGraph,
    set: &CalibrationSet,
    gemm: &GemmDispatcher,
) -> Result<usize> {
    if set.is_empty() {
        return Err(Error::EmptyCalibrationSet);
    }
    for index in 0..set.len() {
        let tokens = set.row_tensor(index)?;
        graph.forward(&tokens, gemm)?;
        tracing::debug!(pass = index + 1, total = set.len(), "calibration pass");
    }
    Ok(set.len())
}

/// Phase 3: freeze every observer into a `StaticQuantLinear`.
///
/// All observers are checked before the first rewrite; an observer that never
/// saw an activation fails the phase with the graph untouched.
pub fn freeze_activations(graph: &mut ModelGraph) -> Result<Vec<String>> {
    if let Some((path, _)) = graph.named_modules().into_iter().find(|(_, m)| {
        matches!(m, Module::CalibratingObserver(obs) if obs.observed_scale().is_none())
    }) {
        return Err(Error::UncalibratedScale { layer: path });
    }

    graph.replace_modules(
        |_, m| matches!(m, Module::CalibratingObserver(_)),
        |path, m| match m {
            Module::CalibratingObserver(obs) => Ok(Module::StaticQuantLinear(
                StaticQuantLinear::try_from_observer(path, obs)?,
            )),
            other => Err(unexpected(path, "CalibratingObserver", other)),
        },
    )
}

/// Sum of affine weight bytes across the graph.
pub fn affine_weight_bytes(graph: &ModelGraph) -> u64 {
    graph
        .named_modules()
        .into_iter()
        .filter(|(_, m)| m.kind().is_affine())
        .map(|(_, m)| m.weight_bytes())
        .sum()
}

/// Scales of every quantized layer, in pre-order.
pub fn layer_scales(graph: &ModelGraph) -> Vec<LayerScale> {
    graph
        .named_modules()
        .into_iter()
        .filter_map(|(name, m)| {
            let (weight_scale, act_scale) = match m {
                Module::DynamicQuantLinear(l) => (l.weight_scale(), None),
                Module::CalibratingObserver(l) => (l.weight_scale(), l.observed_scale()),
                Module::StaticQuantLinear(l) => (l.weight_scale(), Some(l.act_scale())),
                _ => return None,
            };
            Some(LayerScale {
                name,
                weight_scale,
                act_scale,
            })
        })
        .collect()
}

fn unexpected(path: &str, expected: &str, found: &Module) -> Error {
    Error::InvalidGraph(format!("'{path}': expected {expected}, found {}", found.kind()))
}
