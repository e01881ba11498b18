//! Inspect command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::InspectArgs;
use crate::model::CausalLm;

pub fn run_inspect(args: InspectArgs, level: LogLevel) -> Result<(), String> {
    let model = CausalLm::from_pretrained(&args.model).map_err(|e| e.to_string())?;
    let config = model.config();
    let graph = model.decoder();

    log(level, LogLevel::Normal, "Model Information:");
    log(
        level,
        LogLevel::Normal,
        &format!(
            "  Layers: {}  Hidden: {}  Heads: {}/{}  Vocab: {}",
            config.num_hidden_layers,
            config.hidden_size,
            config.num_attention_heads,
            config.num_kv_heads(),
            config.vocab_size
        ),
    );
    if let Some(q) = &config.quantization_config {
        log(
            level,
            LogLevel::Normal,
            &format!("  Quantization: {} ({})", q.quant_method, q.scheme),
        );
    }

    log(level, LogLevel::Normal, "Modules by kind:");
    for (kind, count) in graph.count_by_kind() {
        log(level, LogLevel::Normal, &format!("  {kind}: {count}"));
    }

    let detail = if args.all { LogLevel::Normal } else { LogLevel::Verbose };
    for (path, module) in graph.named_modules() {
        log(level, detail, &format!("    {path} [{}]", module.kind()));
    }
    Ok(())
}
