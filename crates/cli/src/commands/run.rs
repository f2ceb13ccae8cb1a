//! `ensemble run` — Run a pool definition on an input.

use ensemble_pool::{RunResult, Termination};
use ensemble_providers::build_from_config;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::pool_file::{build_pool, PoolFile};
use super::setup;

pub async fn run(
    pool_path: &Path,
    input: &str,
    max_iterations: Option<usize>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = setup::load_config()?;
    let file = PoolFile::load(pool_path)?;
    let providers = build_from_config(&config);
    if !config.has_api_key() {
        info!("No API key configured; only keyless providers (e.g. ollama/...) will work");
    }

    let memory = if file.wants_memory() {
        Some(setup::open_memory(&config, &providers).await?)
    } else {
        None
    };
    let pool = build_pool(&file, &config, &providers, memory, max_iterations)?;

    // Ctrl-C stops the run between or during agent turns.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let result = pool.run_with_cancel(input, cancel).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result.summary())?);
    } else {
        print!("{}", render(&result));
    }

    match result.termination {
        Termination::Fatal(e) => Err(e.into()),
        _ => Ok(()),
    }
}

/// Human-readable run report.
pub fn render(result: &RunResult) -> String {
    let mut out = format!("🎭 Run {}\n\n", result.state.id());
    for turn in result.turns() {
        out.push_str(&format!("[{}] {} ← {}\n", turn.index, turn.agent_id, one_line(&turn.input)));
        for line in turn.output.lines() {
            out.push_str(&format!("    {line}\n"));
        }
        let tools = turn
            .signals
            .iter()
            .filter_map(|s| match s {
                ensemble_core::agent::Signal::ToolInvoked { tool, .. } => Some(tool.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>();
        if !tools.is_empty() {
            out.push_str(&format!("    (tools: {})\n", tools.join(", ")));
        }
        out.push('\n');
    }

    out.push_str(&format!(
        "Finished: {} after {} call(s)\n",
        result.termination, result.call_count
    ));
    for note in &result.annotations {
        out.push_str(&format!("⚠️  {note}\n"));
    }
    out
}

fn one_line(text: &str) -> String {
    const MAX: usize = 60;
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(MAX) {
        Some((end, _)) => format!("{}…", &flat[..end]),
        None => flat,
    }
}
