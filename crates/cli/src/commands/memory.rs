//! `ensemble memory` — Long-term memory management commands.

use ensemble_config::{AppConfig, MemoryBackendKind};
use ensemble_core::memory::MemoryRecord;
use ensemble_memory::{LongTermMemory, StoreOptions};
use ensemble_providers::build_from_config;
use std::sync::Arc;

use super::setup;

async fn open() -> Result<(AppConfig, Arc<LongTermMemory>), Box<dyn std::error::Error>> {
    let config = setup::load_config()?;
    if config.memory.backend == MemoryBackendKind::Memory {
        eprintln!("⚠️  memory.backend is \"memory\": nothing persists between commands.");
        eprintln!("   Set [memory] backend = \"file\" or \"sqlite\" in ~/.ensemble/config.toml.");
    }
    let providers = build_from_config(&config);
    let memory = setup::open_memory(&config, &providers).await?;
    Ok((config, memory))
}

pub async fn store(text: &str, meta: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let (_config, memory) = open().await?;
    let mut options = StoreOptions::default();
    for (key, value) in parse_meta(meta)? {
        options = options.with_metadata(key, value);
    }
    let id = memory.store_with(text, options).await?;
    println!("🧠 Stored {id}");
    Ok(())
}

pub async fn search(query: &str, limit: usize, min_score: Option<f32>) -> Result<(), Box<dyn std::error::Error>> {
    let (_config, memory) = open().await?;
    let records = match min_score {
        Some(min) => memory.retrieve_above(query, limit, min).await?,
        None => memory.retrieve(query, limit).await?,
    };

    println!("🔍 Searching memories for: \"{query}\"");
    println!();
    if records.is_empty() {
        println!("   No memories found.");
    }
    for (i, record) in records.iter().enumerate() {
        println!(
            "  {:>2}. [score: {:.2}] {}",
            i + 1,
            record.score.unwrap_or(0.0),
            record.text
        );
        println!("      id: {}", record.id);
    }
    Ok(())
}

pub async fn get(id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (_config, memory) = open().await?;
    let record = memory.get(id).await?;
    print!("{}", describe(&record));
    Ok(())
}

pub async fn delete(id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (_config, memory) = open().await?;
    if memory.delete(id).await? {
        println!("🗑️  Deleted {id}");
    } else {
        println!("   No memory with id {id}");
    }
    Ok(())
}

pub async fn count() -> Result<(), Box<dyn std::error::Error>> {
    let (config, memory) = open().await?;
    println!("🧠 {} memories ({} backend)", memory.count().await?, config.memory.backend);
    Ok(())
}

pub async fn clear(confirm: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !confirm {
        println!("⚠️  This will delete ALL memories permanently.");
        println!("   Run with --confirm to proceed:");
        println!("   ensemble memory clear --confirm");
        return Ok(());
    }
    let (_config, memory) = open().await?;
    let before = memory.count().await?;
    memory.clear().await?;
    println!("🗑️  Cleared {before} memories");
    Ok(())
}

/// Parse `key=value` pairs. Values that parse as JSON keep their type.
fn parse_meta(pairs: &[String]) -> Result<Vec<(String, serde_json::Value)>, String> {
    pairs
        .iter()
        .map(|pair| {
            let (key, raw) = pair
                .split_once('=')
                .ok_or_else(|| format!("metadata '{pair}' is not key=value"))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(format!("metadata '{pair}' has an empty key"));
            }
            let value = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
            Ok((key.to_string(), value))
        })
        .collect()
}

fn describe(record: &MemoryRecord) -> String {
    let mut out = format!(
        "id:       {}\ntext:     {}\nstored:   {}\ndims:     {}\n",
        record.id,
        record.text,
        record.created_at.to_rfc3339(),
        record.embedding.len()
    );
    if let Some(source) = &record.source {
        out.push_str(&format!(
            "source:   run {} turn {} ({})\n",
            source.run_id, source.index, source.agent_id
        ));
    }
    for (key, value) in &record.metadata {
        out.push_str(&format!("meta:     {key} = {value}\n"));
    }
    out
}
