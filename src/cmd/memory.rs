//! Memory commands: `anvil memory ...`.

use anyhow::{Context, Result, anyhow, bail};
use console::style;
use std::path::Path;

use anvil::config::Config;
use anvil::memory::{
    CitationInput, CreatedBy, Memory, MemoryStatus, MemoryStore, Provenance, ValidationResult,
};

use super::super::MemoryCommands;

fn open_store(config: &Config) -> Result<MemoryStore> {
    let path = config
        .memory_store
        .as_ref()
        .ok_or_else(|| anyhow!("No memory store path: set [memory].store_path in anvil.toml"))?;
    config.ensure_directories()?;
    Ok(MemoryStore::open(path)
        .context("Failed to open memory store")?
        .with_ttl_days(config.ttl_days()))
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "cli".to_string())
}

pub async fn cmd_memory(project_dir: &Path, command: MemoryCommands, verbose: bool) -> Result<()> {
    let config = Config::new(project_dir.to_path_buf(), verbose)?;
    let store = open_store(&config)?;
    let owner = config.repo_owner.as_str();
    let name = config.repo_name.as_str();

    match command {
        MemoryCommands::Add {
            subject,
            fact,
            reason,
            citations,
            snippet,
        } => {
            let mut inputs: Vec<CitationInput> =
                citations.iter().map(|c| CitationInput::parse(c)).collect();
            if let Some(snippet) = snippet {
                match inputs.first_mut() {
                    Some(first) => first.snippet = Some(snippet),
                    None => bail!("--snippet needs at least one --cite"),
                }
            }
            let provenance = Provenance {
                owner: owner.to_string(),
                name: name.to_string(),
                repository_path: config.project_dir.clone(),
                created_by: CreatedBy::User {
                    name: current_user(),
                },
            };
            let memory = store.store(&fact, inputs, &subject, &reason, provenance)?;
            println!("{} Stored memory {}", style("✓").green(), style(&memory.id).bold());
        }
        MemoryCommands::Search { query, limit } => {
            let limit = limit.unwrap_or_else(|| config.search_limit());
            let results = store.search(&config.project_dir, &query, limit)?;
            if results.is_empty() {
                println!("No memories match '{}'", query);
            }
            for memory in &results {
                print_line(&store, memory);
            }
        }
        MemoryCommands::List { json } => {
            let memories = store.list(Some(owner), Some(name))?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&memories)
                        .context("Failed to serialize memories")?
                );
            } else if memories.is_empty() {
                println!("No memories recorded for {}/{}", owner, name);
            } else {
                for memory in &memories {
                    print_line(&store, memory);
                }
            }
        }
        MemoryCommands::Show { id } => {
            let memory = store.get(&id)?;
            print_memory(&store, &memory);
        }
        MemoryCommands::Validate { id } => {
            let results = match id {
                Some(id) => vec![store.validate(&id).await?],
                None => store.validate_all(Some(owner), Some(name)).await?,
            };
            if results.is_empty() {
                println!("No memories to validate");
            }
            for result in &results {
                print_validation(result);
            }
        }
        MemoryCommands::Refresh { id } => {
            if !store.refresh(&id)? {
                bail!("Memory {} not found", id);
            }
            let memory = store.get(&id)?;
            println!(
                "Refreshed {}; expires {}",
                id,
                store.expires_at(&memory).format("%Y-%m-%d")
            );
        }
        MemoryCommands::Prune => {
            let removed = store.prune_expired(Some(owner), Some(name))?;
            println!("Pruned {} expired memor{}", removed, if removed == 1 { "y" } else { "ies" });
        }
        MemoryCommands::Stats => {
            let stats = store.statistics(owner, name)?;
            println!("Memories for {}/{}", owner, name);
            println!("  total:    {}", stats.total);
            println!("  active:   {}", stats.active);
            println!("  stale:    {}", stats.stale);
            println!("  invalid:  {}", stats.invalid);
            println!("  expired:  {}", stats.expired);
            println!("  uses:     {}", stats.total_use_count);
            if let Some(subject) = &stats.most_used_subject {
                println!("  most used subject: {}", subject);
            }
            if let Some(file) = &stats.most_cited_file {
                println!("  most cited file:   {}", file);
            }
        }
        MemoryCommands::Delete { id } => {
            if store.delete(&id)? {
                println!("Deleted memory {}", id);
            } else {
                bail!("Memory {} not found", id);
            }
        }
        MemoryCommands::Supersede { old_id, new_id } => {
            store.supersede(&old_id, &new_id)?;
            println!("Memory {} superseded by {}", old_id, new_id);
        }
    }
    Ok(())
}

fn status_style(status: MemoryStatus) -> console::StyledObject<&'static str> {
    match status {
        MemoryStatus::Active => style(status.as_str()).green(),
        MemoryStatus::Stale => style(status.as_str()).yellow(),
        MemoryStatus::Invalid => style(status.as_str()).red(),
        MemoryStatus::Superseded | MemoryStatus::Archived => style(status.as_str()).dim(),
    }
}

fn print_line(store: &MemoryStore, memory: &Memory) {
    let expired = if store.is_expired(memory) {
        format!(" {}", style("expired").red())
    } else {
        String::new()
    };
    println!(
        "{}  [{}]{} {}: {}",
        style(&memory.id).dim(),
        status_style(memory.status),
        expired,
        style(&memory.subject).bold(),
        memory.fact
    );
}

fn print_memory(store: &MemoryStore, memory: &Memory) {
    println!("{} {}", style("Memory").bold(), memory.id);
    println!("  subject:  {}", memory.subject);
    println!("  fact:     {}", memory.fact);
    if !memory.reason.is_empty() {
        println!("  reason:   {}", memory.reason);
    }
    println!("  status:   {}", status_style(memory.status));
    println!("  scope:    {}/{}", memory.owner, memory.name);
    println!("  created:  {}", memory.created_at.format("%Y-%m-%d %H:%M"));
    if let Some(at) = memory.last_validated_at {
        println!("  validated: {}", at.format("%Y-%m-%d %H:%M"));
    }
    println!("  expires:  {}", store.expires_at(memory).format("%Y-%m-%d"));
    println!("  uses:     {}", memory.use_count);
    if let Some(by) = &memory.superseded_by {
        println!("  superseded by: {}", by);
    }
    for citation in &memory.citations {
        let location = match citation.line {
            Some(line) => format!("{}:{}", citation.file, line),
            None => citation.file.clone(),
        };
        let mark = if citation.is_valid { style("✓").green() } else { style("✗").red() };
        println!("  {} {}", mark, location);
    }
}

fn print_validation(result: &ValidationResult) {
    println!(
        "{}  confidence {:.2}  {} → {}",
        style(&result.memory_id).bold(),
        result.confidence,
        status_style(result.status),
        result.recommended_action
    );
    for check in &result.checks {
        if let Some(issue) = &check.issue {
            let location = match check.line {
                Some(line) => format!("{}:{}", check.file, line),
                None => check.file.clone(),
            };
            println!("    {} {}", location, style(issue).dim());
        }
    }
    for warning in &result.warnings {
        println!("    {} {}", style("warning:").yellow(), warning);
    }
}
