//! Task prompt assembly.

use crate::agents::AgentConfig;
use crate::memory::Memory;
use crate::plan::{Phase, Task};

pub const KNOWLEDGE_HEADING: &str = "## Relevant knowledge";

/// Build the prompt sent for one task. Empty sections are left out; with no
/// memories there is no knowledge section at all.
pub fn build_task_prompt(
    agent: &AgentConfig,
    phase: &Phase,
    task: &Task,
    memories: &[Memory],
) -> String {
    let mut prompt = format!(
        "# Role: {}\nYou are working on task {} of phase {} ({}).\n",
        task.role, task.id, phase.number, phase.name
    );
    if let Some(role) = agent.role(task.role) {
        prompt.push_str(&format!("{}\n", role.profile().description));
        for line in role.guidance() {
            prompt.push_str(&format!("- {}\n", line));
        }
    }

    prompt.push_str(&format!("\n## Task\n{}\n", task.description.trim()));
    if !task.complexity.is_empty() {
        prompt.push_str(&format!("Complexity: {}\n", task.complexity));
    }

    push_list(&mut prompt, "## Target files", &task.target_files);
    push_list(&mut prompt, "## Integration points", &task.integration_points);

    if let Some(context) = task.context.as_deref().filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("\n## Context\n{}\n", context.trim()));
    }

    push_list(
        &mut prompt,
        "## Acceptance criteria",
        &phase.acceptance_criteria,
    );

    if !memories.is_empty() {
        prompt.push_str(&format!("\n{}\n", KNOWLEDGE_HEADING));
        for memory in memories {
            prompt.push_str(&format!("- **{}**: {}", memory.subject, memory.fact));
            let sources: Vec<String> = memory
                .citations
                .iter()
                .map(|c| match c.line {
                    Some(line) => format!("{}:{}", c.file, line),
                    None => c.file.clone(),
                })
                .collect();
            if !sources.is_empty() {
                prompt.push_str(&format!(" ({})", sources.join(", ")));
            }
            prompt.push('\n');
        }
    }

    prompt
}

fn push_list(prompt: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    prompt.push_str(&format!("\n{}\n", heading));
    for item in items {
        prompt.push_str(&format!("- {}\n", item));
    }
}
