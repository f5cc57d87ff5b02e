//! The `bandwise questions` commands.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use uuid::Uuid;

use bandwise_core::model::{PromptDraft, WritingPrompt};
use bandwise_core::parser;
use bandwise_core::store::{Page, PromptFilter};

use super::{parse_subtype, parse_task, GlobalOptions};

pub async fn list(
    global: &GlobalOptions,
    task: Option<String>,
    subtype: Option<String>,
    difficulty: Option<u8>,
    topic: Option<String>,
    page: usize,
    limit: usize,
) -> Result<()> {
    anyhow::ensure!(page >= 1, "page numbers start at 1");
    anyhow::ensure!(limit >= 1, "limit must be at least 1");

    let filter = PromptFilter {
        task: task.as_deref().map(parse_task).transpose()?,
        subtype: parse_subtype(subtype.as_deref())?,
        difficulty,
        topic,
    };

    let service = global.service().await?;
    let result = service
        .list_prompts(&filter, Page::number(page, limit))
        .await?;

    if result.items.is_empty() {
        println!("No prompts found ({} in total).", result.total);
        return Ok(());
    }

    print_prompts(&result.items);
    let pages = result.total.div_ceil(limit);
    println!("Page {page} of {pages} ({} prompts)", result.total);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn add(
    global: &GlobalOptions,
    actor: String,
    task: String,
    subtype: Option<String>,
    text: String,
    difficulty: u8,
    tags: Option<String>,
    visual: Option<String>,
) -> Result<()> {
    let draft = PromptDraft {
        task: parse_task(&task)?,
        subtype: parse_subtype(subtype.as_deref())?,
        text,
        difficulty,
        topic_tags: split_tags(tags.as_deref()),
        visual_description: visual,
        visual_metadata: None,
    };

    let service = global.service().await?;
    let prompt = service.add_prompt(&actor, draft).await?;
    println!("Added prompt {}", prompt.id);
    Ok(())
}

/// Insert every valid draft of a bank; invalid drafts are reported and skipped.
pub async fn import(global: &GlobalOptions, actor: String, bank_path: PathBuf) -> Result<()> {
    let banks = if bank_path.is_dir() {
        parser::load_prompt_bank_directory(&bank_path)?
    } else {
        vec![parser::parse_prompt_bank(&bank_path)?]
    };

    let service = global.service().await?;
    let mut imported = 0;
    let mut skipped = 0;

    for bank in banks {
        println!("Bank: {} ({} prompts)", bank.name, bank.prompts.len());
        for (i, draft) in bank.prompts.into_iter().enumerate() {
            if let Err(e) = draft.validate() {
                println!("  [#{}] skipped: {e}", i + 1);
                skipped += 1;
                continue;
            }
            service.add_prompt(&actor, draft).await.with_context(|| {
                format!("failed to import prompt {} of {}", i + 1, bank.source.display())
            })?;
            imported += 1;
        }
    }

    println!("Imported {imported} prompt(s), skipped {skipped}.");
    Ok(())
}

pub async fn generate(
    global: &GlobalOptions,
    actor: String,
    task: String,
    subtype: Option<String>,
    count: usize,
    save: bool,
) -> Result<()> {
    let task = parse_task(&task)?;
    let subtype = parse_subtype(subtype.as_deref())?;

    let service = global.service().await?;
    let candidates = service
        .generate_candidate_questions(&actor, task, subtype, count)
        .await?;

    for (i, candidate) in candidates.iter().enumerate() {
        let kind = candidate
            .subtype
            .map(|s| s.label().to_string())
            .unwrap_or_else(|| "unspecified".to_string());
        println!("Candidate {} ({}, {kind}, difficulty {})", i + 1, candidate.task, candidate.difficulty);
        println!("{}", candidate.text.trim());
        if let Some(visual) = &candidate.visual_description {
            println!("Visual: {}", visual.trim());
        }
        if let Err(e) = candidate.validate() {
            println!("WARNING: {e}");
        }
        println!();
    }

    if save {
        let mut saved = 0;
        for candidate in candidates {
            if candidate.validate().is_err() {
                continue;
            }
            let prompt = service.add_prompt(&actor, candidate).await?;
            println!("Saved prompt {}", prompt.id);
            saved += 1;
        }
        println!("Saved {saved} candidate(s).");
    }

    Ok(())
}

pub async fn delete(global: &GlobalOptions, actor: String, id: String) -> Result<()> {
    let id = Uuid::parse_str(id.trim()).with_context(|| format!("invalid prompt id: {id}"))?;

    let service = global.service().await?;
    service.remove_prompt(&actor, id).await?;
    println!("Deleted prompt {id}");
    Ok(())
}

fn split_tags(tags: Option<&str>) -> BTreeSet<String> {
    tags.map(|t| {
        t.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn print_prompts(prompts: &[WritingPrompt]) {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Task", "Subtype", "Difficulty", "Topics", "Question"]);

    for prompt in prompts {
        table.add_row(vec![
            Cell::new(prompt.id),
            Cell::new(prompt.task),
            Cell::new(prompt.subtype.map(|s| s.to_string()).unwrap_or_default()),
            Cell::new(prompt.difficulty),
            Cell::new(
                prompt
                    .topic_tags
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            Cell::new(excerpt(&prompt.text, 60)),
        ]);
    }

    println!("{table}");
}

/// First line of `text`, cut to `max` characters.
fn excerpt(text: &str, max: usize) -> String {
    let line = text.trim().lines().next().unwrap_or_default();
    if line.chars().count() <= max {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max).collect();
        format!("{cut}...")
    }
}
