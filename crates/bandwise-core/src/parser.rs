//! TOML prompt bank parser.
//!
//! Loads seed prompt banks from TOML files and directories, and validates them.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{default_difficulty, PromptDraft, Subtype, TaskType};

/// A parsed prompt bank file. Drafts are not validated until inserted.
#[derive(Debug, Clone)]
pub struct PromptBank {
    pub name: String,
    pub description: String,
    pub source: PathBuf,
    pub prompts: Vec<PromptDraft>,
}

/// Intermediate TOML structure for parsing prompt bank files.
#[derive(Debug, Deserialize)]
struct TomlBankFile {
    bank: TomlBankHeader,
    #[serde(default)]
    prompts: Vec<TomlPrompt>,
}

#[derive(Debug, Deserialize)]
struct TomlBankHeader {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TomlPrompt {
    task: String,
    #[serde(default)]
    subtype: Option<String>,
    text: String,
    #[serde(default = "default_difficulty")]
    difficulty: u8,
    #[serde(default)]
    topic_tags: Vec<String>,
    #[serde(default)]
    visual_description: Option<String>,
    #[serde(default)]
    visual_metadata: Option<serde_json::Value>,
}

/// Parse a single TOML file into a `PromptBank`.
pub fn parse_prompt_bank(path: &Path) -> Result<PromptBank> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read prompt bank file: {}", path.display()))?;

    parse_prompt_bank_str(&content, path)
}

/// Parse a TOML string into a `PromptBank`.
pub fn parse_prompt_bank_str(content: &str, source_path: &Path) -> Result<PromptBank> {
    let parsed: TomlBankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let prompts = parsed
        .prompts
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            let task: TaskType = p
                .task
                .parse()
                .map_err(|e: String| anyhow::anyhow!("prompt {}: {}", i + 1, e))?;
            let subtype = p
                .subtype
                .map(|s| {
                    s.parse::<Subtype>()
                        .map_err(|e| anyhow::anyhow!("prompt {}: {}", i + 1, e))
                })
                .transpose()?;

            Ok(PromptDraft {
                task,
                subtype,
                text: p.text,
                difficulty: p.difficulty,
                topic_tags: p.topic_tags.into_iter().collect::<BTreeSet<_>>(),
                visual_description: p.visual_description,
                visual_metadata: p.visual_metadata,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PromptBank {
        name: parsed.bank.name,
        description: parsed.bank.description,
        source: source_path.to_path_buf(),
        prompts,
    })
}

/// Recursively load all `.toml` prompt bank files from a directory.
pub fn load_prompt_bank_directory(dir: &Path) -> Result<Vec<PromptBank>> {
    let mut banks = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            banks.extend(load_prompt_bank_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_prompt_bank(&path) {
                Ok(bank) => banks.push(bank),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(banks)
}

/// A warning from prompt bank validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// 1-based position of the prompt in its file, if the warning is about one.
    pub prompt: Option<usize>,
    pub message: String,
}

fn normalized(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Check a bank for drafts the question bank would reject and for duplicates.
pub fn validate_prompt_bank(bank: &PromptBank) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if bank.prompts.is_empty() {
        warnings.push(ValidationWarning {
            prompt: None,
            message: "bank contains no prompts".into(),
        });
    }

    // Same text (ignoring case and spacing) means the same question
    let mut seen: HashMap<String, usize> = HashMap::new();
    for (i, draft) in bank.prompts.iter().enumerate() {
        let key = normalized(&draft.text);
        if key.is_empty() {
            continue;
        }
        if let Some(first) = seen.get(&key) {
            warnings.push(ValidationWarning {
                prompt: Some(i + 1),
                message: format!("duplicate of prompt {first}"),
            });
        } else {
            seen.insert(key, i + 1);
        }
    }

    for (i, draft) in bank.prompts.iter().enumerate() {
        if let Err(e) = draft.validate() {
            warnings.push(ValidationWarning {
                prompt: Some(i + 1),
                message: e.to_string(),
            });
        }
    }

    for (i, draft) in bank.prompts.iter().enumerate() {
        if draft.topic_tags.is_empty() {
            warnings.push(ValidationWarning {
                prompt: Some(i + 1),
                message: "no topic tags; the prompt will not match topic filters".into(),
            });
        }
    }

    warnings
}
