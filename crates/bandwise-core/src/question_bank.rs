//! The question catalog and AI-assisted question writing.
//!
//! `QuestionBank` is a request-scoped handle over an injected
//! [`PromptStore`]; it never holds prompts itself.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use crate::error::AssessmentError;
use crate::generation::{generate_once, GenerationSettings};
use crate::model::{default_difficulty, PromptDraft, Subtype, TaskType, WritingPrompt};
use crate::store::{Page, PromptFilter, PromptPage, PromptStore};
use crate::traits::TextGenerator;
use crate::validator::parse_payload;

/// Maximum number of existing prompts shown to the generator as examples.
pub const MAX_FEW_SHOT_EXAMPLES: usize = 10;
/// Maximum number of candidates requested in one call.
pub const MAX_CANDIDATES: usize = 10;

const QUESTION_WRITER_SYSTEM: &str = "You are an expert IELTS test writer. Generate original questions matching the style of the examples. Return ONLY valid JSON: an array of question objects. No markdown.";

/// Catalog operations plus candidate generation.
#[derive(Clone)]
pub struct QuestionBank {
    store: Arc<dyn PromptStore>,
    generator: Arc<dyn TextGenerator>,
    settings: GenerationSettings,
}

impl QuestionBank {
    pub fn new(
        store: Arc<dyn PromptStore>,
        generator: Arc<dyn TextGenerator>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            store,
            generator,
            settings,
        }
    }

    /// Filtered prompts, most recent first, with the total match count.
    pub async fn list(
        &self,
        filter: &PromptFilter,
        page: Page,
    ) -> Result<PromptPage, AssessmentError> {
        Ok(self.store.list_prompts(filter, page).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<WritingPrompt, AssessmentError> {
        Ok(self.store.get_prompt(id).await?)
    }

    /// Validate and store a draft.
    #[instrument(skip(self, draft), fields(task = %draft.task))]
    pub async fn insert(&self, draft: PromptDraft) -> Result<WritingPrompt, AssessmentError> {
        draft.validate()?;
        let stored = self.store.insert_prompt(draft.into_prompt()).await?;
        tracing::info!(id = %stored.id, "prompt added to the bank");
        Ok(stored)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AssessmentError> {
        self.store.delete_prompt(id).await?;
        tracing::info!(%id, "prompt removed from the bank");
        Ok(())
    }

    /// Ask the generator for new prompts in the style of existing ones.
    ///
    /// Nothing is persisted; accepted candidates go through [`Self::insert`].
    #[instrument(skip(self), fields(provider = self.generator.name()))]
    pub async fn generate_candidates(
        &self,
        task: TaskType,
        subtype: Option<Subtype>,
        count: usize,
    ) -> Result<Vec<PromptDraft>, AssessmentError> {
        if count == 0 || count > MAX_CANDIDATES {
            return Err(AssessmentError::Validation(format!(
                "candidate count must be between 1 and {MAX_CANDIDATES}, got {count}"
            )));
        }
        if let Some(subtype) = subtype {
            if subtype.task() != task {
                return Err(AssessmentError::Validation(format!(
                    "subtype {subtype} does not belong to {task}"
                )));
            }
        }

        let filter = PromptFilter {
            task: Some(task),
            subtype,
            ..Default::default()
        };
        let examples = self
            .store
            .list_prompts(&filter, Page::first(MAX_FEW_SHOT_EXAMPLES))
            .await?
            .items;

        let prompt = candidate_request(task, subtype, count, &examples);
        let response = generate_once(
            self.generator.as_ref(),
            &self.settings,
            QUESTION_WRITER_SYSTEM.to_string(),
            prompt,
            self.settings.candidate_max_tokens,
        )
        .await?;

        let mut candidates = parse_candidates(&response.content, task, subtype)?;
        candidates.truncate(count);
        for (i, candidate) in candidates.iter().enumerate() {
            if let Err(e) = candidate.validate() {
                tracing::warn!(index = i, "candidate would be rejected on insert: {e}");
            }
        }
        tracing::info!(
            examples = examples.len(),
            candidates = candidates.len(),
            "generated candidate questions"
        );
        Ok(candidates)
    }
}

/// Example shape shown to the generator (and expected back).
#[derive(Serialize)]
struct Example<'a> {
    task: TaskType,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtype: Option<Subtype>,
    prompt_text: &'a str,
    difficulty: u8,
    topic_tags: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    visual_description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a Value>,
}

fn candidate_request(
    task: TaskType,
    subtype: Option<Subtype>,
    count: usize,
    examples: &[WritingPrompt],
) -> String {
    let examples: Vec<Example<'_>> = examples
        .iter()
        .map(|p| Example {
            task: p.task,
            subtype: p.subtype,
            prompt_text: &p.text,
            difficulty: p.difficulty,
            topic_tags: p.topic_tags.iter().map(String::as_str).collect(),
            visual_description: p.visual_description.as_deref(),
            metadata: p.visual_metadata.as_ref(),
        })
        .collect();
    let examples_json =
        serde_json::to_string_pretty(&examples).unwrap_or_else(|_| "[]".to_string());

    let kind = subtype
        .map(|s| format!(" of type {s}"))
        .unwrap_or_default();
    let visual_rule = match task {
        TaskType::Task1 => "Every task1 question MUST include a non-empty \"visual_description\" describing the chart, table, process or map, with concrete figures where relevant.",
        TaskType::Task2 => "Every task2 question MUST include a \"subtype\" and MUST NOT include a \"visual_description\".",
    };

    format!(
        "Examples:\n{examples_json}\n\n\
Generate {count} new original IELTS Academic {task} questions{kind}.\n\
Use the same fields as the examples: task, subtype, prompt_text, difficulty (1-3), topic_tags, visual_description, metadata.\n\
{visual_rule}\n\
Return a JSON array of {count} question objects."
    )
}

#[derive(Deserialize)]
struct RawCandidate {
    #[serde(default)]
    task: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    task1_type: Option<String>,
    #[serde(default)]
    task2_question_type: Option<String>,
    #[serde(alias = "text")]
    prompt_text: String,
    #[serde(default)]
    difficulty: Option<u8>,
    #[serde(default)]
    topic_tags: Vec<String>,
    #[serde(default)]
    visual_description: Option<String>,
    #[serde(default, alias = "visual_metadata")]
    metadata: Option<Value>,
}

/// Parse a candidate payload: a JSON array, or an object wrapping one under
/// `questions`. Missing task or subtype fields inherit the hints.
pub fn parse_candidates(
    raw: &str,
    task_hint: TaskType,
    subtype_hint: Option<Subtype>,
) -> Result<Vec<PromptDraft>, AssessmentError> {
    let value = parse_payload(raw).map_err(|e| AssessmentError::Generation(e.to_string()))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("questions") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(AssessmentError::Generation(
                    "expected a JSON array of candidate objects".into(),
                ))
            }
        },
        _ => {
            return Err(AssessmentError::Generation(
                "expected a JSON array of candidate objects".into(),
            ))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let raw: RawCandidate = serde_json::from_value(item)
                .map_err(|e| AssessmentError::Generation(format!("candidate {i}: {e}")))?;
            into_draft(raw, task_hint, subtype_hint)
                .map_err(|e| AssessmentError::Generation(format!("candidate {i}: {e}")))
        })
        .collect()
}

fn into_draft(
    raw: RawCandidate,
    task_hint: TaskType,
    subtype_hint: Option<Subtype>,
) -> Result<PromptDraft, String> {
    let task = match raw.task.as_deref() {
        Some(t) => t.parse::<TaskType>()?,
        None => task_hint,
    };

    let subtype = match raw
        .subtype
        .as_deref()
        .or(raw.task1_type.as_deref())
        .or(raw.task2_question_type.as_deref())
        .filter(|s| !s.trim().is_empty())
    {
        Some(s) => Some(s.parse::<Subtype>()?),
        None => subtype_hint.filter(|s| s.task() == task),
    };

    Ok(PromptDraft {
        task,
        subtype,
        text: raw.prompt_text,
        difficulty: raw.difficulty.unwrap_or_else(default_difficulty),
        topic_tags: raw.topic_tags.into_iter().collect(),
        visual_description: raw.visual_description,
        visual_metadata: raw.metadata.filter(|m| !m.is_null()),
    })
}
