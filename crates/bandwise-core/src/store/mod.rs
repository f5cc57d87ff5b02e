//! Persistence seams for prompts, submissions and profiles.
//!
//! The core never touches a database directly. Components receive these
//! traits as injected handles; [`MemoryStore`] and [`JsonStore`] are the two
//! bundled backends.

mod json;
mod memory;

pub use json::JsonStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{NewSubmission, Profile, Submission, Subtype, TaskType, WritingPrompt};

/// Equality predicates for prompt listing. `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptFilter {
    pub task: Option<TaskType>,
    pub subtype: Option<Subtype>,
    pub difficulty: Option<u8>,
    /// A topic tag the prompt must carry (case-insensitive).
    pub topic: Option<String>,
}

impl PromptFilter {
    pub fn matches(&self, prompt: &WritingPrompt) -> bool {
        self.task.map_or(true, |t| prompt.task == t)
            && self.subtype.map_or(true, |s| prompt.subtype == Some(s))
            && self.difficulty.map_or(true, |d| prompt.difficulty == d)
            && self.topic.as_deref().map_or(true, |topic| {
                let topic = topic.trim().to_lowercase();
                prompt.topic_tags.iter().any(|t| t.to_lowercase() == topic)
            })
    }
}

/// Offset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub const DEFAULT_LIMIT: usize = 20;

    pub fn first(limit: usize) -> Self {
        Self { limit, offset: 0 }
    }

    /// One-based page number, as the admin screen counts them.
    pub fn number(page: usize, limit: usize) -> Self {
        Self {
            limit,
            offset: page.saturating_sub(1).saturating_mul(limit),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first(Self::DEFAULT_LIMIT)
    }
}

/// One page of prompts plus the size of the whole filtered set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptPage {
    pub items: Vec<WritingPrompt>,
    pub total: usize,
}

/// Ordering for ledger reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ListOrder {
    #[default]
    MostRecentFirst,
    OldestFirst,
}

/// The question catalog.
#[async_trait]
pub trait PromptStore: Send + Sync {
    /// Filtered prompts, newest first.
    async fn list_prompts(&self, filter: &PromptFilter, page: Page) -> Result<PromptPage, StoreError>;

    async fn get_prompt(&self, id: Uuid) -> Result<WritingPrompt, StoreError>;

    async fn insert_prompt(&self, prompt: WritingPrompt) -> Result<WritingPrompt, StoreError>;

    async fn delete_prompt(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Append-only submission history. No update or delete.
#[async_trait]
pub trait SubmissionLedger: Send + Sync {
    /// Store a new submission, assigning its id and timestamp.
    async fn append(&self, submission: NewSubmission) -> Result<Submission, StoreError>;

    async fn list_submissions(
        &self,
        student_id: &str,
        limit: usize,
        order: ListOrder,
    ) -> Result<Vec<Submission>, StoreError>;
}

/// Student and staff profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, id: &str) -> Result<Profile, StoreError>;

    /// Create or replace a profile. Rejects a target band below the current band.
    async fn upsert_profile(&self, profile: Profile) -> Result<Profile, StoreError>;
}

/// Newest first, ties broken by later insertion first.
pub(crate) fn page_prompts<'a>(
    prompts: impl DoubleEndedIterator<Item = &'a WritingPrompt>,
    filter: &PromptFilter,
    page: Page,
) -> PromptPage {
    let mut matching: Vec<&WritingPrompt> = prompts.rev().filter(|p| filter.matches(p)).collect();
    matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let total = matching.len();
    let items = matching
        .into_iter()
        .skip(page.offset)
        .take(page.limit)
        .cloned()
        .collect();
    PromptPage { items, total }
}

/// Select one student's submissions from an insertion-ordered log.
pub(crate) fn select_submissions<'a>(
    log: impl DoubleEndedIterator<Item = &'a Submission>,
    student_id: &str,
    limit: usize,
    order: ListOrder,
) -> Vec<Submission> {
    let own = |s: &&Submission| s.student_id == student_id;
    match order {
        ListOrder::MostRecentFirst => log.rev().filter(own).take(limit).cloned().collect(),
        ListOrder::OldestFirst => log.filter(own).take(limit).cloned().collect(),
    }
}

pub(crate) fn check_profile(profile: &Profile) -> Result<(), StoreError> {
    profile
        .validate()
        .map_err(|e| StoreError::InvalidRecord(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers_are_one_based() {
        assert_eq!(Page::number(1, 20), Page::first(20));
        assert_eq!(Page::number(0, 20).offset, 0);
        assert_eq!(Page::number(3, 20).offset, 40);
    }

    #[test]
    fn huge_page_numbers_clamp_instead_of_overflowing() {
        let page = Page::number(usize::MAX, usize::MAX);
        assert_eq!(page.offset, usize::MAX);
        assert_eq!(page.limit, usize::MAX);
        assert_eq!(Page::number(usize::MAX / 2, 4).offset, usize::MAX);
    }
}
