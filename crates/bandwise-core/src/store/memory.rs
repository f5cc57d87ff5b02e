//! In-process store, used by tests and embedding callers.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    check_profile, page_prompts, select_submissions, ListOrder, Page, ProfileStore, PromptFilter,
    PromptPage, PromptStore, SubmissionLedger,
};
use crate::error::StoreError;
use crate::model::{NewSubmission, Profile, Submission, WritingPrompt};

/// Keeps prompts, submissions and profiles in memory.
#[derive(Default)]
pub struct MemoryStore {
    prompts: RwLock<Vec<WritingPrompt>>,
    submissions: RwLock<Vec<Submission>>,
    profiles: RwLock<HashMap<String, Profile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ledger entries across all students.
    pub async fn submission_count(&self) -> usize {
        self.submissions.read().await.len()
    }
}

#[async_trait]
impl PromptStore for MemoryStore {
    async fn list_prompts(&self, filter: &PromptFilter, page: Page) -> Result<PromptPage, StoreError> {
        let prompts = self.prompts.read().await;
        Ok(page_prompts(prompts.iter(), filter, page))
    }

    async fn get_prompt(&self, id: Uuid) -> Result<WritingPrompt, StoreError> {
        self.prompts
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "prompt",
                id: id.to_string(),
            })
    }

    async fn insert_prompt(&self, prompt: WritingPrompt) -> Result<WritingPrompt, StoreError> {
        let mut prompts = self.prompts.write().await;
        if prompts.iter().any(|p| p.id == prompt.id) {
            return Err(StoreError::Conflict {
                kind: "prompt",
                id: prompt.id.to_string(),
            });
        }
        prompts.push(prompt.clone());
        Ok(prompt)
    }

    async fn delete_prompt(&self, id: Uuid) -> Result<(), StoreError> {
        let mut prompts = self.prompts.write().await;
        let before = prompts.len();
        prompts.retain(|p| p.id != id);
        if prompts.len() == before {
            return Err(StoreError::NotFound {
                kind: "prompt",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SubmissionLedger for MemoryStore {
    async fn append(&self, submission: NewSubmission) -> Result<Submission, StoreError> {
        let stored = submission.into_submission();
        self.submissions.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn list_submissions(
        &self,
        student_id: &str,
        limit: usize,
        order: ListOrder,
    ) -> Result<Vec<Submission>, StoreError> {
        let log = self.submissions.read().await;
        Ok(select_submissions(log.iter(), student_id, limit, order))
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profile(&self, id: &str) -> Result<Profile, StoreError> {
        self.profiles
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "profile",
                id: id.to_string(),
            })
    }

    async fn upsert_profile(&self, profile: Profile) -> Result<Profile, StoreError> {
        check_profile(&profile)?;
        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile.clone());
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{Duration, Utc};

    use super::*;
    use crate::model::{Band, CriteriaBands, Role, Subtype, TaskType};

    fn prompt(task: TaskType, subtype: Subtype, age_minutes: i64, tags: &[&str]) -> WritingPrompt {
        WritingPrompt {
            id: Uuid::new_v4(),
            task,
            subtype: Some(subtype),
            text: format!("{subtype} prompt"),
            difficulty: 2,
            topic_tags: tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
            visual_description: (task == TaskType::Task1).then(|| "a chart".to_string()),
            visual_metadata: None,
            created_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    fn new_submission(student: &str, task: TaskType, overall: f64) -> NewSubmission {
        let b = Band::from_f64(overall).unwrap();
        NewSubmission {
            student_id: student.into(),
            prompt_id: None,
            task_type: task,
            essay_text: "essay".into(),
            word_count: 1,
            overall_band: b,
            criteria: CriteriaBands {
                task: b,
                coherence: b,
                lexical: b,
                grammar: b,
            },
            raw_assessment: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn list_is_newest_first_with_total() {
        let store = MemoryStore::new();
        let old = prompt(TaskType::Task2, Subtype::ProblemSolution, 30, &[]);
        let new = prompt(TaskType::Task2, Subtype::AgreeDisagree, 1, &[]);
        let mid = prompt(TaskType::Task1, Subtype::Map, 10, &[]);
        for p in [old.clone(), new.clone(), mid.clone()] {
            store.insert_prompt(p).await.unwrap();
        }

        let page = store
            .list_prompts(&PromptFilter::default(), Page::first(2))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, new.id);
        assert_eq!(page.items[1].id, mid.id);

        let rest = store
            .list_prompts(&PromptFilter::default(), Page::number(2, 2))
            .await
            .unwrap();
        assert_eq!(rest.items.len(), 1);
        assert_eq!(rest.items[0].id, old.id);
    }

    #[tokio::test]
    async fn list_applies_every_filter() {
        let store = MemoryStore::new();
        store
            .insert_prompt(prompt(TaskType::Task2, Subtype::AgreeDisagree, 3, &["Education"]))
            .await
            .unwrap();
        store
            .insert_prompt(prompt(TaskType::Task2, Subtype::ProblemSolution, 2, &["environment"]))
            .await
            .unwrap();
        store
            .insert_prompt(prompt(TaskType::Task1, Subtype::Table, 1, &["education"]))
            .await
            .unwrap();

        let filter = PromptFilter {
            topic: Some("education".into()),
            ..Default::default()
        };
        assert_eq!(store.list_prompts(&filter, Page::default()).await.unwrap().total, 2);

        let filter = PromptFilter {
            task: Some(TaskType::Task2),
            subtype: Some(Subtype::ProblemSolution),
            difficulty: Some(2),
            topic: None,
        };
        assert_eq!(store.list_prompts(&filter, Page::default()).await.unwrap().total, 1);

        let filter = PromptFilter {
            difficulty: Some(3),
            ..Default::default()
        };
        assert_eq!(store.list_prompts(&filter, Page::default()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn delete_and_missing_ids() {
        let store = MemoryStore::new();
        let p = store
            .insert_prompt(prompt(TaskType::Task1, Subtype::Process, 0, &[]))
            .await
            .unwrap();
        assert!(matches!(
            store.insert_prompt(p.clone()).await,
            Err(StoreError::Conflict { .. })
        ));
        store.delete_prompt(p.id).await.unwrap();
        assert!(matches!(store.get_prompt(p.id).await, Err(StoreError::NotFound { .. })));
        assert!(matches!(store.delete_prompt(p.id).await, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn ledger_lists_per_student_in_order() {
        let store = MemoryStore::new();
        store.append(new_submission("a", TaskType::Task2, 5.0)).await.unwrap();
        store.append(new_submission("b", TaskType::Task2, 8.0)).await.unwrap();
        store.append(new_submission("a", TaskType::Task1, 6.0)).await.unwrap();
        store.append(new_submission("a", TaskType::Task2, 7.0)).await.unwrap();

        let recent = store.list_submissions("a", 2, ListOrder::MostRecentFirst)
            .await
            .unwrap();
        let bands: Vec<f64> = recent.iter().map(|s| s.overall_band.value()).collect();
        assert_eq!(bands, vec![7.0, 6.0]);

        let oldest = store.list_submissions("a", 10, ListOrder::OldestFirst)
            .await
            .unwrap();
        assert_eq!(oldest.len(), 3);
        assert_eq!(oldest[0].overall_band.value(), 5.0);
        assert_eq!(store.submission_count().await, 4);
    }

    #[tokio::test]
    async fn profile_upsert_enforces_band_order() {
        let store = MemoryStore::new();
        let mut profile = Profile::new(
            "s1",
            "Sam",
            Band::from_f64(6.0).unwrap(),
            Band::from_f64(7.0).unwrap(),
            Role::Student,
        )
        .unwrap();
        store.upsert_profile(profile.clone()).await.unwrap();
        assert_eq!(store.get_profile("s1").await.unwrap(), profile);

        profile.target_band = Band::from_f64(5.0).unwrap();
        assert!(matches!(
            store.upsert_profile(profile).await,
            Err(StoreError::InvalidRecord(_))
        ));
        assert!(matches!(
            store.get_profile("nobody").await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
