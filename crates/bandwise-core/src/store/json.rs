//! File-backed store rooted at a data directory.
//!
//! Layout:
//! - `prompts.json`: the prompt catalog as a JSON array
//! - `profiles.json`: profiles as a JSON array
//! - `submissions.jsonl`: the ledger, one submission per line, append-only

use std::io::SeekFrom;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    check_profile, page_prompts, select_submissions, ListOrder, Page, ProfileStore, PromptFilter,
    PromptPage, PromptStore, SubmissionLedger,
};
use crate::error::StoreError;
use crate::model::{NewSubmission, Profile, Submission, WritingPrompt};

const PROMPTS_FILE: &str = "prompts.json";
const PROFILES_FILE: &str = "profiles.json";
const SUBMISSIONS_FILE: &str = "submissions.jsonl";

/// Stores everything as JSON documents in one directory.
pub struct JsonStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonStore {
    /// Open (and create if needed) a data directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    async fn read_array<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, StoreError> {
        match tokio::fs::read_to_string(self.path(file)).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a sibling temp file, then rename over the target.
    async fn write_array<T: Serialize>(&self, file: &str, items: &[T]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(items)?;
        let target = self.path(file);
        let tmp = target.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &target).await?;
        Ok(())
    }

    async fn read_ledger(&self) -> Result<Vec<Submission>, StoreError> {
        let content = match tokio::fs::read_to_string(self.path(SUBMISSIONS_FILE)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut submissions = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Submission>(line) {
                Ok(s) => submissions.push(s),
                Err(e) => {
                    // A torn final line from an interrupted append is skipped, not fatal.
                    tracing::warn!(line = i + 1, "skipping unreadable ledger entry: {e}");
                }
            }
        }
        Ok(submissions)
    }
}

#[async_trait]
impl PromptStore for JsonStore {
    async fn list_prompts(&self, filter: &PromptFilter, page: Page) -> Result<PromptPage, StoreError> {
        let prompts: Vec<WritingPrompt> = self.read_array(PROMPTS_FILE).await?;
        Ok(page_prompts(prompts.iter(), filter, page))
    }

    async fn get_prompt(&self, id: Uuid) -> Result<WritingPrompt, StoreError> {
        let prompts: Vec<WritingPrompt> = self.read_array(PROMPTS_FILE).await?;
        prompts
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "prompt",
                id: id.to_string(),
            })
    }

    async fn insert_prompt(&self, prompt: WritingPrompt) -> Result<WritingPrompt, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut prompts: Vec<WritingPrompt> = self.read_array(PROMPTS_FILE).await?;
        if prompts.iter().any(|p| p.id == prompt.id) {
            return Err(StoreError::Conflict {
                kind: "prompt",
                id: prompt.id.to_string(),
            });
        }
        prompts.push(prompt.clone());
        self.write_array(PROMPTS_FILE, &prompts).await?;
        Ok(prompt)
    }

    async fn delete_prompt(&self, id: Uuid) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut prompts: Vec<WritingPrompt> = self.read_array(PROMPTS_FILE).await?;
        let before = prompts.len();
        prompts.retain(|p| p.id != id);
        if prompts.len() == before {
            return Err(StoreError::NotFound {
                kind: "prompt",
                id: id.to_string(),
            });
        }
        self.write_array(PROMPTS_FILE, &prompts).await
    }
}

#[async_trait]
impl SubmissionLedger for JsonStore {
    async fn append(&self, submission: NewSubmission) -> Result<Submission, StoreError> {
        let stored = submission.into_submission();
        let mut line = serde_json::to_string(&stored)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(self.path(SUBMISSIONS_FILE))
            .await?;
        // A torn final line would swallow this entry; start on a fresh line.
        if ends_mid_line(&mut file).await? {
            line.insert(0, '\n');
        }
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(stored)
    }

    async fn list_submissions(
        &self,
        student_id: &str,
        limit: usize,
        order: ListOrder,
    ) -> Result<Vec<Submission>, StoreError> {
        let log = self.read_ledger().await?;
        Ok(select_submissions(log.iter(), student_id, limit, order))
    }
}

/// Whether a non-empty file lacks a trailing newline.
async fn ends_mid_line(file: &mut File) -> Result<bool, StoreError> {
    if file.metadata().await?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] != b'\n')
}

#[async_trait]
impl ProfileStore for JsonStore {
    async fn get_profile(&self, id: &str) -> Result<Profile, StoreError> {
        let profiles: Vec<Profile> = self.read_array(PROFILES_FILE).await?;
        profiles
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "profile",
                id: id.to_string(),
            })
    }

    async fn upsert_profile(&self, profile: Profile) -> Result<Profile, StoreError> {
        check_profile(&profile)?;
        let _guard = self.write_lock.lock().await;
        let mut profiles: Vec<Profile> = self.read_array(PROFILES_FILE).await?;
        match profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => *existing = profile.clone(),
            None => profiles.push(profile.clone()),
        }
        self.write_array(PROFILES_FILE, &profiles).await?;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::{Band, CriteriaBands, Role, Subtype, TaskType};

    fn prompt() -> WritingPrompt {
        WritingPrompt {
            id: Uuid::new_v4(),
            task: TaskType::Task2,
            subtype: Some(Subtype::DiscussBothViews),
            text: "Discuss both views.".into(),
            difficulty: 1,
            topic_tags: Default::default(),
            visual_description: None,
            visual_metadata: None,
            created_at: Utc::now(),
        }
    }

    fn submission(student: &str) -> NewSubmission {
        let b = Band::from_f64(6.5).unwrap();
        NewSubmission {
            student_id: student.into(),
            prompt_id: None,
            task_type: TaskType::Task2,
            essay_text: "An essay.".into(),
            word_count: 2,
            overall_band: b,
            criteria: CriteriaBands {
                task: b,
                coherence: b,
                lexical: b,
                grammar: b,
            },
            raw_assessment: serde_json::json!({"overallBand": 6.5}),
        }
    }

    #[tokio::test]
    async fn prompts_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let p = prompt();
        {
            let store = JsonStore::open(dir.path()).await.unwrap();
            store.insert_prompt(p.clone()).await.unwrap();
        }
        let store = JsonStore::open(dir.path()).await.unwrap();
        assert_eq!(store.get_prompt(p.id).await.unwrap(), p);
        let page = store
            .list_prompts(&PromptFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        store.delete_prompt(p.id).await.unwrap();
        assert!(matches!(
            store.get_prompt(p.id).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn ledger_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        let first = store.append(submission("s1")).await.unwrap();
        store.append(submission("s2")).await.unwrap();
        let last = store.append(submission("s1")).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join(SUBMISSIONS_FILE)).unwrap();
        assert_eq!(content.lines().count(), 3);

        let listed = store
            .list_submissions("s1", 10, ListOrder::MostRecentFirst)
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, last.id);
        assert_eq!(listed[1].id, first.id);
        assert_eq!(listed[1], first);
    }

    #[tokio::test]
    async fn torn_ledger_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        store.append(submission("s1")).await.unwrap();
        let mut raw = std::fs::read_to_string(dir.path().join(SUBMISSIONS_FILE)).unwrap();
        raw.push_str("{\"id\": \"trunc");
        std::fs::write(dir.path().join(SUBMISSIONS_FILE), raw).unwrap();

        let listed = store
            .list_submissions("s1", 10, ListOrder::OldestFirst)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn append_after_torn_line_starts_a_new_line() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        let first = store.append(submission("s1")).await.unwrap();
        let mut raw = std::fs::read_to_string(dir.path().join(SUBMISSIONS_FILE)).unwrap();
        raw.push_str("{\"id\": \"trunc");
        std::fs::write(dir.path().join(SUBMISSIONS_FILE), raw).unwrap();

        let second = store.append(submission("s1")).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join(SUBMISSIONS_FILE)).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.ends_with('\n'));

        let listed = store
            .list_submissions("s1", 10, ListOrder::OldestFirst)
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_keep_whole_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(JsonStore::open(dir.path()).await.unwrap());

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.append(submission(&format!("s{}", i % 2))).await })
            })
            .collect();
        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap().unwrap().id);
        }
        assert_eq!(ids.len(), 20);

        let content = std::fs::read_to_string(dir.path().join(SUBMISSIONS_FILE)).unwrap();
        assert_eq!(content.lines().count(), 20);
        for line in content.lines() {
            serde_json::from_str::<Submission>(line).unwrap();
        }

        let mut listed = store
            .list_submissions("s0", 50, ListOrder::OldestFirst)
            .await
            .unwrap();
        listed.extend(
            store
                .list_submissions("s1", 50, ListOrder::OldestFirst)
                .await
                .unwrap(),
        );
        assert_eq!(listed.len(), 20);
        assert!(listed.iter().all(|s| ids.contains(&s.id)));
    }

    #[tokio::test]
    async fn profiles_upsert_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        let mut profile = Profile::new(
            "t1",
            "Teacher",
            Band::from_f64(8.0).unwrap(),
            Band::from_f64(8.5).unwrap(),
            Role::Teacher,
        )
        .unwrap();
        store.upsert_profile(profile.clone()).await.unwrap();
        profile.target_band = Band::from_f64(9.0).unwrap();
        store.upsert_profile(profile.clone()).await.unwrap();

        let profiles: Vec<Profile> = store.read_array(PROFILES_FILE).await.unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(store.get_profile("t1").await.unwrap(), profile);
    }

    #[tokio::test]
    async fn corrupt_catalog_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PROMPTS_FILE), "not json").unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        assert!(matches!(
            store.list_prompts(&PromptFilter::default(), Page::default()).await,
            Err(StoreError::Serialization(_))
        ));
    }
}
