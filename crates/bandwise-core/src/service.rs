//! The assessment service: the operations callers drive.
//!
//! Grading flows prompt → instructions → generator → validator → band
//! cross-check → ledger. The ledger append is the last await of the request
//! future, so a caller that drops the future earlier leaves no trace.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::instrument;
use uuid::Uuid;

use crate::band::{cross_check, BandDiscrepancy};
use crate::error::{AssessmentError, StoreError};
use crate::generation::{generate_once, GenerationSettings};
use crate::model::{
    word_count, AssessmentResult, Criterion, NewSubmission, Profile, PromptDraft, Submission,
    Subtype, TaskType, WritingPrompt,
};
use crate::personalization::{personalize, DashboardSummary, RECENT_WINDOW};
use crate::question_bank::QuestionBank;
use crate::rubric::{build_grading_instructions, GradingContext, PriorAttempt};
use crate::store::{
    ListOrder, Page, ProfileStore, PromptFilter, PromptPage, PromptStore, SubmissionLedger,
};
use crate::traits::TextGenerator;
use crate::validator::{parse_payload, validate_value};

/// Configuration for the assessment service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub generation: GenerationSettings,
    /// Maximum concurrent gradings in a batch.
    pub parallelism: usize,
    /// How many past submissions the dashboard considers.
    pub history_window: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            generation: GenerationSettings::default(),
            parallelism: 4,
            history_window: 20,
        }
    }
}

/// Which question the essay answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PromptRef {
    /// A prompt from the question bank.
    Stored(Uuid),
    /// A question supplied with the essay.
    Inline {
        text: String,
        subtype: Option<Subtype>,
        visual_data: Option<String>,
    },
}

/// One essay to grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingSubmission {
    pub student_id: String,
    pub essay: String,
    pub prompt: PromptRef,
    pub task_type: TaskType,
}

/// Outcome of a successful grading.
#[derive(Debug, Clone, Serialize)]
pub struct GradedEssay {
    pub assessment: AssessmentResult,
    /// The ledger entry, absent when the append failed.
    pub submission: Option<Submission>,
    pub band_discrepancy: Option<BandDiscrepancy>,
    /// Set when grading succeeded but the ledger append did not.
    pub persistence_failure: Option<String>,
}

/// Orchestrates grading, the question bank and the dashboard.
pub struct AssessmentService {
    bank: QuestionBank,
    prompts: Arc<dyn PromptStore>,
    ledger: Arc<dyn SubmissionLedger>,
    profiles: Arc<dyn ProfileStore>,
    generator: Arc<dyn TextGenerator>,
    config: ServiceConfig,
}

impl AssessmentService {
    pub fn new(
        prompts: Arc<dyn PromptStore>,
        ledger: Arc<dyn SubmissionLedger>,
        profiles: Arc<dyn ProfileStore>,
        generator: Arc<dyn TextGenerator>,
        config: ServiceConfig,
    ) -> Self {
        let bank = QuestionBank::new(
            Arc::clone(&prompts),
            Arc::clone(&generator),
            config.generation.clone(),
        );
        Self {
            bank,
            prompts,
            ledger,
            profiles,
            generator,
            config,
        }
    }

    /// Build a service whose three stores are one backend.
    pub fn with_store<S>(store: Arc<S>, generator: Arc<dyn TextGenerator>, config: ServiceConfig) -> Self
    where
        S: PromptStore + SubmissionLedger + ProfileStore + 'static,
    {
        Self::new(store.clone(), store.clone(), store, generator, config)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Grade one essay and record it in the student's ledger.
    ///
    /// Short essays are not rejected here; the rubric penalises them.
    #[instrument(
        skip(self, request),
        fields(student = %request.student_id, task = %request.task_type)
    )]
    pub async fn submit_for_grading(
        &self,
        request: GradingSubmission,
    ) -> Result<GradedEssay, AssessmentError> {
        if request.student_id.trim().is_empty() {
            return Err(AssessmentError::Validation("student id is empty".into()));
        }
        if request.essay.trim().is_empty() {
            return Err(AssessmentError::Validation("essay is empty".into()));
        }

        let task = request.task_type;
        let (prompt_id, mut context) = self.resolve_prompt(&request.prompt, task).await?;
        context.essay = request.essay.clone();
        self.add_student_context(&request.student_id, &mut context)
            .await;

        let instructions = build_grading_instructions(&context);
        let response = generate_once(
            self.generator.as_ref(),
            &self.config.generation,
            instructions.system,
            instructions.user,
            self.config.generation.max_tokens,
        )
        .await?;

        let raw_assessment = parse_payload(&response.content)?;
        let assessment = validate_value(&raw_assessment, task)?;
        let band_discrepancy = cross_check(&assessment);

        let entry = NewSubmission {
            student_id: request.student_id.clone(),
            prompt_id,
            task_type: task,
            essay_text: request.essay,
            word_count: word_count(&context.essay),
            overall_band: assessment.overall_band,
            criteria: assessment.criteria_bands(),
            raw_assessment,
        };

        let (submission, persistence_failure) = match self.ledger.append(entry).await {
            Ok(stored) => {
                tracing::info!(
                    submission = %stored.id,
                    overall = %stored.overall_band,
                    "essay graded"
                );
                (Some(stored), None)
            }
            Err(e) => {
                tracing::error!(
                    student = %request.student_id,
                    overall = %assessment.overall_band,
                    "graded essay could not be recorded: {e}"
                );
                (None, Some(e.to_string()))
            }
        };

        Ok(GradedEssay {
            assessment,
            submission,
            band_discrepancy,
            persistence_failure,
        })
    }

    /// Grade independent essays concurrently, bounded by `parallelism`.
    ///
    /// Outcomes come back in input order.
    pub async fn grade_batch(
        &self,
        requests: Vec<GradingSubmission>,
    ) -> Vec<Result<GradedEssay, AssessmentError>> {
        let total = requests.len();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut futures = FuturesUnordered::new();

        for (index, request) in requests.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => self.submit_for_grading(request).await,
                    Err(_) => Err(AssessmentError::transport("batch was cancelled")),
                };
                (index, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some(done) = futures.next().await {
            outcomes.push(done);
        }
        outcomes.sort_by_key(|(index, _)| *index);

        let failed = outcomes.iter().filter(|(_, o)| o.is_err()).count();
        tracing::info!(total, failed, "batch grading finished");
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }

    /// Ask the generator for new prompts; nothing is persisted. Teachers and
    /// admins only.
    pub async fn generate_candidate_questions(
        &self,
        actor: &str,
        task: TaskType,
        subtype: Option<Subtype>,
        count: usize,
    ) -> Result<Vec<PromptDraft>, AssessmentError> {
        self.authorize_prompt_management(actor).await?;
        self.bank.generate_candidates(task, subtype, count).await
    }

    /// Add a prompt to the bank. Teachers and admins only.
    pub async fn add_prompt(
        &self,
        actor: &str,
        draft: PromptDraft,
    ) -> Result<WritingPrompt, AssessmentError> {
        self.authorize_prompt_management(actor).await?;
        self.bank.insert(draft).await
    }

    /// Remove a prompt from the bank. Teachers and admins only.
    pub async fn remove_prompt(&self, actor: &str, id: Uuid) -> Result<(), AssessmentError> {
        self.authorize_prompt_management(actor).await?;
        self.bank.delete(id).await
    }

    pub async fn prompt(&self, id: Uuid) -> Result<WritingPrompt, AssessmentError> {
        self.bank.get(id).await
    }

    pub async fn list_prompts(
        &self,
        filter: &PromptFilter,
        page: Page,
    ) -> Result<PromptPage, AssessmentError> {
        self.bank.list(filter, page).await
    }

    /// Create or replace a profile.
    pub async fn save_profile(&self, profile: Profile) -> Result<Profile, AssessmentError> {
        profile.validate()?;
        Ok(self.profiles.upsert_profile(profile).await?)
    }

    pub async fn profile(&self, id: &str) -> Result<Profile, AssessmentError> {
        Ok(self.profiles.get_profile(id).await?)
    }

    /// Coaching signals for one student from their recent ledger.
    #[instrument(skip(self))]
    pub async fn dashboard_summary(
        &self,
        student_id: &str,
    ) -> Result<DashboardSummary, AssessmentError> {
        let profile = self.profiles.get_profile(student_id).await?;
        let history = self
            .ledger
            .list_submissions(
                student_id,
                self.config.history_window.max(RECENT_WINDOW),
                ListOrder::MostRecentFirst,
            )
            .await?;
        Ok(personalize(&profile, &history))
    }

    async fn authorize_prompt_management(&self, actor: &str) -> Result<(), AssessmentError> {
        let profile = match self.profiles.get_profile(actor).await {
            Ok(profile) => profile,
            Err(StoreError::NotFound { .. }) => {
                return Err(AssessmentError::Forbidden(format!("unknown actor: {actor}")))
            }
            Err(e) => return Err(e.into()),
        };
        if !profile.role.can_manage_prompts() {
            tracing::warn!(actor, role = %profile.role, "prompt management refused");
            return Err(AssessmentError::Forbidden(format!(
                "{} may not manage prompts",
                profile.role
            )));
        }
        Ok(())
    }

    async fn resolve_prompt(
        &self,
        prompt: &PromptRef,
        task: TaskType,
    ) -> Result<(Option<Uuid>, GradingContext), AssessmentError> {
        match prompt {
            PromptRef::Stored(id) => {
                let stored = match self.prompts.get_prompt(*id).await {
                    Ok(stored) => stored,
                    Err(StoreError::NotFound { .. }) => {
                        return Err(AssessmentError::Validation(format!("unknown prompt: {id}")))
                    }
                    Err(e) => return Err(e.into()),
                };
                if stored.task != task {
                    return Err(AssessmentError::Validation(format!(
                        "prompt {id} is a {} prompt, not {task}",
                        stored.task
                    )));
                }
                Ok((
                    Some(stored.id),
                    GradingContext {
                        task: Some(task),
                        subtype: stored.subtype,
                        prompt_text: stored.text,
                        visual_data: stored.visual_description,
                        ..Default::default()
                    },
                ))
            }
            PromptRef::Inline {
                text,
                subtype,
                visual_data,
            } => {
                if text.trim().is_empty() {
                    return Err(AssessmentError::Validation("prompt text is empty".into()));
                }
                if let Some(subtype) = subtype {
                    if subtype.task() != task {
                        return Err(AssessmentError::Validation(format!(
                            "subtype {subtype} does not belong to {task}"
                        )));
                    }
                }
                Ok((
                    None,
                    GradingContext {
                        task: Some(task),
                        subtype: *subtype,
                        prompt_text: text.clone(),
                        visual_data: visual_data.clone(),
                        ..Default::default()
                    },
                ))
            }
        }
    }

    /// Target band and recent attempts, when available. Never fails the request.
    async fn add_student_context(&self, student_id: &str, context: &mut GradingContext) {
        match self.profiles.get_profile(student_id).await {
            Ok(profile) => context.target_band = Some(profile.target_band),
            Err(StoreError::NotFound { .. }) => {}
            Err(e) => tracing::warn!("profile unavailable for adaptive context: {e}"),
        }

        match self
            .ledger
            .list_submissions(student_id, RECENT_WINDOW, ListOrder::MostRecentFirst)
            .await
        {
            Ok(history) => {
                context.prior_attempts = history.iter().map(prior_attempt).collect();
            }
            Err(e) => tracing::warn!("history unavailable for adaptive context: {e}"),
        }
    }
}

fn prior_attempt(submission: &Submission) -> PriorAttempt {
    let weakest = Criterion::ALL
        .into_iter()
        .min_by_key(|c| submission.criteria.get(*c))
        .unwrap_or(Criterion::Task);
    PriorAttempt {
        task: submission.task_type,
        overall_band: submission.overall_band,
        weakest,
    }
}
