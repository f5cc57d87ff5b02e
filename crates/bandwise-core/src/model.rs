//! Core data model types for bandwise.
//!
//! Prompts, bands, criteria, assessment results, submissions and profiles.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::AssessmentError;

// ---------------------------------------------------------------------------
// Bands
// ---------------------------------------------------------------------------

/// A band score in half-point steps from 0 to 9.
///
/// Stored as a count of half bands so comparison and rounding stay exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Band(u8);

impl Band {
    /// Lowest band a criterion may be awarded.
    pub const MIN_SCORED: Band = Band(8);
    /// Highest band.
    pub const MAX: Band = Band(18);

    /// Build a band from a number of half steps (`13` is band 6.5).
    pub fn from_half_steps(half_steps: u8) -> Option<Band> {
        (half_steps <= Self::MAX.0).then_some(Band(half_steps))
    }

    /// Build a band from a decimal value; fails unless it is a half step in 0..=9.
    pub fn from_f64(value: f64) -> Option<Band> {
        if !value.is_finite() {
            return None;
        }
        let doubled = value * 2.0;
        if doubled.fract() != 0.0 || !(0.0..=f64::from(Self::MAX.0)).contains(&doubled) {
            return None;
        }
        Some(Band(doubled as u8))
    }

    pub fn half_steps(self) -> u8 {
        self.0
    }

    pub fn value(self) -> f64 {
        f64::from(self.0) / 2.0
    }

    /// Whether this band is one a criterion can be awarded (4 to 9).
    pub fn is_scored(self) -> bool {
        (Self::MIN_SCORED..=Self::MAX).contains(&self)
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.value())
    }
}

impl Serialize for Band {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.value())
    }
}

impl<'de> Deserialize<'de> for Band {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Band::from_f64(value).ok_or_else(|| {
            serde::de::Error::custom(format!("{value} is not a half-point band between 0 and 9"))
        })
    }
}

// ---------------------------------------------------------------------------
// Task types and subtypes
// ---------------------------------------------------------------------------

/// The two writing tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Task1,
    Task2,
}

impl TaskType {
    pub const ALL: [TaskType; 2] = [TaskType::Task1, TaskType::Task2];

    /// Recommended minimum length. Shorter essays are penalised by the rubric,
    /// never rejected locally.
    pub fn min_words(self) -> usize {
        match self {
            TaskType::Task1 => 150,
            TaskType::Task2 => 250,
        }
    }

    /// Suggested writing time in minutes.
    pub fn suggested_minutes(self) -> u32 {
        match self {
            TaskType::Task1 => 20,
            TaskType::Task2 => 40,
        }
    }

    /// Exam-paper title, e.g. "Writing Task 2".
    pub fn title(self) -> &'static str {
        match self {
            TaskType::Task1 => "Writing Task 1",
            TaskType::Task2 => "Writing Task 2",
        }
    }

    /// The four criteria in fixed priority order.
    pub fn criteria(self) -> [Criterion; 4] {
        Criterion::ALL
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Task1 => write!(f, "task1"),
            TaskType::Task2 => write!(f, "task2"),
        }
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect();
        match normalized.trim_start_matches("writing") {
            "task1" | "1" => Ok(TaskType::Task1),
            "task2" | "2" => Ok(TaskType::Task2),
            _ => Err(format!("unknown task type: {s}")),
        }
    }
}

/// Prompt subtype. Each subtype belongs to exactly one task type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subtype {
    // Task 1
    #[serde(alias = "graph")]
    Chart,
    Table,
    Process,
    Map,
    // Task 2
    AgreeDisagree,
    DiscussBothViews,
    ProblemSolution,
    AdvantagesDisadvantages,
    TwoDirectQuestions,
}

impl Subtype {
    pub const ALL: [Subtype; 9] = [
        Subtype::Chart,
        Subtype::Table,
        Subtype::Process,
        Subtype::Map,
        Subtype::AgreeDisagree,
        Subtype::DiscussBothViews,
        Subtype::ProblemSolution,
        Subtype::AdvantagesDisadvantages,
        Subtype::TwoDirectQuestions,
    ];

    /// The task type this subtype belongs to.
    pub fn task(self) -> TaskType {
        match self {
            Subtype::Chart | Subtype::Table | Subtype::Process | Subtype::Map => TaskType::Task1,
            _ => TaskType::Task2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Subtype::Chart => "chart",
            Subtype::Table => "table",
            Subtype::Process => "process",
            Subtype::Map => "map",
            Subtype::AgreeDisagree => "agree_disagree",
            Subtype::DiscussBothViews => "discuss_both_views",
            Subtype::ProblemSolution => "problem_solution",
            Subtype::AdvantagesDisadvantages => "advantages_disadvantages",
            Subtype::TwoDirectQuestions => "two_direct_questions",
        }
    }

    /// Human-readable label used in instructions.
    pub fn label(self) -> &'static str {
        match self {
            Subtype::Chart => "chart or graph",
            Subtype::Table => "table",
            Subtype::Process => "process diagram",
            Subtype::Map => "map",
            Subtype::AgreeDisagree => "agree / disagree (opinion)",
            Subtype::DiscussBothViews => "discuss both views",
            Subtype::ProblemSolution => "problem / solution",
            Subtype::AdvantagesDisadvantages => "advantages / disadvantages",
            Subtype::TwoDirectQuestions => "two direct questions",
        }
    }
}

impl fmt::Display for Subtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subtype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' ', '/'], "_");
        if normalized == "graph" {
            return Ok(Subtype::Chart);
        }
        Subtype::ALL
            .into_iter()
            .find(|st| st.as_str() == normalized)
            .ok_or_else(|| format!("unknown subtype: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Criteria
// ---------------------------------------------------------------------------

/// The four scoring dimensions, declared in tie-break priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Task,
    Coherence,
    Lexical,
    Grammar,
}

impl Criterion {
    pub const ALL: [Criterion; 4] = [
        Criterion::Task,
        Criterion::Coherence,
        Criterion::Lexical,
        Criterion::Grammar,
    ];

    /// Wire key used in generator payloads (`TA` for task 1, `TR` for task 2).
    pub fn key(self, task: TaskType) -> &'static str {
        match (self, task) {
            (Criterion::Task, TaskType::Task1) => "TA",
            (Criterion::Task, TaskType::Task2) => "TR",
            (Criterion::Coherence, _) => "CC",
            (Criterion::Lexical, _) => "LR",
            (Criterion::Grammar, _) => "GRA",
        }
    }

    /// Official criterion name for the given task.
    pub fn name(self, task: TaskType) -> &'static str {
        match (self, task) {
            (Criterion::Task, TaskType::Task1) => "Task Achievement",
            (Criterion::Task, TaskType::Task2) => "Task Response",
            (Criterion::Coherence, _) => "Coherence and Cohesion",
            (Criterion::Lexical, _) => "Lexical Resource",
            (Criterion::Grammar, _) => "Grammatical Range and Accuracy",
        }
    }

    /// Task-independent name, used where history mixes both tasks.
    pub fn general_name(self) -> &'static str {
        match self {
            Criterion::Task => "Task Achievement/Response",
            Criterion::Coherence => "Coherence and Cohesion",
            Criterion::Lexical => "Lexical Resource",
            Criterion::Grammar => "Grammatical Range and Accuracy",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.general_name())
    }
}

/// One band per criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaBands {
    pub task: Band,
    pub coherence: Band,
    pub lexical: Band,
    pub grammar: Band,
}

impl CriteriaBands {
    pub fn get(&self, criterion: Criterion) -> Band {
        match criterion {
            Criterion::Task => self.task,
            Criterion::Coherence => self.coherence,
            Criterion::Lexical => self.lexical,
            Criterion::Grammar => self.grammar,
        }
    }

    pub fn as_array(&self) -> [Band; 4] {
        [self.task, self.coherence, self.lexical, self.grammar]
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// A stored writing task prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WritingPrompt {
    pub id: Uuid,
    pub task: TaskType,
    #[serde(default)]
    pub subtype: Option<Subtype>,
    pub text: String,
    pub difficulty: u8,
    #[serde(default)]
    pub topic_tags: BTreeSet<String>,
    /// Prose description of the chart, table, process or map (task 1 only).
    #[serde(default)]
    pub visual_description: Option<String>,
    /// Structured data behind the visual, if any.
    #[serde(default)]
    pub visual_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// An unpersisted prompt: manual entry, seed file row or generated candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptDraft {
    pub task: TaskType,
    #[serde(default)]
    pub subtype: Option<Subtype>,
    pub text: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
    #[serde(default)]
    pub topic_tags: BTreeSet<String>,
    #[serde(default)]
    pub visual_description: Option<String>,
    #[serde(default)]
    pub visual_metadata: Option<serde_json::Value>,
}

pub(crate) fn default_difficulty() -> u8 {
    2
}

fn is_blank(value: Option<&String>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

impl PromptDraft {
    /// Check the prompt invariants for its task type.
    pub fn validate(&self) -> Result<(), AssessmentError> {
        if self.text.trim().is_empty() {
            return Err(AssessmentError::Validation("prompt text is empty".into()));
        }
        if !(1..=3).contains(&self.difficulty) {
            return Err(AssessmentError::Validation(format!(
                "difficulty must be 1, 2 or 3, got {}",
                self.difficulty
            )));
        }
        if let Some(subtype) = self.subtype {
            if subtype.task() != self.task {
                return Err(AssessmentError::Validation(format!(
                    "subtype {subtype} belongs to {}, not {}",
                    subtype.task(),
                    self.task
                )));
            }
        }
        match self.task {
            TaskType::Task1 if is_blank(self.visual_description.as_ref()) => Err(
                AssessmentError::Validation("task1 prompts require a visual description".into()),
            ),
            TaskType::Task2 if self.subtype.is_none() => Err(AssessmentError::Validation(
                "task2 prompts require a subtype".into(),
            )),
            TaskType::Task2 if !is_blank(self.visual_description.as_ref()) => Err(
                AssessmentError::Validation("task2 prompts cannot carry a visual description".into()),
            ),
            _ => Ok(()),
        }
    }

    /// Assign identity and creation time. Call only after `validate`.
    pub fn into_prompt(self) -> WritingPrompt {
        WritingPrompt {
            id: Uuid::new_v4(),
            task: self.task,
            subtype: self.subtype,
            text: self.text.trim().to_string(),
            difficulty: self.difficulty,
            topic_tags: self
                .topic_tags
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            visual_description: self
                .visual_description
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            visual_metadata: self.visual_metadata,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Assessment results
// ---------------------------------------------------------------------------

/// Band and feedback for one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionScore {
    pub criterion: Criterion,
    pub band: Band,
    pub feedback: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub band_rationale: Option<String>,
}

/// Words the examiner singled out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VocabularyHighlights {
    #[serde(default)]
    pub effective: Vec<String>,
    #[serde(default)]
    pub problematic: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    #[serde(alias = "Grammar")]
    Grammar,
    #[serde(alias = "Vocabulary")]
    Vocabulary,
    #[serde(alias = "Spelling")]
    Spelling,
    #[serde(alias = "Punctuation")]
    Punctuation,
}

/// A quoted error from the essay with its correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorAnnotation {
    pub quote: String,
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    pub issue: String,
    pub correction: String,
}

/// A validated assessment. Only the validator constructs these from
/// generator output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResult {
    pub task_type: TaskType,
    pub word_count: u32,
    /// Exactly four entries, in `Criterion::ALL` order.
    pub criteria: Vec<CriterionScore>,
    pub overall_band: Band,
    pub summary: String,
    pub priority_improvements: Vec<String>,
    pub model_paragraph: String,
    #[serde(default)]
    pub word_count_note: Option<String>,
    #[serde(default)]
    pub task_specific_feedback: Option<String>,
    #[serde(default)]
    pub vocabulary_highlights: Option<VocabularyHighlights>,
    #[serde(default)]
    pub error_annotations: Vec<ErrorAnnotation>,
    #[serde(default)]
    pub original_paragraph: Option<String>,
    #[serde(default)]
    pub comparative_level: Option<String>,
}

impl AssessmentResult {
    pub fn criterion(&self, criterion: Criterion) -> Option<&CriterionScore> {
        self.criteria.iter().find(|c| c.criterion == criterion)
    }

    /// Band snapshot for the ledger.
    pub fn criteria_bands(&self) -> CriteriaBands {
        let band = |c| self.criterion(c).map_or(Band::MIN_SCORED, |s| s.band);
        CriteriaBands {
            task: band(Criterion::Task),
            coherence: band(Criterion::Coherence),
            lexical: band(Criterion::Lexical),
            grammar: band(Criterion::Grammar),
        }
    }
}

// ---------------------------------------------------------------------------
// Submissions and profiles
// ---------------------------------------------------------------------------

/// A ledger entry. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub student_id: String,
    #[serde(default)]
    pub prompt_id: Option<Uuid>,
    pub task_type: TaskType,
    pub essay_text: String,
    pub word_count: u32,
    pub overall_band: Band,
    pub criteria: CriteriaBands,
    /// The validated generator payload, kept opaque.
    pub raw_assessment: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A submission before the ledger assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubmission {
    pub student_id: String,
    pub prompt_id: Option<Uuid>,
    pub task_type: TaskType,
    pub essay_text: String,
    pub word_count: u32,
    pub overall_band: Band,
    pub criteria: CriteriaBands,
    pub raw_assessment: serde_json::Value,
}

impl NewSubmission {
    pub fn into_submission(self) -> Submission {
        Submission {
            id: Uuid::new_v4(),
            student_id: self.student_id,
            prompt_id: self.prompt_id,
            task_type: self.task_type,
            essay_text: self.essay_text,
            word_count: self.word_count,
            overall_band: self.overall_band,
            criteria: self.criteria,
            raw_assessment: self.raw_assessment,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    /// Teachers and admins curate the question bank.
    pub fn can_manage_prompts(self) -> bool {
        matches!(self, Role::Teacher | Role::Admin)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::Teacher => write!(f, "teacher"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub full_name: String,
    pub current_band: Band,
    pub target_band: Band,
    pub role: Role,
}

impl Profile {
    pub fn new(
        id: impl Into<String>,
        full_name: impl Into<String>,
        current_band: Band,
        target_band: Band,
        role: Role,
    ) -> Result<Self, AssessmentError> {
        let profile = Self {
            id: id.into(),
            full_name: full_name.into(),
            current_band,
            target_band,
            role,
        };
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), AssessmentError> {
        if self.id.trim().is_empty() {
            return Err(AssessmentError::Validation("profile id is empty".into()));
        }
        if self.target_band < self.current_band {
            return Err(AssessmentError::Validation(format!(
                "target band {} is below current band {}",
                self.target_band, self.current_band
            )));
        }
        Ok(())
    }
}

/// Count whitespace-separated words.
pub fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(v: f64) -> Band {
        Band::from_f64(v).unwrap()
    }

    #[test]
    fn band_parsing() {
        assert_eq!(band(6.5).half_steps(), 13);
        assert_eq!(band(9.0).to_string(), "9.0");
        assert!(Band::from_f64(6.25).is_none());
        assert!(Band::from_f64(9.5).is_none());
        assert!(Band::from_f64(-0.5).is_none());
        assert!(Band::from_f64(f64::NAN).is_none());
        assert!(band(4.0).is_scored());
        assert!(!band(3.5).is_scored());
    }

    #[test]
    fn band_serde() {
        let json = serde_json::to_string(&band(7.5)).unwrap();
        assert_eq!(json, "7.5");
        let parsed: Band = serde_json::from_str("6").unwrap();
        assert_eq!(parsed, band(6.0));
        assert!(serde_json::from_str::<Band>("6.3").is_err());
    }

    #[test]
    fn task_type_display_and_parse() {
        assert_eq!(TaskType::Task1.to_string(), "task1");
        assert_eq!("task2".parse::<TaskType>().unwrap(), TaskType::Task2);
        assert_eq!("Task 1".parse::<TaskType>().unwrap(), TaskType::Task1);
        assert_eq!(
            "Writing Task 2".parse::<TaskType>().unwrap(),
            TaskType::Task2
        );
        assert!("task3".parse::<TaskType>().is_err());
    }

    #[test]
    fn subtype_belongs_to_one_task() {
        assert_eq!(Subtype::Map.task(), TaskType::Task1);
        assert_eq!(Subtype::ProblemSolution.task(), TaskType::Task2);
        assert_eq!("graph".parse::<Subtype>().unwrap(), Subtype::Chart);
        assert_eq!(
            "discuss both views".parse::<Subtype>().unwrap(),
            Subtype::DiscussBothViews
        );
        let parsed: Subtype = serde_json::from_str("\"graph\"").unwrap();
        assert_eq!(parsed, Subtype::Chart);
    }

    #[test]
    fn criterion_keys_follow_task() {
        assert_eq!(Criterion::Task.key(TaskType::Task1), "TA");
        assert_eq!(Criterion::Task.key(TaskType::Task2), "TR");
        assert_eq!(Criterion::Grammar.key(TaskType::Task1), "GRA");
        assert_eq!(Criterion::Task.name(TaskType::Task1), "Task Achievement");
    }

    fn task2_draft() -> PromptDraft {
        PromptDraft {
            task: TaskType::Task2,
            subtype: Some(Subtype::AgreeDisagree),
            text: "Some people think cities should ban cars. Do you agree?".into(),
            difficulty: 2,
            topic_tags: BTreeSet::new(),
            visual_description: None,
            visual_metadata: None,
        }
    }

    #[test]
    fn draft_rejects_subtype_from_other_task() {
        let mut draft = task2_draft();
        draft.subtype = Some(Subtype::Map);
        assert!(matches!(
            draft.validate(),
            Err(AssessmentError::Validation(_))
        ));
    }

    #[test]
    fn draft_rejects_visual_on_task2() {
        let mut draft = task2_draft();
        draft.visual_description = Some("a bar chart".into());
        assert!(draft.validate().is_err());
    }

    #[test]
    fn draft_rejects_bad_difficulty() {
        let mut draft = task2_draft();
        draft.difficulty = 4;
        assert!(draft.validate().is_err());
    }

    #[test]
    fn into_prompt_normalizes_tags() {
        let mut draft = task2_draft();
        draft.topic_tags = ["  Transport ".to_string(), String::new()].into();
        let prompt = draft.into_prompt();
        assert_eq!(prompt.topic_tags.len(), 1);
        assert!(prompt.topic_tags.contains("transport"));
    }

    #[test]
    fn profile_target_must_not_be_below_current() {
        assert!(Profile::new("s1", "Ana", band(6.0), band(7.0), Role::Student).is_ok());
        assert!(Profile::new("s1", "Ana", band(6.5), band(6.5), Role::Student).is_ok());
        assert!(matches!(
            Profile::new("s1", "Ana", band(7.0), band(6.0), Role::Student),
            Err(AssessmentError::Validation(_))
        ));
    }

    #[test]
    fn word_count_splits_on_whitespace() {
        assert_eq!(word_count("  one two\nthree\t four  "), 4);
        assert_eq!(word_count(""), 0);
    }
}
