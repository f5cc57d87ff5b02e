//! Coaching signals derived from a profile and its submission history.
//!
//! Everything here is a pure function of its inputs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{Band, Criterion, Profile, Submission, TaskType};

/// How many of the latest submissions define the "recent" window.
pub const RECENT_WINDOW: usize = 3;

/// Practice level implied by the recent band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DifficultyLevel {
    Foundation,
    Intermediate,
    Advanced,
}

impl DifficultyLevel {
    pub fn for_band(band: f64) -> Self {
        if band < 5.5 {
            DifficultyLevel::Foundation
        } else if band < 6.5 {
            DifficultyLevel::Intermediate
        } else {
            DifficultyLevel::Advanced
        }
    }
}

impl fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DifficultyLevel::Foundation => write!(f, "Foundation"),
            DifficultyLevel::Intermediate => write!(f, "Intermediate"),
            DifficultyLevel::Advanced => write!(f, "Advanced"),
        }
    }
}

/// What the dashboard shows a student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub student_id: String,
    /// Mean overall band of the recent window, one decimal.
    pub recent_band: f64,
    pub target_band: Band,
    /// Distance to target, never negative, one decimal.
    pub band_gap: f64,
    /// One or two criteria to focus on, in priority order.
    pub emphasis_criteria: Vec<Criterion>,
    pub difficulty_level: DifficultyLevel,
    pub recommended_task: TaskType,
    pub coaching_note: String,
    /// Number of submissions the summary was computed from.
    pub attempts: usize,
}

/// Derive coaching signals. `history` must be ordered most recent first.
pub fn personalize(profile: &Profile, history: &[Submission]) -> DashboardSummary {
    let recent = &history[..history.len().min(RECENT_WINDOW)];

    let recent_band = recent_band(profile, recent);
    let band_gap = round1((profile.target_band.value() - recent_band).max(0.0));
    let emphasis_criteria = emphasis_criteria(recent);
    let difficulty_level = DifficultyLevel::for_band(recent_band);
    let recommended_task = recommended_task(history);

    let coaching_note = coaching_note(
        recent_band,
        profile.target_band,
        band_gap,
        &emphasis_criteria,
        difficulty_level,
        recommended_task,
    );

    DashboardSummary {
        student_id: profile.id.clone(),
        recent_band,
        target_band: profile.target_band,
        band_gap,
        emphasis_criteria,
        difficulty_level,
        recommended_task,
        coaching_note,
        attempts: history.len(),
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn recent_band(profile: &Profile, recent: &[Submission]) -> f64 {
    if recent.is_empty() {
        return profile.current_band.value();
    }
    let sum: f64 = recent.iter().map(|s| s.overall_band.value()).sum();
    round1(sum / recent.len() as f64)
}

/// Criteria tied at the lowest average band, in priority order, at most two.
fn emphasis_criteria(recent: &[Submission]) -> Vec<Criterion> {
    if recent.is_empty() {
        return vec![Criterion::Task];
    }

    // Sum in half steps so ties are compared exactly.
    let totals: Vec<(Criterion, u32)> = Criterion::ALL
        .iter()
        .map(|&c| {
            let total = recent
                .iter()
                .map(|s| u32::from(s.criteria.get(c).half_steps()))
                .sum();
            (c, total)
        })
        .collect();

    let lowest = totals.iter().map(|(_, t)| *t).min().unwrap_or(0);
    totals
        .into_iter()
        .filter(|(_, t)| *t == lowest)
        .map(|(c, _)| c)
        .take(2)
        .collect()
}

/// The task with fewer attempts; ties go to task 2, which carries more weight.
fn recommended_task(history: &[Submission]) -> TaskType {
    let count = |task| history.iter().filter(|s| s.task_type == task).count();
    if count(TaskType::Task1) < count(TaskType::Task2) {
        TaskType::Task1
    } else {
        TaskType::Task2
    }
}

fn task_label(task: TaskType) -> &'static str {
    match task {
        TaskType::Task1 => "Task 1",
        TaskType::Task2 => "Task 2",
    }
}

fn coaching_note(
    recent_band: f64,
    target: Band,
    gap: f64,
    emphasis: &[Criterion],
    level: DifficultyLevel,
    task: TaskType,
) -> String {
    let focus = emphasis
        .iter()
        .map(|c| c.general_name())
        .collect::<Vec<_>>()
        .join(" and ");

    let standing = if gap > 0.0 {
        format!(
            "You are averaging Band {recent_band:.1}, {gap:.1} below your target of Band {target}."
        )
    } else {
        format!("You are averaging Band {recent_band:.1}, at or above your target of Band {target}.")
    };

    format!(
        "{standing} Focus on {focus} with {level} practice, and make your next essay a {} response.",
        task_label(task)
    )
}
