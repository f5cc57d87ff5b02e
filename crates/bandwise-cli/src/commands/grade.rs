//! The `bandwise grade` command.

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use uuid::Uuid;

use bandwise_core::service::{GradedEssay, GradingSubmission, PromptRef};

use super::{parse_subtype, parse_task, GlobalOptions};
use crate::GradeArgs;

pub async fn execute(global: &GlobalOptions, args: GradeArgs) -> Result<()> {
    let essay = std::fs::read_to_string(&args.essay_file)
        .with_context(|| format!("failed to read essay: {}", args.essay_file.display()))?;

    let service = global.service().await?;

    let (prompt, task_type) = match &args.prompt_id {
        Some(id) => {
            let id =
                Uuid::parse_str(id.trim()).with_context(|| format!("invalid prompt id: {id}"))?;
            let task = match &args.task {
                Some(task) => parse_task(task)?,
                None => service.prompt(id).await?.task,
            };
            (PromptRef::Stored(id), task)
        }
        None => {
            let task = args
                .task
                .as_deref()
                .context("--task is required with --prompt-text")?;
            let prompt = PromptRef::Inline {
                text: args.prompt_text.clone().unwrap_or_default(),
                subtype: parse_subtype(args.subtype.as_deref())?,
                visual_data: args.visual.clone(),
            };
            (prompt, parse_task(task)?)
        }
    };

    eprintln!("Grading {task_type} essay for {}...", args.student);

    let graded = service
        .submit_for_grading(GradingSubmission {
            student_id: args.student.clone(),
            essay,
            prompt,
            task_type,
        })
        .await?;

    if let Some(failure) = &graded.persistence_failure {
        eprintln!("WARNING: the assessment was not saved to history: {failure}");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&graded)?);
    } else {
        print_assessment(&graded);
    }

    Ok(())
}

fn print_assessment(graded: &GradedEssay) {
    let assessment = &graded.assessment;
    let task = assessment.task_type;

    let mut table = Table::new();
    table.set_header(vec!["Criterion", "Band", "Feedback"]);
    for score in &assessment.criteria {
        table.add_row(vec![
            Cell::new(format!(
                "{} ({})",
                score.criterion.name(task),
                score.criterion.key(task)
            )),
            Cell::new(score.band),
            Cell::new(&score.feedback),
        ]);
    }
    println!("{table}");

    println!("\nOverall band: {}", assessment.overall_band);
    if let Some(discrepancy) = &graded.band_discrepancy {
        println!(
            "Note: the criterion bands average {:.2}, which rounds to {}.",
            discrepancy.mean, discrepancy.computed
        );
    }
    println!("Words: {}", assessment.word_count);
    if let Some(note) = &assessment.word_count_note {
        println!("{note}");
    }

    println!("\n{}", assessment.summary);

    if !assessment.priority_improvements.is_empty() {
        println!("\nPriorities:");
        for (i, item) in assessment.priority_improvements.iter().enumerate() {
            println!("  {}. {item}", i + 1);
        }
    }

    if !assessment.error_annotations.is_empty() {
        println!("\nCorrections:");
        for annotation in &assessment.error_annotations {
            println!(
                "  \"{}\" -> \"{}\" ({})",
                annotation.quote, annotation.correction, annotation.issue
            );
        }
    }

    println!("\nModel paragraph:\n{}", assessment.model_paragraph);

    if let Some(submission) = &graded.submission {
        println!("\nSaved as submission {}", submission.id);
    }
}
