//! The `bandwise dashboard` command.

use anyhow::Result;

use super::GlobalOptions;

pub async fn execute(global: &GlobalOptions, student: String, json: bool) -> Result<()> {
    let service = global.service().await?;
    let summary = service.dashboard_summary(&student).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let focus = summary
        .emphasis_criteria
        .iter()
        .map(|c| c.general_name())
        .collect::<Vec<_>>()
        .join(", ");

    println!("Student: {}", summary.student_id);
    println!("  Recent band:   {:.1}", summary.recent_band);
    println!("  Target band:   {}", summary.target_band);
    println!("  Gap:           {:.1}", summary.band_gap);
    println!("  Attempts:      {}", summary.attempts);
    println!("  Focus:         {focus}");
    println!("  Practice at:   {}", summary.difficulty_level);
    println!("  Next task:     {}", summary.recommended_task);
    println!("\n{}", summary.coaching_note);

    Ok(())
}
