//! The `bandwise profile` commands.

use anyhow::{Context, Result};

use bandwise_core::model::{Band, Profile, Role};

use super::GlobalOptions;

pub async fn set(
    global: &GlobalOptions,
    id: String,
    name: String,
    current: f64,
    target: f64,
    role: String,
) -> Result<()> {
    let role: Role = role.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let current_band = parse_band(current).context("invalid --current")?;
    let target_band = parse_band(target).context("invalid --target")?;
    let profile = Profile::new(id, name, current_band, target_band, role)?;

    let service = global.service().await?;
    let saved = service.save_profile(profile).await?;
    println!(
        "Saved profile {} ({}, current {}, target {})",
        saved.id, saved.role, saved.current_band, saved.target_band
    );
    Ok(())
}

pub async fn show(global: &GlobalOptions, id: String) -> Result<()> {
    let service = global.service().await?;
    let profile = service.profile(&id).await?;

    println!("Profile: {}", profile.id);
    if !profile.full_name.is_empty() {
        println!("  Name:    {}", profile.full_name);
    }
    println!("  Role:    {}", profile.role);
    println!("  Current: {}", profile.current_band);
    println!("  Target:  {}", profile.target_band);
    Ok(())
}

fn parse_band(value: f64) -> Result<Band> {
    Band::from_f64(value)
        .with_context(|| format!("{value} is not a band (0 to 9 in half steps)"))
}
