//! The `bandwise validate` command.

use std::path::PathBuf;

use anyhow::Result;

use bandwise_core::parser;

pub fn execute(bank_path: PathBuf) -> Result<()> {
    let banks = if bank_path.is_dir() {
        parser::load_prompt_bank_directory(&bank_path)?
    } else {
        vec![parser::parse_prompt_bank(&bank_path)?]
    };

    let mut total_warnings = 0;

    for bank in &banks {
        println!("Bank: {} ({} prompts)", bank.name, bank.prompts.len());

        let warnings = parser::validate_prompt_bank(bank);
        for w in &warnings {
            let prefix = w
                .prompt
                .map(|n| format!("  [#{n}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All prompt banks valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
