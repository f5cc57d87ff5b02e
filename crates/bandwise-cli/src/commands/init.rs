//! The `bandwise init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("bandwise.toml").exists() {
        println!("bandwise.toml already exists, skipping.");
    } else {
        std::fs::write("bandwise.toml", SAMPLE_CONFIG)?;
        println!("Created bandwise.toml");
    }

    std::fs::create_dir_all("prompt-banks")?;
    let example_path = Path::new("prompt-banks/example.toml");
    if example_path.exists() {
        println!("prompt-banks/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_BANK)?;
        println!("Created prompt-banks/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Set BANDWISE_ANTHROPIC_KEY or edit bandwise.toml");
    println!("  2. Run: bandwise validate --bank prompt-banks/example.toml");
    println!("  3. Run: bandwise profile set --id teacher-1 --role teacher --current 8 --target 9");
    println!("  4. Run: bandwise questions import --actor teacher-1 --bank prompt-banks");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# bandwise configuration

default_provider = "anthropic"
default_model = "claude-sonnet-4-20250514"
temperature = 0.0
max_tokens = 3000
candidate_max_tokens = 2000
generation_timeout_secs = 90
parallelism = 4
history_window = 20
data_dir = "./bandwise-data"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"
"#;

const EXAMPLE_BANK: &str = r#"[bank]
name = "Example Bank"
description = "Two starter prompts, one per task"

[[prompts]]
task = "task1"
subtype = "chart"
difficulty = 2
topic_tags = ["energy", "environment"]
text = """
The chart below shows the percentage of household energy that came from \
renewable sources in four countries between 2000 and 2020.

Summarise the information by selecting and reporting the main features, \
and make comparisons where relevant.
"""
visual_description = """
Line chart, 2000 to 2020 in five-year steps. Germany rises from 6% to 45%, \
Spain from 9% to 42%, the UK from 3% to 38% and Poland from 2% to 17%.
"""

[[prompts]]
task = "task2"
subtype = "agree_disagree"
difficulty = 2
topic_tags = ["education", "technology"]
text = """
Some people believe that universities should replace lectures with online \
courses, because students can learn at their own pace.

To what extent do you agree or disagree?
"""
"#;
