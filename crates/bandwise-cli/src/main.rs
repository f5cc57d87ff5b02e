//! bandwise CLI: grade IELTS writing, manage the question bank, coach students.

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "bandwise", version, about = "IELTS writing assessment and coaching")]
struct Cli {
    /// Config file path (default: ./bandwise.toml, then ~/.config/bandwise/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overriding `data_dir` from the config
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config and prompt bank
    Init,

    /// Validate prompt bank TOML files
    Validate {
        /// Path to a prompt bank file or directory
        #[arg(long)]
        bank: PathBuf,
    },

    /// Manage the question bank
    Questions {
        #[command(subcommand)]
        action: QuestionsCommand,
    },

    /// Grade an essay and record it in the student's history
    Grade(GradeArgs),

    /// Manage profiles
    Profile {
        #[command(subcommand)]
        action: ProfileCommand,
    },

    /// Show a student's coaching dashboard
    Dashboard {
        /// Student profile id
        #[arg(long)]
        student: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List models of the configured providers
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,
    },
}

#[derive(Subcommand)]
enum QuestionsCommand {
    /// List prompts, most recent first
    List {
        #[arg(long)]
        task: Option<String>,
        #[arg(long)]
        subtype: Option<String>,
        #[arg(long)]
        difficulty: Option<u8>,
        #[arg(long)]
        topic: Option<String>,
        /// 1-based page number
        #[arg(long, default_value = "1")]
        page: usize,
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Add a prompt (teachers and admins)
    Add {
        /// Acting profile id
        #[arg(long)]
        actor: String,
        #[arg(long)]
        task: String,
        #[arg(long)]
        subtype: Option<String>,
        /// Question text
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "2")]
        difficulty: u8,
        /// Comma-separated topic tags
        #[arg(long)]
        tags: Option<String>,
        /// Description of the chart, table, process or map (task 1)
        #[arg(long)]
        visual: Option<String>,
    },

    /// Import every valid prompt of a bank file or directory (teachers and admins)
    Import {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        bank: PathBuf,
    },

    /// Generate candidate prompts in the style of the bank (teachers and admins)
    Generate {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        task: String,
        #[arg(long)]
        subtype: Option<String>,
        #[arg(long, default_value = "3")]
        count: usize,
        /// Save the valid candidates to the bank
        #[arg(long)]
        save: bool,
    },

    /// Delete a prompt (teachers and admins)
    Delete {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        id: String,
    },
}

#[derive(Args)]
pub struct GradeArgs {
    /// Student profile id
    #[arg(long)]
    student: String,

    /// File holding the essay text
    #[arg(long)]
    essay_file: PathBuf,

    /// Id of a prompt in the bank
    #[arg(long, conflicts_with_all = ["prompt_text", "visual"])]
    prompt_id: Option<String>,

    /// Task type (task1 or task2); taken from the stored prompt when omitted
    #[arg(long)]
    task: Option<String>,

    /// Question text, when not using a stored prompt
    #[arg(long, required_unless_present = "prompt_id")]
    prompt_text: Option<String>,

    /// Prompt subtype, when not using a stored prompt
    #[arg(long)]
    subtype: Option<String>,

    /// Visual description for a task 1 question
    #[arg(long)]
    visual: Option<String>,

    /// Print the full assessment as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Create or update a profile
    Set {
        #[arg(long)]
        id: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long)]
        current: f64,
        #[arg(long)]
        target: f64,
        /// student, teacher or admin
        #[arg(long, default_value = "student")]
        role: String,
    },

    /// Show a profile
    Show {
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bandwise=info")),
        )
        .init();

    let cli = Cli::parse();
    let global = commands::GlobalOptions {
        config: cli.config,
        data_dir: cli.data_dir,
    };

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { bank } => commands::validate::execute(bank),
        Commands::Questions { action } => match action {
            QuestionsCommand::List {
                task,
                subtype,
                difficulty,
                topic,
                page,
                limit,
            } => commands::questions::list(&global, task, subtype, difficulty, topic, page, limit)
                .await,
            QuestionsCommand::Add {
                actor,
                task,
                subtype,
                text,
                difficulty,
                tags,
                visual,
            } => {
                commands::questions::add(
                    &global, actor, task, subtype, text, difficulty, tags, visual,
                )
                .await
            }
            QuestionsCommand::Import { actor, bank } => {
                commands::questions::import(&global, actor, bank).await
            }
            QuestionsCommand::Generate {
                actor,
                task,
                subtype,
                count,
                save,
            } => commands::questions::generate(&global, actor, task, subtype, count, save).await,
            QuestionsCommand::Delete { actor, id } => {
                commands::questions::delete(&global, actor, id).await
            }
        },
        Commands::Grade(args) => commands::grade::execute(&global, args).await,
        Commands::Profile { action } => match action {
            ProfileCommand::Set {
                id,
                name,
                current,
                target,
                role,
            } => commands::profile::set(&global, id, name, current, target, role).await,
            ProfileCommand::Show { id } => commands::profile::show(&global, id).await,
        },
        Commands::Dashboard { student, json } => {
            commands::dashboard::execute(&global, student, json).await
        }
        Commands::ListModels { provider } => commands::list_models::execute(&global, provider),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
