//! Prepmate CLI
//!
//! Command-line front end for the progress store, the legacy-data migration,
//! and the hint-assistant chat loop.

use clap::{Parser, Subcommand};
use prepmate::chat::{CompletionClient, HintClient, HINT_SYSTEM_PROMPT};
use prepmate::local::BlobDir;
use prepmate::remote::RestTableClient;
use prepmate::{
    Migrator, PrepmateConfig, ProgressStore, SessionIdentity, SessionRegistry,
};
use serde::Deserialize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Prepmate - coding-interview practice companion
#[derive(Parser, Debug)]
#[command(name = "prepmate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// User id to act as (stands in for the app's auth provider)
    #[arg(short, long)]
    user: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mark a question complete
    Mark {
        collection_id: String,
        question_id: String,

        /// Mark the question incomplete instead
        #[arg(long)]
        undo: bool,

        /// Treat the collection id as a study plan
        #[arg(long)]
        study_plan: bool,
    },

    /// Show completion state and summary for a collection
    Show {
        collection_id: String,

        /// Treat the collection id as a study plan
        #[arg(long)]
        study_plan: bool,
    },

    /// Migrate legacy local progress into the remote table
    Migrate,

    /// Chat with the hint assistant
    Chat {
        /// Session id (reusing an id resumes its history)
        #[arg(long, default_value = "default")]
        session: String,
    },
}

/// Optional config file under the prepmate home directory.
#[derive(Debug, Default, Deserialize)]
struct ConfigToml {
    api_base_url: Option<String>,
    api_key: Option<String>,
    llm_base_url: Option<String>,
    llm_api_key: Option<String>,
    llm_model: Option<String>,
    max_exchanges: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let home = get_prepmate_home()?;
    let config = load_config(&home)?;
    info!("prepmate home: {:?}", home);

    let user = cli
        .user
        .clone()
        .or_else(|| std::env::var("PREPMATE_USER").ok());
    let identity = Arc::new(match user {
        Some(user) => SessionIdentity::signed_in(user),
        None => SessionIdentity::anonymous(),
    });

    match cli.command {
        Command::Mark {
            collection_id,
            question_id,
            undo,
            study_plan,
        } => {
            let store = ProgressStore::new(remote_table(&config)?, identity);
            let completed = !undo;
            let ok = if study_plan {
                store
                    .save_study_plan_progress(&collection_id, &question_id, completed)
                    .await
            } else {
                store.save_progress(&collection_id, &question_id, completed).await
            };
            if ok {
                println!(
                    "{} {}/{}",
                    if completed { "Completed" } else { "Uncompleted" },
                    collection_id,
                    question_id
                );
            } else {
                anyhow::bail!("failed to save progress (signed in? network up?)");
            }
        }

        Command::Show {
            collection_id,
            study_plan,
        } => {
            let store = ProgressStore::new(remote_table(&config)?, identity);
            let (progress, summary) = if study_plan {
                (
                    store.load_study_plan_progress(&collection_id).await,
                    store.study_plan_summary(&collection_id).await,
                )
            } else {
                (
                    store.load_progress(&collection_id).await,
                    store.progress_summary(&collection_id).await,
                )
            };

            let mut questions: Vec<_> = progress.iter().collect();
            questions.sort();
            for (question_id, completed) in questions {
                println!("  [{}] {}", if *completed { "x" } else { " " }, question_id);
            }
            match summary {
                Some(s) => println!(
                    "{}: {}/{} completed ({:.0}%)",
                    s.collection_id, s.completed_questions, s.total_questions, s.progress_percentage
                ),
                None => println!("{}: no summary available", collection_id),
            }
        }

        Command::Migrate => {
            let local = Arc::new(BlobDir::new(config.local_blob_dir()));
            let migrator = Migrator::new(local, remote_table(&config)?, identity);

            if !migrator.has_local_progress() {
                println!("No legacy local progress found.");
                return Ok(());
            }
            if migrator.has_remote_progress().await {
                println!("Note: remote progress already exists; migration will merge into it.");
            }

            let report = migrator.migrate().await;
            for outcome in &report.outcomes {
                match &outcome.error {
                    None => println!("  ok    {} ({} rows)", outcome.key, outcome.migrated_rows),
                    Some(e) => println!("  fail  {} ({})", outcome.key, e),
                }
            }
            if report.succeeded() {
                println!("Migrated {} row(s). Local data was left in place.", report.migrated_rows());
            } else {
                anyhow::bail!("migration finished with failures; rerun is safe");
            }
        }

        Command::Chat { session } => {
            let client = HintClient::new(
                config.llm_base_url.clone(),
                config.llm_api_key.clone(),
                config.llm_model.clone(),
            );
            run_chat(&session, config.max_exchanges, &client).await?;
        }
    }

    Ok(())
}

/// Interactive chat loop. `/clear` starts a new conversation, `/quit` exits.
async fn run_chat(
    session_id: &str,
    max_exchanges: usize,
    client: &dyn CompletionClient,
) -> anyhow::Result<()> {
    let mut registry = SessionRegistry::with_max_exchanges(max_exchanges);
    println!("Hint assistant ready. /clear for a new conversation, /quit to exit.");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match input {
            "/quit" => break,
            "/clear" => {
                registry.clear_session(session_id);
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        let memory = registry.session(session_id);
        memory.add_user_turn(input);
        let messages = memory.build_context_window(HINT_SYSTEM_PROMPT, input);

        match client.complete(&messages).await {
            Ok(reply) => {
                memory.add_assistant_turn(reply.clone());
                if memory.should_truncate() {
                    memory.truncate();
                }
                println!("{}\n", reply);
            }
            Err(e) => {
                // Pending turn stays staged; the next reply still pairs with it.
                eprintln!("hint request failed: {}\n", e);
            }
        }
    }

    Ok(())
}

/// Get the prepmate home directory
fn get_prepmate_home() -> anyhow::Result<PathBuf> {
    if let Ok(home) = std::env::var("PREPMATE_HOME") {
        return Ok(PathBuf::from(home));
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    Ok(home.join(".prepmate"))
}

/// Load config.toml (if present) and env fallbacks into a PrepmateConfig.
fn load_config(home: &PathBuf) -> anyhow::Result<PrepmateConfig> {
    let mut file_config = ConfigToml::default();
    let config_file = home.join("config.toml");
    if config_file.exists() {
        let content = std::fs::read_to_string(&config_file)?;
        file_config = toml::from_str(&content)?;
    }

    let api_key = file_config
        .api_key
        .or_else(|| std::env::var("PREPMATE_API_KEY").ok());
    let llm_api_key = file_config
        .llm_api_key
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());

    let mut config = PrepmateConfig::new(home.clone());
    if let Some(base_url) = file_config.api_base_url {
        config = config.with_remote(base_url, api_key);
    }
    if let Some(base_url) = file_config.llm_base_url {
        config.llm_base_url = base_url;
    }
    config.llm_api_key = llm_api_key;
    if let Some(model) = file_config.llm_model {
        config.llm_model = model;
    }
    if let Some(max) = file_config.max_exchanges {
        config = config.with_max_exchanges(max);
    }
    Ok(config)
}

/// Build the remote table client, failing when no endpoint is configured.
fn remote_table(config: &PrepmateConfig) -> anyhow::Result<Arc<RestTableClient>> {
    let base_url = config
        .api_base_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no api_base_url configured (see config.toml)"))?;
    Ok(Arc::new(RestTableClient::new(
        base_url,
        config.api_key.clone(),
    )))
}
