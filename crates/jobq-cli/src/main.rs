mod supervisor;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use jobq_core::{JobState, NewJob, SqliteStore};

#[derive(Parser)]
#[command(name = "jobq", version, about = "Durable embedded job queue")]
struct Cli {
    /// Queue database file.
    #[arg(long, env = "QUEUE_DB", default_value = "queue.db", global = true)]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a job
    Enqueue {
        /// Full job as JSON, e.g. '{"command":"echo hi","priority":5}'
        json: Option<String>,

        #[arg(long)]
        id: Option<String>,

        /// Shell command line to execute (required here or in the JSON)
        #[arg(long)]
        command: Option<String>,

        #[arg(long)]
        max_retries: Option<i64>,

        /// Higher runs first (default 0)
        #[arg(long)]
        priority: Option<i64>,

        /// Earliest execution time, RFC 3339 UTC
        #[arg(long)]
        run_at: Option<String>,
    },

    /// List jobs in a state ("dead" lists the DLQ)
    List {
        #[arg(long, value_enum, default_value = "pending")]
        state: StateArg,
    },

    /// Queue counts plus worker liveness
    Status,

    /// Dead letter queue operations
    Dlq {
        #[command(subcommand)]
        command: DlqCommands,
    },

    /// Read or update queue settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Supervise worker processes
    Worker {
        #[command(subcommand)]
        command: WorkerCommands,
    },
}

#[derive(Subcommand)]
enum DlqCommands {
    /// List DLQ entries, newest first
    List,
    /// Re-enqueue a DLQ entry as a fresh pending job
    Retry { id: String },
}

#[derive(Subcommand)]
enum ConfigCommands {
    Get { key: String },
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum WorkerCommands {
    /// Spawn worker processes and record their PIDs in .workers.pid
    Start {
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// SIGTERM the workers recorded in .workers.pid
    Stop,
}

#[derive(Clone, Copy, ValueEnum)]
enum StateArg {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

impl From<StateArg> for JobState {
    fn from(s: StateArg) -> Self {
        match s {
            StateArg::Pending => JobState::Pending,
            StateArg::Processing => JobState::Processing,
            StateArg::Completed => JobState::Completed,
            StateArg::Failed => JobState::Failed,
            StateArg::Dead => JobState::Dead,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Enqueue {
            json,
            id,
            command,
            max_retries,
            priority,
            run_at,
        } => {
            let mut req: NewJob = match json {
                Some(s) => serde_json::from_str(&s).context("invalid JSON job")?,
                None => NewJob::default(),
            };
            // flags override the JSON body
            if let Some(id) = id {
                req.id = Some(id);
            }
            if let Some(command) = command {
                req.command = command;
            }
            if max_retries.is_some() {
                req.max_retries = max_retries;
            }
            if priority.is_some() {
                req.priority = priority;
            }
            if run_at.is_some() {
                req.run_at = run_at;
            }

            let store = SqliteStore::open(&cli.db).await?;
            let job_id = store.enqueue(req).await?;
            println!("{job_id}");
        }

        Commands::List { state } => {
            let store = SqliteStore::open(&cli.db).await?;
            let out = match state {
                // the DLQ is the authoritative listing for dead jobs
                StateArg::Dead => serde_json::to_string_pretty(&store.dlq_list().await?)?,
                other => {
                    serde_json::to_string_pretty(&store.list_jobs(other.into()).await?)?
                }
            };
            println!("{out}");
        }

        Commands::Status => {
            let store = SqliteStore::open(&cli.db).await?;
            let status = store.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }

        Commands::Dlq { command } => {
            let store = SqliteStore::open(&cli.db).await?;
            match command {
                DlqCommands::List => {
                    println!("{}", serde_json::to_string_pretty(&store.dlq_list().await?)?);
                }
                DlqCommands::Retry { id } => {
                    let job_id = store.dlq_retry(&id).await?;
                    println!("{job_id}");
                }
            }
        }

        Commands::Config { command } => {
            let store = SqliteStore::open(&cli.db).await?;
            match command {
                ConfigCommands::Get { key } => {
                    match store.config_get(&normalize_key(&key)).await? {
                        Some(value) => println!("{value}"),
                        None => println!("null"),
                    }
                }
                ConfigCommands::Set { key, value } => {
                    store.config_set(&normalize_key(&key), &value).await?;
                }
            }
        }

        Commands::Worker { command } => match command {
            WorkerCommands::Start { count } => {
                let pids = supervisor::start(count, &cli.db)?;
                for pid in pids {
                    println!("{pid}");
                }
            }
            WorkerCommands::Stop => {
                let stopped = supervisor::stop()?;
                println!("stopped {stopped} worker(s)");
            }
        },
    }

    Ok(())
}

/// Config keys accept dashes on the command line: `backoff-base` == `backoff_base`.
fn normalize_key(key: &str) -> String {
    key.replace('-', "_")
}
