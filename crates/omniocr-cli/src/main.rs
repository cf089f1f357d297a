use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;

use omniocr::config::{default_config_path, load_config, load_config_or_default};
use omniocr::{
    init_logging, Config, DispatchOutcome, Job, LogEntry, LogFormat, OcrEngine, OmniOcr,
    Submission,
};

/// Interval between log polls in `logs --follow`.
const FOLLOW_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "omniocr")]
#[command(about = "Submit documents for OCR and track their jobs", version)]
struct Cli {
    /// Config file (default: ~/.omniocr/config.json)
    #[arg(long, global = true, value_name = "PATH", env = "OMNIOCR_CONFIG")]
    config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(long, global = true, value_name = "PATH")]
    database: Option<PathBuf>,

    /// Log output format: text or json
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a document and wait for its text. Ctrl-C cancels the job.
    Submit {
        file: PathBuf,
        /// gemini, mistral, doctr or tesseract
        #[arg(long, short)]
        engine: String,
        #[arg(long)]
        owner: Option<String>,
        /// MIME type, inferred from the file name when omitted
        #[arg(long)]
        mime: Option<String>,
        /// Write the extracted text here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// List jobs, newest first
    Jobs {
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show a job's log
    Logs {
        job_id: String,
        /// Keep printing new entries until the job finishes
        #[arg(long, short)]
        follow: bool,
    },
    /// Cancel a queued or processing job
    Cancel { job_id: String },
    /// Print or save the text of a completed job
    Result {
        job_id: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete a finished job and its log
    Delete { job_id: String },
    /// Fail jobs left PROCESSING by a crashed or killed `submit`.
    /// Run only while no `submit` is active on the same database.
    Recover,
    /// Manage provider API keys
    Keys {
        #[command(subcommand)]
        action: KeysCommand,
    },
}

#[derive(Subcommand, Debug)]
enum KeysCommand {
    /// Store a key read from stdin
    Set { provider: String },
    /// Report whether a key is stored
    Check { provider: String },
    /// Remove a stored key
    Delete { provider: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format: LogFormat = cli
        .log_format
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    init_logging(format)?;

    let config = load_cli_config(cli.config.as_deref(), cli.database.as_deref())?;
    let service = OmniOcr::open(&config)?;

    match cli.command {
        Command::Submit {
            file,
            engine,
            owner,
            mime,
            output,
        } => submit(&service, &file, &engine, owner.as_deref(), mime, output.as_deref()).await,
        Command::Jobs { owner, json } => list_jobs(&service, owner.as_deref(), json),
        Command::Logs { job_id, follow } => show_logs(&service, &job_id, follow).await,
        Command::Cancel { job_id } => {
            let job = service.cancel_job(&job_id)?;
            println!("{} {}", job.id, job.status);
            Ok(())
        }
        Command::Result { job_id, output } => {
            let job = service.get_job(&job_id)?;
            match service.download_result(&job_id)? {
                Some(artifact) => write_text(&artifact.text, output.as_deref()),
                None => bail!("result not available: job {} is {}", job.id, job.status),
            }
        }
        Command::Delete { job_id } => {
            service.delete_job(&job_id)?;
            println!("deleted {}", job_id);
            Ok(())
        }
        Command::Recover => {
            let recovered = service.recover_interrupted()?;
            for job in &recovered {
                print_job(job);
            }
            println!("{} interrupted job(s) marked failed", recovered.len());
            Ok(())
        }
        Command::Keys { action } => keys(&service, action),
    }
}

fn load_cli_config(path: Option<&Path>, database: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => load_config(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => match default_config_path() {
            Some(path) => load_config_or_default(path)?,
            None => Config::default(),
        },
    };
    if let Some(database) = database {
        config.database_path = Some(database.to_string_lossy().into_owned());
    }
    Ok(config)
}

async fn submit(
    service: &OmniOcr,
    file: &Path,
    engine: &str,
    owner: Option<&str>,
    mime: Option<String>,
    output: Option<&Path>,
) -> Result<()> {
    let engine: OcrEngine = engine.parse()?;
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut events = service.subscribe();
    let submitted = service.submit(
        Submission::new(bytes, file_name, mime.unwrap_or_default(), engine),
        owner,
    )?;
    let job_id = submitted.job.id.clone();
    eprintln!("job {}", job_id);

    let wait = submitted.handle.wait();
    tokio::pin!(wait);
    let mut cancel_requested = false;

    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome,
            event = events.recv() => {
                if let Ok(event) = event {
                    if event.job.id == job_id {
                        print_log(&event.log);
                    }
                }
            }
            _ = tokio::signal::ctrl_c(), if !cancel_requested => {
                cancel_requested = true;
                match service.cancel_job(&job_id) {
                    Ok(_) => eprintln!("cancelling job {}", job_id),
                    Err(e) => eprintln!("could not cancel: {}", e),
                }
            }
        }
    };
    while let Ok(event) = events.try_recv() {
        if event.job.id == job_id {
            print_log(&event.log);
        }
    }

    match outcome {
        DispatchOutcome::Completed(job) => {
            write_text(job.result.as_deref().unwrap_or_default(), output)
        }
        DispatchOutcome::Failed(job) => bail!(
            "job {} failed: {}",
            job.id,
            job.error.as_deref().unwrap_or("unknown error")
        ),
        DispatchOutcome::Discarded { job_id, .. } => {
            let job = service.get_job(&job_id)?;
            bail!("job {} ended as {}", job.id, job.status)
        }
    }
}

fn list_jobs(service: &OmniOcr, owner: Option<&str>, json: bool) -> Result<()> {
    let jobs = service.list_jobs(owner)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    for job in &jobs {
        print_job(job);
    }
    let counts = service.counts()?;
    println!(
        "{} job(s): {} queued, {} processing, {} completed, {} failed, {} cancelled",
        counts.total(),
        counts.queued,
        counts.processing,
        counts.completed,
        counts.failed,
        counts.cancelled
    );
    Ok(())
}

async fn show_logs(service: &OmniOcr, job_id: &str, follow: bool) -> Result<()> {
    let mut printed = 0;
    loop {
        let snapshot = service.snapshot(job_id)?;
        for log in snapshot.logs.iter().skip(printed) {
            print_log(log);
        }
        printed = snapshot.logs.len();

        if !follow || snapshot.job.status.is_terminal() {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(FOLLOW_INTERVAL) => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

fn keys(service: &OmniOcr, action: KeysCommand) -> Result<()> {
    match action {
        KeysCommand::Set { provider } => {
            if !service.persists_provider_keys() {
                bail!(
                    "set {} to a 64-character hex key to store provider keys",
                    omniocr::secrets::KEY_ENCRYPTION_ENV_VAR
                );
            }
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("reading key from stdin")?;
            service.save_provider_key(&provider, &SecretString::from(input.trim().to_string()))?;
            println!("saved key for {}", provider);
        }
        KeysCommand::Check { provider } => {
            let state = if service.has_provider_key(&provider)? {
                "stored"
            } else {
                "not stored"
            };
            println!("{}: {}", provider, state);
        }
        KeysCommand::Delete { provider } => {
            if service.delete_provider_key(&provider)? {
                println!("removed key for {}", provider);
            } else {
                println!("no key stored for {}", provider);
            }
        }
    }
    Ok(())
}

fn write_text(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn print_job(job: &Job) {
    println!(
        "{}  {:<10}  {:<9}  {}  {}",
        job.id,
        job.status,
        job.engine,
        job.created_at.format("%Y-%m-%d %H:%M:%S"),
        job.file_name
    );
}

fn print_log(log: &LogEntry) {
    eprintln!(
        "[{}] {:<7} {}",
        log.created_at.format("%H:%M:%S"),
        log.level.as_str(),
        log.message
    );
}
