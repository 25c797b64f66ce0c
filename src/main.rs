//! Command-line front-end for the detection service.
//!
//! Collects one input (a media file or a code snippet), submits it to the
//! matching detection endpoint and prints the verdict. Configuration comes
//! from flags, `DETECTA_*` environment variables or a `.env` file.

use std::{path::PathBuf, process::ExitCode, time::Duration};

use ai_detecta::{
    ClientConfig, CodePayload, DetectionClient, DetectionKind, LogFormat, MediaUpload, Payload,
    Submission, SubmissionState, get_subscriber, init_subscriber,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tokio::io::AsyncReadExt;

#[derive(Debug, Parser)]
#[command(name = "ai-detecta", version, about = "Detect AI-generated audio, video, images and code")]
struct Cli {
    /// Base address of the detection API
    #[arg(long, env = "DETECTA_API_URL", global = true)]
    api_url: Option<String>,

    /// Request timeout in seconds (waits indefinitely when unset)
    #[arg(long, env = "DETECTA_TIMEOUT_SECS", global = true)]
    timeout: Option<u64>,

    /// Print the raw JSON response instead of the rendered verdict
    #[arg(long, global = true)]
    json: bool,

    /// Log output format: pretty or json
    #[arg(long, env = "DETECTA_LOG_FORMAT", default_value = "pretty", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify an audio file
    Audio { file: PathBuf },
    /// Classify a video file
    Video { file: PathBuf },
    /// Classify an image file
    Image { file: PathBuf },
    /// Classify source code read from a file, --text or stdin
    Code {
        file: Option<PathBuf>,
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
    },
}

impl Command {
    fn kind(&self) -> DetectionKind {
        match self {
            Command::Audio { .. } => DetectionKind::Audio,
            Command::Video { .. } => DetectionKind::Video,
            Command::Image { .. } => DetectionKind::Image,
            Command::Code { .. } => DetectionKind::Code,
        }
    }

    async fn payload(self) -> anyhow::Result<Payload> {
        match self {
            Command::Audio { file } | Command::Video { file } | Command::Image { file } => {
                let upload = MediaUpload::from_path(&file)
                    .await
                    .with_context(|| format!("failed to read {}", file.display()))?;
                Ok(upload.into())
            }
            Command::Code { text: Some(text), .. } => Ok(CodePayload::new(text).into()),
            Command::Code { file: Some(file), .. } => {
                let code = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("failed to read {}", file.display()))?;
                Ok(CodePayload::new(code).into())
            }
            Command::Code { .. } => {
                let mut code = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut code)
                    .await
                    .context("failed to read code from stdin")?;
                Ok(CodePayload::new(code).into())
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv().ok();
    let cli = Cli::parse();

    let subscriber = get_subscriber(
        "ai-detecta".to_string(),
        "warn".to_string(),
        cli.log_format,
        std::io::stderr,
    );
    init_subscriber(subscriber)?;

    let mut config = match cli.api_url.as_deref() {
        Some(url) => ClientConfig::with_api_url(url)?,
        None => ClientConfig::from_env()?,
    };
    if let Some(secs) = cli.timeout.filter(|secs| *secs > 0) {
        config = config.timeout(Some(Duration::from_secs(secs)));
    }
    let client = DetectionClient::new(config)?;

    let kind = cli.command.kind();
    let mut submission = Submission::new(kind);
    let payload = cli.command.payload().await?;

    if let Err(e) = submission.select(payload) {
        eprintln!("{e}");
        return Ok(ExitCode::from(2));
    }

    tokio::select! {
        res = submission.run(&client) => {
            if let Err(e) = res {
                eprintln!("{e}");
                return Ok(ExitCode::from(2));
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, cancelling detection");
        }
    }
    // No-op unless the select above was interrupted.
    submission.cancel();

    Ok(render(&submission, cli.json))
}

fn render(submission: &Submission, json: bool) -> ExitCode {
    match submission.state() {
        SubmissionState::Succeeded(detection) => {
            if json {
                println!("{:#}", detection.response);
                return ExitCode::SUCCESS;
            }
            println!("{}", detection.result);
            match detection.result.is_ai_generated() {
                Some(true) => println!("Verdict: AI-generated"),
                Some(false) => println!("Verdict: Human-made"),
                None => {}
            }
            if let Some(details) = detection.result.details() {
                println!("Details: {details:#}");
            }
            ExitCode::SUCCESS
        }
        SubmissionState::Failed { message, error, .. } => {
            tracing::debug!(error = ?error, "detection failed");
            eprintln!("{message}");
            ExitCode::FAILURE
        }
        other => {
            eprintln!("Detection was cancelled.");
            tracing::debug!(state = other.name(), "no detection outcome");
            ExitCode::from(130)
        }
    }
}
