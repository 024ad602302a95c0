use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use resume_tailor::models::BackendKind;
use resume_tailor::pipeline::{
    init_default_config, tailored_file_name, Mode, PipelineConfig, RerollRequest,
    TailorOutcome, TailorPipeline, TailorRequest,
};
use resume_tailor::server;

#[derive(Parser, Debug)]
#[command(name = "resume-tailor")]
#[command(
    about = "Tailor a DOCX resume to a job description while keeping its formatting",
    long_about = None
)]
struct Args {
    /// Generate default config + prompt files, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write config/prompt files (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite existing config/prompt files when used with --init-config
    #[arg(long)]
    force: bool,

    /// Input .docx resume
    #[arg(value_name = "DOCX")]
    input: Option<PathBuf>,

    /// Output path (default: <input_stem>_tailored.docx; preview/re-roll JSON goes to stdout)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Job description text file
    #[arg(long, value_name = "TXT", conflicts_with = "job")]
    job_file: Option<PathBuf>,

    /// Job description text
    #[arg(long, value_name = "TEXT")]
    job: Option<String>,

    /// tailor (default), preview or finalize
    #[arg(long, value_name = "MODE")]
    mode: Option<String>,

    /// Reviewed replacements for finalize: JSON object of line index to text, e.g. {"3": "..."}
    #[arg(long, value_name = "JSON")]
    accepted: Option<PathBuf>,

    /// Ask for a fresh rewrite of one line and print it as JSON
    #[arg(long, value_name = "INDEX")]
    reroll: Option<usize>,

    /// Suggestion to move away from when re-rolling
    #[arg(long, value_name = "TEXT", requires = "reroll")]
    previous: Option<String>,

    /// Write the classified line view as JSON (no collaborator call)
    #[arg(long, value_name = "JSON")]
    extract_lines_json: Option<PathBuf>,

    /// Extract + re-patch every line with its own text (no collaborator call)
    #[arg(long)]
    roundtrip_only: bool,

    /// Config file path (default: search for resume-tailor.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Answer collaborator calls from a recorded response file instead of the network
    #[arg(long, value_name = "FILE")]
    replay_file: Option<PathBuf>,

    /// Run the HTTP server
    #[arg(long)]
    serve: bool,

    /// Server bind address (default: [server].bind or 127.0.0.1:8080)
    #[arg(long, value_name = "ADDR", requires = "serve")]
    bind: Option<String>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("resume_tailor=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _ = dotenvy::dotenv();
    init_tracing();

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let workdir = args
        .input
        .as_deref()
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let mut cfg = PipelineConfig::load(&workdir, args.config.clone()).context("build config")?;
    if let Some(f) = args.replay_file.clone() {
        cfg.collaborator.backend = BackendKind::Replay;
        cfg.collaborator.replay_file = Some(f);
    }

    if args.serve {
        let bind = args.bind.clone().unwrap_or_else(|| cfg.bind.clone());
        let pipeline = TailorPipeline::from_config(cfg)?;
        return server::serve(pipeline, &bind).await;
    }

    let input = match args.input.clone() {
        Some(p) => p,
        None => {
            let mut cmd = Args::command();
            cmd.print_help().context("print help")?;
            eprintln!(
                "\n\nUSAGE:\n  resume-tailor <resume.docx> --job-file job.txt\n  resume-tailor --serve\n\nTIPS:\n  - Default config search: resume-tailor.toml (upwards), or set RESUME_TAILOR_CONFIG.\n  - The API key is read from GEMINI_API_KEY (environment or .env).\n"
            );
            return Ok(());
        }
    };
    let document =
        std::fs::read(&input).with_context(|| format!("read input: {}", input.display()))?;
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    let pipeline = TailorPipeline::from_config(cfg)?;

    if let Some(path) = args.extract_lines_json.as_ref() {
        let reports = pipeline.extract_lines(&document)?;
        write_json(Some(path), &reports)?;
        eprintln!("Wrote {} lines: {}", reports.len(), path.display());
        return Ok(());
    }

    let job_description = match (args.job_file.as_ref(), args.job.as_ref()) {
        (Some(p), _) => std::fs::read_to_string(p)
            .with_context(|| format!("read job description: {}", p.display()))?,
        (None, Some(text)) => text.clone(),
        (None, None) => String::new(),
    };

    if let Some(line_index) = args.reroll {
        let outcome = pipeline
            .reroll(RerollRequest {
                document,
                file_name,
                job_description,
                line_index,
                previous_suggestion: args.previous.clone(),
            })
            .await?;
        return write_json(args.output.as_deref(), &outcome);
    }

    let mode = if args.roundtrip_only {
        Mode::Finalize {
            accepted: Default::default(),
        }
    } else {
        let accepted = match args.accepted.as_ref() {
            Some(p) => Some(
                std::fs::read_to_string(p)
                    .with_context(|| format!("read accepted replacements: {}", p.display()))?,
            ),
            None => None,
        };
        Mode::parse(args.mode.as_deref(), accepted.as_deref())?
    };

    let outcome = pipeline
        .run(TailorRequest {
            document,
            file_name: file_name.clone(),
            job_description,
            mode,
        })
        .await?;

    match outcome {
        TailorOutcome::Preview(payload) => write_json(args.output.as_deref(), &payload)?,
        TailorOutcome::Document(doc) => {
            let output = args
                .output
                .clone()
                .unwrap_or_else(|| input.with_file_name(tailored_file_name(file_name.as_deref())));
            std::fs::write(&output, &doc.bytes)
                .with_context(|| format!("write output: {}", output.display()))?;
            if !doc.applied {
                eprintln!(
                    "Warning: the patched document failed validation; the original text was kept."
                );
            }
            eprintln!(
                "Wrote {} ({} of {} lines changed)",
                output.display(),
                doc.lines_changed,
                doc.lines_total
            );
        }
    }
    Ok(())
}

fn write_json<T: serde::Serialize>(path: Option<&Path>, value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize json")?;
    match path {
        Some(p) => std::fs::write(p, text).with_context(|| format!("write json: {}", p.display())),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}
