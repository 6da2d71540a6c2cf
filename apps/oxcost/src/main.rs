use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use log::{debug, info};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use oxcost_engine::{CostConfig, CostEngine, CostEvent, EngineOptions, Language};

#[derive(Debug, Parser)]
#[command(name = "oxcost")]
#[command(about = "Measure what each import adds to a production bundle", long_about = None)]
struct Cli {
    /// Source file to analyze (.js, .jsx, .ts, .tsx, .vue, .svelte)
    file: PathBuf,

    /// Bundle imports in parallel
    #[arg(long)]
    concurrent: bool,

    /// Deadline for bundling a single import, in milliseconds
    #[arg(long)]
    max_call_time: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::init();

    // stdio is blocked by LineWriter, use a BufWriter to reduce syscalls.
    // See https://github.com/rust-lang/rust/issues/60673
    let mut stdout = BufWriter::new(std::io::stdout());

    let cli = Cli::parse();
    debug!("Parsed CLI arguments: {:?}", cli);

    let file = cli
        .file
        .canonicalize()
        .with_context(|| format!("Cannot open {}", cli.file.display()))?;
    let source = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let language = file
        .extension()
        .and_then(|e| e.to_str())
        .map(Language::from_extension)
        .unwrap_or(Language::Unknown);
    info!("Analyzing {} as {:?}", file.display(), language);

    let config = CostConfig {
        concurrent: cli.concurrent,
        max_call_time: cli.max_call_time.map(Duration::from_millis),
    };

    let start = Instant::now();
    let engine = CostEngine::new(EngineOptions::default());
    let emitter = engine.import_cost(&file, source, language, config);

    let mut total = 0usize;
    for event in emitter.events() {
        match event {
            CostEvent::Start(entries) => {
                writeln!(
                    stdout,
                    "{} Measuring {} import(s)...",
                    "●".bright_blue(),
                    entries.len().to_string().cyan()
                )?;
                stdout.flush()?;
            }
            CostEvent::Calculated(entry) => {
                match &entry.error {
                    Some(e) => writeln!(
                        stdout,
                        "  {} {} (line {}): {}",
                        "✗".red(),
                        entry.name.bold(),
                        entry.line,
                        e
                    )?,
                    None => writeln!(
                        stdout,
                        "  {} {} (line {}): {} ({} gzipped)",
                        "✓".green(),
                        entry.name.bold(),
                        entry.line,
                        format_bytes(entry.size).cyan(),
                        format_bytes(entry.gzip).cyan()
                    )?,
                }
                stdout.flush()?;
            }
            CostEvent::Done(entries) => total = entries.len(),
            CostEvent::Error(e) => {
                writeln!(stdout, "{} {}", "✗".red(), e)?;
                stdout.flush()?;
                std::process::exit(1);
            }
        }
    }

    writeln!(
        stdout,
        "\n{} Finished in {}ms on {} import(s).",
        "●".bright_blue(),
        start.elapsed().as_millis().to_string().cyan(),
        total.to_string().cyan()
    )?;
    stdout.flush()?;

    Ok(())
}

fn format_bytes(n: u64) -> String {
    if n >= 1024 {
        format!("{:.1}KB", n as f64 / 1024.0)
    } else {
        format!("{n}B")
    }
}
