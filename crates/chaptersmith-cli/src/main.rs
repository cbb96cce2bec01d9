//! chaptersmith — split one novel file into an exact chapter sequence.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chaptersmith_core::SegmentConfig;
use chaptersmith_oracle::{
    CachedOracle, GeminiOracle, OracleConfig, RequestGate, ResponseCache, TextOracle,
};
use chaptersmith_segment::{Chapter, ChapterType, ReconciliationLog, SplitRunner};

#[derive(Parser)]
#[command(name = "chaptersmith", about = "Segment a novel file into chapters")]
struct Args {
    /// Text file to segment.
    file: PathBuf,

    /// Expected chapter count. Defaults to the trailing number in the
    /// file name (e.g. `소설 1-340.txt` → 340).
    #[arg(long)]
    expected: Option<usize>,

    /// JSON config file for engine tuning.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the oracle response cache. Caching makes reruns
    /// byte-identical and free.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Write the chapter JSON here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Override the oracle model.
    #[arg(long)]
    model: Option<String>,

    /// Override the requests-per-minute limit.
    #[arg(long)]
    rpm: Option<u32>,
}

#[derive(Serialize)]
struct Report<'a> {
    chapters: &'a [Chapter],
    log: &'a ReconciliationLog,
}

fn expected_from_filename(path: &std::path::Path) -> Option<usize> {
    let stem = path.file_stem()?.to_str()?;
    let number_re = regex::Regex::new(r"\d+").ok()?;
    number_re
        .find_iter(stem)
        .last()
        .and_then(|m| m.as_str().parse().ok())
}

fn type_summary(chapters: &[Chapter]) -> String {
    let count = |t: ChapterType| chapters.iter().filter(|c| c.chapter_type == t).count();
    format!(
        "main {}, side {}, prologue {}, epilogue {}, other {}",
        count(ChapterType::Main),
        count(ChapterType::Side),
        count(ChapterType::Prologue),
        count(ChapterType::Epilogue),
        count(ChapterType::Other)
    )
}

fn write_report(out: Option<&PathBuf>, report: &Report<'_>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match out {
        Some(path) => {
            std::fs::write(path, json)?;
            info!("Report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let expected = match args.expected.or_else(|| expected_from_filename(&args.file)) {
        Some(n) if n > 0 => n,
        _ => {
            anyhow::bail!(
                "no expected chapter count: pass --expected or end the file name with it"
            );
        }
    };

    let config = args
        .config
        .as_deref()
        .map(SegmentConfig::load)
        .unwrap_or_default();

    let mut oracle_config = OracleConfig::default();
    if let Some(model) = args.model {
        oracle_config.model = model;
    }
    if let Some(rpm) = args.rpm {
        oracle_config.rpm = rpm;
    }

    let gate = Arc::new(RequestGate::new(
        oracle_config.rpm,
        oracle_config.max_in_flight,
    )?);
    let live = GeminiOracle::from_env(oracle_config, gate)?;

    let oracle: Arc<dyn TextOracle> = match &args.cache_dir {
        Some(dir) => {
            let cache = Arc::new(ResponseCache::open(dir)?);
            Arc::new(CachedOracle::new(Arc::new(live), cache))
        }
        None => Arc::new(live),
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Cancellation requested");
                cancel.cancel();
            }
        });
    }

    let runner = SplitRunner::new(oracle, config).with_cancellation(cancel);

    info!(
        "Segmenting {} (expected {} chapters)",
        args.file.display(),
        expected
    );

    match runner.run(&args.file, expected, None).await {
        Ok(result) => {
            info!(
                "{} chapters: {}",
                result.chapters.len(),
                type_summary(&result.chapters)
            );
            write_report(
                args.out.as_ref(),
                &Report {
                    chapters: &result.chapters,
                    log: &result.log,
                },
            )?;
            Ok(())
        }
        Err(failure) => {
            error!("{}", failure.error);
            for event in &failure.log.events {
                error!(
                    "  [{}] {} ({} -> {}) {}",
                    event.stage, event.action, event.before_count, event.after_count, event.reason
                );
            }
            if !failure.partial.is_empty() {
                warn!(
                    "Best partial result: {} chapters ({})",
                    failure.partial.len(),
                    type_summary(&failure.partial)
                );
                write_report(
                    args.out.as_ref(),
                    &Report {
                        chapters: &failure.partial,
                        log: &failure.log,
                    },
                )?;
            }
            std::process::exit(1);
        }
    }
}
