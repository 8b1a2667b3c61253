use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use conflux::core::config;
use conflux::recrawler::{FetchMode, RecrawlOptions, Recrawler};

struct Args {
    seeds: PathBuf,
    mode: FetchMode,
    resume: bool,
    two_pass: bool,
}

fn usage() -> ! {
    eprintln!(
        "usage: conflux-recrawl --seeds <file> [--mode status|head|full] [--resume] [--two-pass]"
    );
    std::process::exit(2);
}

fn parse_args() -> Args {
    let mut seeds: Option<PathBuf> = None;
    let mut mode = FetchMode::StatusOnly;
    let mut resume = false;
    let mut two_pass = false;

    let mut args = std::env::args().skip(1).peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--seeds" => match args.next() {
                Some(path) => seeds = Some(PathBuf::from(path)),
                None => usage(),
            },
            "--mode" => {
                mode = match args.next().as_deref() {
                    Some("status") => FetchMode::StatusOnly,
                    Some("head") => FetchMode::HeadOnly,
                    Some("full") => FetchMode::Full,
                    _ => usage(),
                };
            }
            "--resume" => resume = true,
            "--two-pass" => two_pass = true,
            other if !other.starts_with("--") && seeds.is_none() => {
                seeds = Some(PathBuf::from(other));
            }
            _ => usage(),
        }
    }

    match seeds {
        Some(seeds) => Args {
            seeds,
            mode,
            resume,
            two_pass,
        },
        None => usage(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = parse_args();
    let cfg = config::load_config();
    let data_dir = cfg.fts.resolve_data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let recrawler = Recrawler::new(&cfg.recrawler, &data_dir)?;
    let seeds = recrawler.load_seeds(&args.seeds)?;
    info!("loaded {} seeds from {}", seeds.len(), args.seeds.display());

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; draining pipeline");
            ctrl_c_cancel.cancel();
        }
    });

    let report = recrawler
        .run(
            seeds,
            RecrawlOptions {
                mode: args.mode,
                resume: args.resume,
                two_pass: args.two_pass,
            },
            &cancel,
        )
        .await?;

    println!(
        "seeds={} fetched={} failed={} skipped_dead={} skipped_resumed={} dead_domains={} results_written={}",
        report.total_seeds,
        report.succeeded,
        report.failed,
        report.skipped_dead,
        report.skipped_resumed,
        report.dead_domains,
        report.results_written,
    );
    Ok(())
}
