use strace_leaks::tracker::Registry;
use strace_leaks::types::ProcessKey;
use strace_leaks::{database, parallel_processor, processor, report};

use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "strace-leaks")]
#[command(
    about = "Report file descriptors still open at the end of an strace log",
    long_about = "Reads output of `strace -f -e trace=open,close,chdir,execve` \
                  and lists every file that was opened and never closed."
)]
struct Args {
    /// Sequential mode (disable parallel processing)
    #[arg(short, long)]
    sequential: bool,

    /// Working directory every traced process starts in
    #[arg(short = 'C', long)]
    cwd: Option<String>,

    /// Also store the report in this DuckDB database
    #[arg(short = 'o', long)]
    database: Option<PathBuf>,

    /// Print line and timing statistics to stderr
    #[arg(long)]
    stats: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Input trace files (standard input when omitted)
    files: Vec<PathBuf>,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let initial_cwd = match args.cwd {
        Some(cwd) => cwd,
        None => std::env::current_dir()
            .context("Failed to read current directory")?
            .to_string_lossy()
            .into_owned(),
    };

    let start = std::time::Instant::now();
    let (registry, stats) = if args.files.is_empty() {
        let mut registry = Registry::new(initial_cwd.as_str());
        let stats = processor::process_reader(
            io::stdin().lock(),
            &ProcessKey::Untraced,
            &mut registry,
            |warning| eprintln!("{warning}"),
        )
        .context("Failed to read trace from standard input")?;
        (registry, stats)
    } else if args.sequential || args.files.len() == 1 {
        let mut registry = Registry::new(initial_cwd.as_str());
        let mut total_stats = processor::ProcessStats::default();

        for file_path in &args.files {
            let (file_registry, stats) =
                processor::process_file(file_path, &initial_cwd, |warning| {
                    eprintln!("{warning}")
                })?;
            registry.merge(file_registry);
            total_stats.accumulate(&stats);
        }
        (registry, total_stats)
    } else {
        tracing::info!(threads = num_cpus::get(), "processing files in parallel");
        parallel_processor::process_files_parallel(args.files, &initial_cwd, !args.no_progress)?
    };
    let elapsed = start.elapsed();

    report::write_report(&registry, &mut io::stdout().lock())?;

    if let Some(path) = &args.database {
        // Delete existing database if it exists
        if path.exists() {
            std::fs::remove_file(path).context("Failed to delete existing database")?;
        }
        let db_path = path
            .to_str()
            .context(format!("Database path is not valid UTF-8: {}", path.display()))?;
        let db = database::Database::init(db_path)?;
        db.write_registry(&registry)?;
        tracing::info!(
            database = %path.display(),
            leaks = db.count_leaks()?,
            "wrote report to database"
        );
    }

    if args.stats {
        eprintln!("\n=== Summary ===");
        eprintln!("Total lines:  {}", stats.total_lines);
        eprintln!("Recognized:   {}", stats.recognized_lines);
        eprintln!("Ignored:      {}", stats.ignored_lines);
        eprintln!("Duplicate fd: {}", stats.duplicate_fds);
        eprintln!("Processes:    {}", registry.len());
        eprintln!("Leaked fds:   {}", registry.leaks().count());
        eprintln!("Time:         {:.2}s", elapsed.as_secs_f64());
        eprintln!(
            "File I/O:     {:.2}s | Parsing: {:.2}s",
            stats.time_reading.as_secs_f64(),
            stats.time_parsing.as_secs_f64()
        );
    }

    Ok(())
}
