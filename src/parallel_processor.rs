use crate::processor::{self, ProcessStats};
use crate::tracker::Registry;
use anyhow::{Result, anyhow};
use crossbeam::channel;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::thread;
use std::time::Instant;

type FileResult = Result<(Registry, ProcessStats)>;

/// Analyse trace files on a worker pool, one file per task.
///
/// Each file gets its own registry; the registries are merged in the order
/// the files were given, so the report does not depend on scheduling.
pub fn process_files_parallel(
    files: Vec<PathBuf>,
    initial_cwd: &str,
    show_progress: bool,
) -> Result<(Registry, ProcessStats)> {
    let num_files = files.len();
    let num_threads = num_cpus::get().min(num_files).max(1);
    let (sender, receiver) = channel::unbounded::<(usize, PathBuf)>();
    let (result_sender, result_receiver) = channel::unbounded::<(usize, FileResult)>();

    // Send all files to the channel
    for task in files.into_iter().enumerate() {
        sender.send(task)?;
    }
    drop(sender); // Close the channel

    let progress = if show_progress {
        let bar = ProgressBar::new(num_files as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) | {msg}",
                )?
                .progress_chars("#>-"),
        );
        bar
    } else {
        ProgressBar::hidden()
    };

    let files_processed = Arc::new(AtomicUsize::new(0));
    let total_lines = Arc::new(AtomicUsize::new(0));
    let start_time = Instant::now();

    // Spawn worker threads
    let mut handles = vec![];

    for worker_id in 0..num_threads {
        let receiver = receiver.clone();
        let results = result_sender.clone();
        let files_done = Arc::clone(&files_processed);
        let total = Arc::clone(&total_lines);
        let progress = progress.clone();
        let initial_cwd = initial_cwd.to_string();

        let handle = thread::spawn(move || {
            while let Ok((index, file_path)) = receiver.recv() {
                let file_name = file_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("unknown")
                    .to_string();

                // Suspend the bar so the warning is not overdrawn
                let result = processor::process_file(&file_path, &initial_cwd, |warning| {
                    progress.suspend(|| eprintln!("{warning}"))
                });

                match &result {
                    Ok((_, stats)) => {
                        let current_total = total.fetch_add(stats.total_lines, Ordering::SeqCst)
                            + stats.total_lines;
                        let done = files_done.fetch_add(1, Ordering::SeqCst) + 1;

                        // Calculate throughput
                        let elapsed = start_time.elapsed().as_secs_f64();
                        let lines_per_sec = if elapsed > 0.0 {
                            current_total as f64 / elapsed
                        } else {
                            0.0
                        };

                        progress.set_position(done as u64);
                        progress.set_message(format!(
                            "{:.1}K lines/sec | Last: {}",
                            lines_per_sec / 1000.0,
                            file_name
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(worker = worker_id, file = %file_path.display(), "{:#}", e);
                    }
                }

                if results.send((index, result)).is_err() {
                    break;
                }
            }
        });

        handles.push(handle);
    }
    drop(result_sender);

    let mut slots: Vec<Option<FileResult>> = (0..num_files).map(|_| None).collect();
    for (index, result) in result_receiver.iter() {
        slots[index] = Some(result);
    }

    // Wait for all workers to complete
    for (i, handle) in handles.into_iter().enumerate() {
        if handle.join().is_err() {
            tracing::warn!(worker = i, "worker panicked");
        }
    }

    progress.finish_and_clear();

    let mut registry = Registry::new(initial_cwd);
    let mut stats = ProcessStats::default();
    for (index, slot) in slots.into_iter().enumerate() {
        let (file_registry, file_stats) =
            slot.ok_or_else(|| anyhow!("Trace file #{} was never processed", index + 1))??;
        registry.merge(file_registry);
        stats.accumulate(&file_stats);
    }

    Ok((registry, stats))
}
