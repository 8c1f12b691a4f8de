use crate::parser;
use crate::tracker::Registry;
use crate::types::{DuplicateFd, Event, ProcessKey};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct ProcessStats {
    pub total_lines: usize,
    pub recognized_lines: usize,
    pub ignored_lines: usize,
    pub duplicate_fds: usize,
    pub time_reading: Duration,
    pub time_parsing: Duration,
}

impl ProcessStats {
    pub fn accumulate(&mut self, other: &ProcessStats) {
        self.total_lines += other.total_lines;
        self.recognized_lines += other.recognized_lines;
        self.ignored_lines += other.ignored_lines;
        self.duplicate_fds += other.duplicate_fds;
        self.time_reading += other.time_reading;
        self.time_parsing += other.time_parsing;
    }
}

/// Extract PID from filename like "trace.12345" -> Some("12345")
///
/// The digits are kept as written, the same way `[pid N]` prefixes key
/// processes.
pub fn extract_pid(filename: &str) -> Option<&str> {
    let (_, suffix) = filename.rsplit_once('.')?;
    (!suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit())).then_some(suffix)
}

/// Owner of unprefixed lines in a trace file: the pid in its name, if any
pub fn default_key(file_path: &Path) -> ProcessKey {
    file_path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(extract_pid)
        .map_or(ProcessKey::Untraced, |pid| ProcessKey::Known(pid.to_string()))
}

/// Feed every line of `reader` through the classifier into `registry`.
///
/// Lines without a `[pid N]` prefix belong to `default_pid`. Duplicate fd
/// warnings are handed to `on_warning` as soon as they are detected.
pub fn process_reader<R, F>(
    reader: R,
    default_pid: &ProcessKey,
    registry: &mut Registry,
    mut on_warning: F,
) -> Result<ProcessStats>
where
    R: BufRead,
    F: FnMut(&DuplicateFd),
{
    let mut stats = ProcessStats::default();

    for line_result in reader.lines() {
        let read_start = Instant::now();
        let line = line_result.context("Failed to read trace line")?;
        stats.time_reading += read_start.elapsed();

        stats.total_lines += 1;

        let parse_start = Instant::now();
        let (pid, event) = parser::classify(&line);
        let key = match pid {
            Some(pid) => ProcessKey::Known(pid.to_string()),
            None => default_pid.clone(),
        };

        // Even an ignored line makes its process known
        let process = registry.process_mut(key);
        if event == Event::Unrecognized {
            tracing::trace!(line = %line, "ignoring line");
            stats.ignored_lines += 1;
        } else {
            stats.recognized_lines += 1;
            if let Some(warning) = process.apply(&event) {
                stats.duplicate_fds += 1;
                on_warning(&warning);
            }
        }
        stats.time_parsing += parse_start.elapsed();
    }

    Ok(stats)
}

/// Analyse a single trace file into a fresh registry
pub fn process_file<F>(
    file_path: &Path,
    initial_cwd: &str,
    on_warning: F,
) -> Result<(Registry, ProcessStats)>
where
    F: FnMut(&DuplicateFd),
{
    let file =
        File::open(file_path).context(format!("Failed to open file: {}", file_path.display()))?;
    let reader = BufReader::new(file);

    let mut registry = Registry::new(initial_cwd);
    let stats = process_reader(reader, &default_key(file_path), &mut registry, on_warning)
        .context(format!("Failed to process file: {}", file_path.display()))?;

    tracing::info!(
        file = %file_path.display(),
        lines = stats.total_lines,
        processes = registry.len(),
        "processed trace file"
    );

    Ok((registry, stats))
}
