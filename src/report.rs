//! Plain-text leak report

use crate::tracker::Registry;
use anyhow::Result;
use std::io::Write;

/// Write the process count followed by one `pid<TAB>path` line per handle
/// still open at the end of the trace.
pub fn write_report<W: Write>(registry: &Registry, out: &mut W) -> Result<()> {
    writeln!(out, "# Number of processes: {}", registry.len())?;
    for (pid, _, handle) in registry.leaks() {
        writeln!(out, "{}\t{}", pid, handle.path)?;
    }
    out.flush()?;
    Ok(())
}

pub fn render_report(registry: &Registry) -> Result<String> {
    let mut buf = Vec::new();
    write_report(registry, &mut buf)?;
    Ok(String::from_utf8(buf)?)
}
