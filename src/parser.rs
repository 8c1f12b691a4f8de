use crate::types::Event;

/// Split a `[pid N] ` prefix from a line: "[pid 4242] close(3) = 0"
///
/// Exactly one space must follow `pid`; a padded prefix is left in place
/// and the line stays unrecognized. Returns the pid digits (if any) and the
/// remainder of the line.
pub fn split_pid(line: &str) -> (Option<&str>, &str) {
    let Some(rest) = line.strip_prefix("[pid ") else {
        return (None, line);
    };
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits_end == 0 {
        return (None, line);
    }

    match rest[digits_end..].strip_prefix("] ") {
        Some(remainder) => (Some(&rest[..digits_end]), remainder),
        None => (None, line),
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse the tail after a call's closing parenthesis: " = 0"
///
/// Only a bare non-negative return value is accepted, so failed calls
/// ("= -1 ENOENT (No such file or directory)") never match.
fn parse_return(tail: &str) -> Option<&str> {
    return_value(tail.trim_start().strip_prefix('=')?)
}

fn return_value(after_equals: &str) -> Option<&str> {
    let value = after_equals.trim_start();
    is_digits(value).then_some(value)
}

/// Parse an open line: open("path", FLAGS[, mode]) = fd
pub fn parse_open(line: &str) -> Option<Event<'_>> {
    let rest = line.strip_prefix("open(\"")?;
    let (path, rest) = rest.split_once('"')?;
    let rest = rest.strip_prefix(", ")?;

    // The return value sits after the last '='
    let (call, ret) = rest.rsplit_once('=')?;
    let fd = return_value(ret)?.parse::<u64>().ok()?;
    let args = call.trim_end().strip_suffix(')')?;

    // Flags run up to the first comma; trailing mode arguments are ignored
    let (flags, extra) = args.split_once(',').unwrap_or((args, ""));
    if flags.is_empty() || extra.contains(')') {
        return None;
    }

    Some(Event::Open { path, flags, fd })
}

/// Parse a close line: close(fd) = ret
pub fn parse_close(line: &str) -> Option<Event<'_>> {
    let rest = line.strip_prefix("close(")?;
    let (fd, tail) = rest.split_once(')')?;
    if !is_digits(fd) {
        return None;
    }
    parse_return(tail)?;

    Some(Event::Close {
        fd: fd.parse().ok()?,
    })
}

/// Parse a chdir line: chdir("path") = ret
pub fn parse_chdir(line: &str) -> Option<Event<'_>> {
    let rest = line.strip_prefix("chdir(\"")?;
    let (path, tail) = rest.split_once('"')?;
    parse_return(tail.strip_prefix(')')?)?;

    Some(Event::Chdir { path })
}

/// Any execve line counts, whatever its arguments or result
pub fn parse_execve(line: &str) -> Option<Event<'_>> {
    line.starts_with("execve(").then_some(Event::Execve)
}

/// Parse a pid-stripped line by trying each call shape in order
pub fn parse_line(line: &str) -> Event<'_> {
    parse_open(line)
        .or_else(|| parse_close(line))
        .or_else(|| parse_chdir(line))
        .or_else(|| parse_execve(line))
        .unwrap_or(Event::Unrecognized)
}

/// Classify a raw trace line into its owning pid and event
pub fn classify(line: &str) -> (Option<&str>, Event<'_>) {
    let (pid, rest) = split_pid(line);
    (pid, parse_line(rest))
}
