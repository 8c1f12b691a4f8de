use std::fmt;

/// Owner of a trace line: the pid from a `[pid N]` prefix, or the untraced
/// initial process when the line carries none.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProcessKey {
    Known(String),
    Untraced,
}

impl fmt::Display for ProcessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessKey::Known(pid) => f.write_str(pid),
            ProcessKey::Untraced => f.write_str("None"),
        }
    }
}

/// A recognized strace call, borrowed from the line it was parsed from
#[derive(Debug, Clone, PartialEq)]
pub enum Event<'a> {
    Open { path: &'a str, flags: &'a str, fd: u64 },
    Close { fd: u64 },
    Chdir { path: &'a str },
    Execve,
    Unrecognized,
}

/// A file descriptor that is still open
#[derive(Debug, Clone, PartialEq)]
pub struct OpenHandle {
    pub path: String,
    pub flags: String,
}

/// Raised when `open` returns an fd the process already holds
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateFd {
    pub pid: ProcessKey,
    pub fd: u64,
    pub path: String,
}

impl fmt::Display for DuplicateFd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "warning: pid {} fd {} already tracked (now: {})",
            self.pid, self.fd, self.path
        )
    }
}
