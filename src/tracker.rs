use crate::types::{DuplicateFd, Event, OpenHandle, ProcessKey};
use std::collections::HashMap;

/// Flag marking a descriptor the kernel closes on `execve`
pub const CLOSE_ON_EXEC: &str = "O_CLOEXEC";

/// Working directory and open descriptors of one traced process
#[derive(Debug, Clone)]
pub struct ProcessState {
    pub pid: ProcessKey,
    pub cwd: String,
    // Kept in insertion order for reporting; fd tables are small
    handles: Vec<(u64, OpenHandle)>,
}

impl ProcessState {
    pub fn new(pid: ProcessKey, cwd: impl Into<String>) -> Self {
        Self {
            pid,
            cwd: cwd.into(),
            handles: Vec::new(),
        }
    }

    fn position(&self, fd: u64) -> Option<usize> {
        self.handles.iter().position(|(tracked, _)| *tracked == fd)
    }

    /// Record a successful open.
    ///
    /// Relative (or empty) paths are resolved by plain concatenation onto the
    /// current cwd. Re-opening a tracked fd replaces the old handle in place
    /// and reports the anomaly to the caller.
    pub fn on_open(&mut self, path: &str, flags: &str, fd: u64) -> Option<DuplicateFd> {
        let resolved = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}{}", self.cwd, path)
        };
        let handle = OpenHandle {
            path: resolved,
            flags: flags.to_string(),
        };

        match self.position(fd) {
            Some(index) => {
                self.handles[index].1 = handle;
                Some(DuplicateFd {
                    pid: self.pid.clone(),
                    fd,
                    path: path.to_string(),
                })
            }
            None => {
                self.handles.push((fd, handle));
                None
            }
        }
    }

    /// Forget `fd`; closing an untracked fd is a no-op
    pub fn on_close(&mut self, fd: u64) {
        if let Some(index) = self.position(fd) {
            self.handles.remove(index);
        }
    }

    pub fn on_chdir(&mut self, path: &str) {
        self.cwd = path.to_string();
    }

    /// Drop every handle opened with `O_CLOEXEC`
    pub fn on_execve(&mut self) {
        self.handles
            .retain(|(_, handle)| !handle.flags.contains(CLOSE_ON_EXEC));
    }

    /// Apply a classified event, returning a warning for duplicate fds
    pub fn apply(&mut self, event: &Event<'_>) -> Option<DuplicateFd> {
        match *event {
            Event::Open { path, flags, fd } => return self.on_open(path, flags, fd),
            Event::Close { fd } => self.on_close(fd),
            Event::Chdir { path } => self.on_chdir(path),
            Event::Execve => self.on_execve(),
            Event::Unrecognized => {}
        }
        None
    }

    pub fn handle(&self, fd: u64) -> Option<&OpenHandle> {
        self.handles
            .iter()
            .find(|(tracked, _)| *tracked == fd)
            .map(|(_, handle)| handle)
    }

    /// Open handles in the order they were first opened
    pub fn handles(&self) -> impl Iterator<Item = (u64, &OpenHandle)> {
        self.handles.iter().map(|(fd, handle)| (*fd, handle))
    }

    pub fn open_count(&self) -> usize {
        self.handles.len()
    }

    pub fn has_leaks(&self) -> bool {
        !self.handles.is_empty()
    }
}

/// Every process seen during a run, in first-seen order
#[derive(Debug, Clone)]
pub struct Registry {
    initial_cwd: String,
    index: HashMap<ProcessKey, usize>,
    processes: Vec<ProcessState>,
}

impl Registry {
    /// New processes start in `initial_cwd`
    pub fn new(initial_cwd: impl Into<String>) -> Self {
        Self {
            initial_cwd: initial_cwd.into(),
            index: HashMap::new(),
            processes: Vec::new(),
        }
    }

    /// Look up a process, creating it on first sight
    pub fn process_mut(&mut self, pid: ProcessKey) -> &mut ProcessState {
        let index = match self.index.get(&pid) {
            Some(&index) => index,
            None => {
                let index = self.processes.len();
                self.processes
                    .push(ProcessState::new(pid.clone(), self.initial_cwd.clone()));
                self.index.insert(pid, index);
                index
            }
        };
        &mut self.processes[index]
    }

    pub fn get(&self, pid: &ProcessKey) -> Option<&ProcessState> {
        self.index.get(pid).map(|&index| &self.processes[index])
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn processes(&self) -> impl Iterator<Item = &ProcessState> {
        self.processes.iter()
    }

    /// Remaining handles across all processes, in report order
    pub fn leaks(&self) -> impl Iterator<Item = (&ProcessKey, u64, &OpenHandle)> {
        self.processes
            .iter()
            .flat_map(|process| process.handles().map(move |(fd, h)| (&process.pid, fd, h)))
    }

    /// Fold a registry built from a later trace file into this one.
    ///
    /// Known processes keep their position and cwd; the later file's handles
    /// are applied on top, overwriting any fd already tracked.
    pub fn merge(&mut self, other: Registry) {
        for process in other.processes {
            let is_new = self.get(&process.pid).is_none();
            let target = self.process_mut(process.pid.clone());
            if is_new {
                target.cwd = process.cwd;
            }
            for (fd, handle) in process.handles {
                match target.position(fd) {
                    Some(index) => target.handles[index].1 = handle,
                    None => target.handles.push((fd, handle)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;

    fn process() -> ProcessState {
        ProcessState::new(ProcessKey::Known("100".to_string()), "/home/user")
    }

    fn paths(state: &ProcessState) -> Vec<(u64, String)> {
        state
            .handles()
            .map(|(fd, handle)| (fd, handle.path.clone()))
            .collect()
    }

    #[test]
    fn test_open_absolute_path() {
        let mut state = process();
        assert_eq!(state.on_open("/tmp/x", "O_RDONLY", 3), None);

        let handle = state.handle(3).expect("fd 3 should be tracked");
        assert_eq!(handle.path, "/tmp/x");
        assert_eq!(handle.flags, "O_RDONLY");
    }

    #[test]
    fn test_open_relative_path_is_concatenated() {
        let mut state = process();
        state.on_chdir("/a/b");
        state.on_open("c.txt", "O_RDONLY", 4);
        state.on_open("", "O_RDONLY", 5);

        assert_eq!(state.handle(4).unwrap().path, "/a/bc.txt");
        assert_eq!(state.handle(5).unwrap().path, "/a/b");
    }

    #[test]
    fn test_chdir_then_open_concatenates_without_separator() {
        let mut state = process();
        state.on_chdir("/var");
        state.on_open("log", "O_WRONLY", 4);

        assert_eq!(state.handle(4).unwrap().path, "/varlog");
    }

    #[test]
    fn test_open_then_close_restores_handles() {
        let mut state = process();
        state.on_open("/etc/passwd", "O_RDONLY", 3);
        let before = paths(&state);

        state.on_open("/tmp/y", "O_RDONLY", 4);
        state.on_close(4);

        assert_eq!(paths(&state), before);
    }

    #[test]
    fn test_close_untracked_fd_is_noop() {
        let mut state = process();
        state.on_open("/tmp/x", "O_RDONLY", 3);
        state.on_close(42);

        assert_eq!(state.open_count(), 1);
    }

    #[test]
    fn test_duplicate_open_warns_and_overwrites() {
        let mut state = process();
        assert_eq!(state.on_open("/tmp/first", "O_RDONLY", 3), None);
        state.on_open("/tmp/other", "O_RDONLY", 4);

        let warning = state
            .on_open("second", "O_WRONLY", 3)
            .expect("duplicate fd should warn");
        assert_eq!(warning.fd, 3);
        assert_eq!(warning.path, "second");
        assert_eq!(
            warning.to_string(),
            "warning: pid 100 fd 3 already tracked (now: second)"
        );

        // Overwritten in place, original position kept
        assert_eq!(
            paths(&state),
            vec![
                (3, "/home/usersecond".to_string()),
                (4, "/tmp/other".to_string())
            ]
        );
        assert_eq!(state.handle(3).unwrap().flags, "O_WRONLY");
    }

    #[test]
    fn test_execve_closes_only_cloexec() {
        let mut state = process();
        state.on_open("/a", "O_RDONLY|O_CLOEXEC", 3);
        state.on_open("/b", "O_RDONLY", 4);
        state.on_open("/c", "O_WRONLY|O_CREAT|O_CLOEXEC", 5);
        state.on_open("/d", "O_RDWR", 6);

        state.on_execve();

        assert_eq!(
            paths(&state),
            vec![(4, "/b".to_string()), (6, "/d".to_string())]
        );
        assert_eq!(state.handle(4).unwrap().flags, "O_RDONLY");
    }

    #[test]
    fn test_unrecognized_event_leaves_state_unchanged() {
        let mut state = process();
        state.on_open("/tmp/x", "O_RDONLY", 3);
        let before = paths(&state);

        for line in ["read(3, \"abc\", 3) = 3", "garbage", "close(3) = -1 EBADF"] {
            assert_eq!(state.apply(&parse_line(line)), None);
        }

        assert_eq!(paths(&state), before);
        assert_eq!(state.cwd, "/home/user");
    }

    #[test]
    fn test_registry_creates_processes_lazily_in_order() {
        let mut registry = Registry::new("/");
        registry.process_mut(ProcessKey::Known("2".to_string()));
        registry.process_mut(ProcessKey::Untraced);
        registry.process_mut(ProcessKey::Known("2".to_string()));

        assert_eq!(registry.len(), 2);
        let order: Vec<String> = registry.processes().map(|p| p.pid.to_string()).collect();
        assert_eq!(order, vec!["2", "None"]);
        assert_eq!(registry.get(&ProcessKey::Untraced).unwrap().cwd, "/");
    }

    #[test]
    fn test_registry_merge_keeps_first_seen_order() {
        let mut first = Registry::new("/");
        first
            .process_mut(ProcessKey::Known("1".to_string()))
            .on_open("/a", "O_RDONLY", 3);
        first.process_mut(ProcessKey::Known("2".to_string()));

        let mut second = Registry::new("/");
        second
            .process_mut(ProcessKey::Known("3".to_string()))
            .on_open("/c", "O_RDONLY", 3);
        let one = second.process_mut(ProcessKey::Known("1".to_string()));
        one.on_open("/b", "O_RDONLY", 3);
        one.on_open("/d", "O_RDONLY", 4);

        first.merge(second);

        assert_eq!(first.len(), 3);
        let leaks: Vec<(String, u64, String)> = first
            .leaks()
            .map(|(pid, fd, h)| (pid.to_string(), fd, h.path.clone()))
            .collect();
        assert_eq!(
            leaks,
            vec![
                ("1".to_string(), 3, "/b".to_string()),
                ("1".to_string(), 4, "/d".to_string()),
                ("3".to_string(), 3, "/c".to_string()),
            ]
        );
    }
}
