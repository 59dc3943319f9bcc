use crate::jobs::JobTable;
use crate::mask::SignalCell;
use std::collections::HashMap;
use std::env as stdenv;
use std::ffi::CString;

/// Mutable, user-level view of the shell state passed to every command.
///
/// The environment contains:
/// - `vars`: the variables handed to launched programs (e.g., PATH, HOME).
/// - `jobs`: the job table, shared with the signal handlers.
/// - `should_exit`: set by `quit` to end the read-eval loop.
pub struct Environment<'j> {
    /// Key-value store of environment variables.
    pub vars: HashMap<String, String>,
    /// Job table guarded against the signal handlers.
    pub jobs: &'j SignalCell<JobTable>,
    /// When set to true, the interactive loop stops after the current line.
    pub should_exit: bool,
}

impl<'j> Environment<'j> {
    /// Capture the current process environment for a shell using `jobs`.
    pub fn new(jobs: &'j SignalCell<JobTable>) -> Self {
        Self {
            vars: stdenv::vars().collect(),
            jobs,
            should_exit: false,
        }
    }

    /// Get the value of an environment variable.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    /// Set or override an environment variable.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// `KEY=VALUE` strings for `execve`; entries containing NUL are skipped.
    pub fn envp(&self) -> Vec<CString> {
        self.vars
            .iter()
            .filter_map(|(k, v)| CString::new(format!("{k}={v}")).ok())
            .collect()
    }
}
