//! Pid-file written by the remote login shell

use std::fmt;

/// Path (inside the container) of the file holding a login shell's pid.
///
/// Named after the invoking process so concurrent logins from one host never
/// share a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
    path: String,
}

impl PidFile {
    pub fn for_process(dir: &str, pid: u32) -> Self {
        Self {
            path: format!("{}/boxsh-exec-{}", dir.trim_end_matches('/'), pid),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Record `$$` then replace the bootstrap shell with `shell`, so the
    /// recorded pid is the session's process-group leader
    pub fn bootstrap_script(&self, shell: &str) -> String {
        format!("echo $$ > {}; exec {}", quote(&self.path), quote(shell))
    }

    /// Hang up the whole recorded process group and remove the file
    pub fn cleanup_script(&self) -> String {
        let path = quote(&self.path);
        format!(
            "if [ -f {path} ]; then kill -HUP -$(cat {path}); rm -f {path}; fi",
            path = path
        )
    }
}

impl fmt::Display for PidFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Single-quote `s` for a POSIX shell
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
