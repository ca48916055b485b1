//! Execution of user-submitted code fragments.
//!
//! Concatenated fragments are written to a scratch script inside a dedicated
//! working directory and run as a subprocess with a wall-clock timeout. The
//! scratch file is removed on every path. Failure is classified from stderr
//! with a heuristic, since the interpreter exits 0 for some reported errors
//! and user code prints warnings to stderr routinely.

pub mod pysrc;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use tokio::process::Command;
use tokio::time::timeout;
use uuid::Uuid;

/// Outcome of one code run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub id: Uuid,
    pub stdout: String,
    pub stderr: String,
    /// True when stderr matched the error heuristic or the run timed out
    pub failed: bool,
}

/// Subprocess-backed runner for stored code fragments
#[derive(Debug, Clone)]
pub struct CodeRunner {
    python_bin: String,
    work_dir: PathBuf,
    run_timeout: Duration,
}

impl CodeRunner {
    pub fn new<P: AsRef<Path>>(python_bin: &str, work_dir: P, run_timeout: Duration) -> Self {
        Self {
            python_bin: python_bin.to_string(),
            work_dir: work_dir.as_ref().to_path_buf(),
            run_timeout,
        }
    }

    /// Concatenate code fields in caller-specified order
    pub fn concat_code(fragments: &[&str]) -> String {
        let mut code = String::new();
        for fragment in fragments {
            code.push_str("\n\n");
            code.push_str(fragment);
        }
        code
    }

    /// Run a script and classify the result
    pub async fn run(&self, code: &str) -> std::io::Result<RunOutcome> {
        std::fs::create_dir_all(&self.work_dir)?;
        let id = Uuid::new_v4();
        // NamedTempFile removes the script on drop, covering every exit path
        let mut script = tempfile::Builder::new()
            .prefix("run_")
            .suffix(".py")
            .tempfile_in(&self.work_dir)?;
        script.write_all(code.as_bytes())?;
        script.flush()?;

        info!("Run {}: executing {} bytes of code", id, code.len());
        let child = Command::new(&self.python_bin)
            .arg(script.path())
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.run_timeout, child).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Run {}: timed out after {:?}", id, self.run_timeout);
                return Ok(RunOutcome {
                    id,
                    stdout: String::new(),
                    stderr: format!("execution timed out after {:?}", self.run_timeout),
                    failed: true,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let failed = !stderr.is_empty() && is_error(&stderr);
        if failed {
            warn!("Run {}: classified as failed", id);
        }
        Ok(RunOutcome {
            id,
            stdout,
            stderr,
            failed,
        })
    }
}

/// Heuristic classification of interpreter stderr.
///
/// A traceback line or a line naming an Error/Exception counts as failure;
/// lines that are warnings do not, even though they arrive on stderr.
pub fn is_error(stderr: &str) -> bool {
    stderr.lines().any(|line| {
        let line = line.trim();
        if line.contains("Warning") {
            return false;
        }
        line.starts_with("Traceback") || line.contains("Error") || line.contains("Exception")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_is_error_heuristic() {
        assert!(is_error(
            "Traceback (most recent call last):\n  File \"run.py\", line 1\nNameError: name 'x' is not defined"
        ));
        assert!(is_error("SyntaxError: invalid syntax"));
        assert!(is_error("Exception: boom"));
        assert!(!is_error("run.py:1: DeprecationWarning: old API"));
        assert!(!is_error("UserWarning: lr is high\n  warnings.warn(msg)"));
        assert!(!is_error(""));
    }

    #[test]
    fn test_concat_order() {
        let code = CodeRunner::concat_code(&["import os", "print(os.getcwd())"]);
        let import_pos = code.find("import os").unwrap();
        let print_pos = code.find("print").unwrap();
        assert!(import_pos < print_pos);
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let dir = tempdir().unwrap();
        // `echo` stands in for an interpreter: prints its argument (the script
        // path), writes nothing to stderr
        let runner = CodeRunner::new("echo", dir.path(), Duration::from_secs(5));
        let outcome = runner.run("print('hi')").await.unwrap();
        assert!(!outcome.failed);
        assert!(outcome.stdout.contains("run_"));
        assert!(outcome.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_run_cleans_up_script() {
        let dir = tempdir().unwrap();
        let runner = CodeRunner::new("echo", dir.path(), Duration::from_secs(5));
        runner.run("x = 1").await.unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_run_timeout_is_failure() {
        let dir = tempdir().unwrap();
        // bash treats the scratch script as a shell script
        let runner = CodeRunner::new("bash", dir.path(), Duration::from_millis(100));
        let outcome = runner.run("sleep 5").await.unwrap();
        assert!(outcome.failed);
        assert!(outcome.stderr.contains("timed out"));
    }
}
