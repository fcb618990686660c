use std::io;
use std::path::PathBuf;
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::process::CommandExt;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tutor_protocol::ExecOutcome;
use tutor_protocol::ExecResult;
use tutor_protocol::Problem;
use tutor_protocol::RunMode;

use crate::driver;
use crate::error::ExecutorError;
use crate::marker;
use crate::marker::MARKER_ENV_VAR;

pub const MAX_CODE_BYTES: usize = 50 * 1024;
pub const MAX_PROBLEM_ID_CHARS: usize = 100;

const DEFAULT_CPU_TIME_LIMIT_SECS: u64 = 10;
const DEFAULT_ADDRESS_SPACE_LIMIT_BYTES: u64 = 512 * 1024 * 1024;
const TIMEOUT_GRACE: Duration = Duration::from_secs(2);
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Runs learner-submitted code against a problem's test cases inside a
/// throwaway workspace. Stateless aside from the root directory new
/// per-run workspaces are created under; safe to share across tasks.
pub struct Executor {
    workspace_root: PathBuf,
    python_bin: String,
    cpu_time_limit_secs: u64,
    address_space_limit_bytes: u64,
}

impl Executor {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            python_bin: "python3".to_string(),
            cpu_time_limit_secs: DEFAULT_CPU_TIME_LIMIT_SECS,
            address_space_limit_bytes: DEFAULT_ADDRESS_SPACE_LIMIT_BYTES,
        }
    }

    /// Overrides the interpreter binary, primarily for tests that fake one.
    pub fn with_python_bin(mut self, python_bin: impl Into<String>) -> Self {
        self.python_bin = python_bin.into();
        self
    }

    /// Overrides the sandbox's CPU time and address space caps, mirroring
    /// `TutorRegistry::with_limits`. `memory_mb` is converted to bytes here
    /// so callers can pass `Config`'s values directly.
    pub fn with_limits(mut self, cpu_seconds: u64, memory_mb: u64) -> Self {
        self.cpu_time_limit_secs = cpu_seconds;
        self.address_space_limit_bytes = memory_mb * 1024 * 1024;
        self
    }

    pub async fn run(
        &self,
        code: &str,
        problem: &Problem,
        _mode: RunMode,
    ) -> Result<ExecResult, ExecutorError> {
        if code.len() > MAX_CODE_BYTES {
            return Err(ExecutorError::CodeTooLarge {
                len: code.len(),
                max: MAX_CODE_BYTES,
            });
        }
        if problem.id.len() > MAX_PROBLEM_ID_CHARS {
            return Err(ExecutorError::ProblemIdTooLong {
                len: problem.id.len(),
                max: MAX_PROBLEM_ID_CHARS,
            });
        }

        let workspace = tempfile::Builder::new()
            .prefix("tutor-run-")
            .tempdir_in(&self.workspace_root)
            .map_err(ExecutorError::WorkspaceSetup)?;

        let driver_script = match driver::render(&problem.entry_point, &problem.test_cases) {
            Ok(script) => script,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize test cases for driver");
                return Ok(all_failed(problem, "SpawnFailed"));
            }
        };

        if let Err(e) = write_workspace_files(workspace.path(), code, &driver_script) {
            tracing::warn!(error = %e, "failed to write run workspace");
            return Ok(all_failed(problem, "SpawnFailed"));
        }

        let marker = marker::generate();
        let outcome = self.spawn_and_wait(workspace.path(), &marker).await;

        Ok(match outcome {
            Ok((stdout, stderr)) => parse_results(&stdout, &stderr, &marker, problem),
            Err(category) => all_failed(problem, category),
        })
    }

    async fn spawn_and_wait(
        &self,
        workspace: &std::path::Path,
        marker: &str,
    ) -> Result<(String, String), &'static str> {
        let mut cmd = Command::new(&self.python_bin);
        cmd.arg(driver::DRIVER_FILENAME)
            .current_dir(workspace)
            .env_clear()
            .env(MARKER_ENV_VAR, marker)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        for (key, default) in sanitized_env_defaults() {
            cmd.env(key, default);
        }

        #[cfg(unix)]
        {
            let cpu_time_limit_secs = self.cpu_time_limit_secs;
            let address_space_limit_bytes = self.address_space_limit_bytes;
            unsafe {
                cmd.pre_exec(move || pre_exec_sandbox(cpu_time_limit_secs, address_space_limit_bytes));
            }
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(error = %e, "failed to spawn sandboxed interpreter");
                return Err("SpawnFailed");
            }
        };

        let mut stdout_pipe = child.stdout.take().expect("stdout piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr piped");
        let stdout_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stdout_pipe.read_to_string(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr_pipe.read_to_string(&mut buf).await;
            buf
        });

        let deadline = Duration::from_secs(self.cpu_time_limit_secs) + TIMEOUT_GRACE;
        let wait_result = tokio::time::timeout(deadline, child.wait()).await;

        let timed_out = wait_result.is_err();
        if timed_out {
            kill_process_group(&child).await;
            let _ = child.wait().await;
        }

        stdout_task.abort();
        stderr_task.abort();
        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if timed_out {
            return Err("TimeLimitExceeded");
        }

        let has_envelope =
            marker::extract_payload(&stdout, marker).is_some() || marker::extract_payload(&stderr, marker).is_some();

        match wait_result {
            Ok(Ok(status)) if !status.success() && !has_envelope => {
                tracing::debug!(?status, stderr = %sanitize_stderr(&stderr), "interpreter exited without a result");
                Err("RuntimeError")
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "failed to wait on sandboxed interpreter");
                Err("SpawnFailed")
            }
            _ => Ok((stdout, stderr)),
        }
    }
}

fn write_workspace_files(dir: &std::path::Path, code: &str, driver_script: &str) -> io::Result<()> {
    std::fs::write(dir.join(driver::SOLUTION_FILENAME), code)?;
    std::fs::write(dir.join(driver::DRIVER_FILENAME), driver_script)?;
    Ok(())
}

fn sanitized_env_defaults() -> Vec<(&'static str, String)> {
    let mut env = Vec::new();
    if let Ok(path) = std::env::var("PATH") {
        env.push(("PATH", path));
    }
    if let Ok(home) = std::env::var("HOME") {
        env.push(("HOME", home));
    }
    env.push(("LANG", std::env::var("LANG").unwrap_or_else(|_| "C.UTF-8".to_string())));
    env
}

/// Runs in the forked child before exec: detach into a fresh process group
/// and apply the resource caps that the platform supports. macOS silently
/// ignores `RLIMIT_AS`; the wall-clock timeout in `spawn_and_wait` is the
/// backstop for that case.
#[cfg(unix)]
fn pre_exec_sandbox(cpu_time_limit_secs: u64, address_space_limit_bytes: u64) -> io::Result<()> {
    unsafe {
        if libc::setsid() == -1 {
            return Err(io::Error::last_os_error());
        }

        let cpu_limit = libc::rlimit {
            rlim_cur: cpu_time_limit_secs,
            rlim_max: cpu_time_limit_secs,
        };
        libc::setrlimit(libc::RLIMIT_CPU, &cpu_limit);

        let as_limit = libc::rlimit {
            rlim_cur: address_space_limit_bytes,
            rlim_max: address_space_limit_bytes,
        };
        libc::setrlimit(libc::RLIMIT_AS, &as_limit);

        let core_limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        libc::setrlimit(libc::RLIMIT_CORE, &core_limit);
    }
    Ok(())
}

#[cfg(unix)]
async fn kill_process_group(child: &tokio::process::Child) {
    let Some(pid) = child.id() else { return };
    unsafe {
        libc::kill(-(pid as i32), libc::SIGTERM);
    }
    tokio::time::sleep(KILL_GRACE).await;
    unsafe {
        libc::kill(-(pid as i32), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
async fn kill_process_group(child: &tokio::process::Child) {
    let _ = child.id();
}

/// Strips absolute filesystem paths out of interpreter stderr so a learner
/// never sees the host's directory layout, and keeps only the last line of
/// the traceback (the actual exception message).
fn sanitize_stderr(stderr: &str) -> String {
    let last_line = stderr.lines().last().unwrap_or_default();
    strip_paths(last_line)
}

fn strip_paths(s: &str) -> String {
    s.split_whitespace()
        .map(|tok| {
            if tok.starts_with('/') || tok.starts_with("C:\\") {
                "<path>"
            } else {
                tok
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Scans stdout first, then stderr, for the marker envelope. The driver
/// always writes its result to stdout; stderr is only checked as a fallback
/// for the rare case where a crash mid-flush leaves the envelope there
/// instead (e.g. an interpreter-level write to stderr that happens to
/// interleave with a buffered stdout that never gets flushed).
fn parse_results(stdout: &str, stderr: &str, marker_value: &str, problem: &Problem) -> ExecResult {
    let payload = marker::extract_payload(stdout, marker_value).or_else(|| marker::extract_payload(stderr, marker_value));
    let Some(payload) = payload else {
        tracing::debug!("marker envelope missing from interpreter output");
        return all_failed(problem, "RuntimeError");
    };

    #[derive(serde::Deserialize)]
    struct Payload {
        results: Vec<ExecOutcome>,
    }

    match serde_json::from_str::<Payload>(payload) {
        Ok(parsed) => ExecResult::from_outcomes(parsed.results),
        Err(e) => {
            tracing::warn!(error = %e, "malformed result payload inside marker envelope");
            all_failed(problem, "RuntimeError")
        }
    }
}

fn all_failed(problem: &Problem, category: &str) -> ExecResult {
    let results = problem
        .test_cases
        .iter()
        .enumerate()
        .map(|(i, tc)| ExecOutcome {
            test_num: i,
            input: tc.input.clone(),
            expected: tc.expected.clone(),
            actual: None,
            passed: false,
            runtime_ms: 0,
            stdout: String::new(),
            error: Some(category.to_string()),
        })
        .collect();
    ExecResult::from_outcomes(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_protocol::TestCase;

    fn problem(entry_point: &str, cases: Vec<(serde_json::Value, serde_json::Value)>) -> Problem {
        Problem {
            id: "sum-two".to_string(),
            title: "Sum Two".to_string(),
            difficulty: "easy".to_string(),
            tags: vec![],
            entry_point: entry_point.to_string(),
            test_cases: cases
                .into_iter()
                .map(|(input, expected)| TestCase { input, expected })
                .collect(),
            starter_code: None,
        }
    }

    #[tokio::test]
    async fn rejects_oversized_code_before_touching_disk() {
        let executor = Executor::new(std::env::temp_dir());
        let huge = "x".repeat(MAX_CODE_BYTES + 1);
        let p = problem("f", vec![(serde_json::json!(1), serde_json::json!(1))]);
        let err = executor.run(&huge, &p, RunMode::Run).await.unwrap_err();
        assert!(matches!(err, ExecutorError::CodeTooLarge { .. }));
    }

    #[test]
    fn all_failed_produces_one_outcome_per_test_case() {
        let p = problem(
            "f",
            vec![
                (serde_json::json!(1), serde_json::json!(1)),
                (serde_json::json!(2), serde_json::json!(2)),
            ],
        );
        let result = all_failed(&p, "SpawnFailed");
        assert_eq!(result.results.len(), 2);
        assert!(result.results.iter().all(|r| !r.passed && r.actual.is_none()));
        assert_eq!(result.failed, 2);
    }

    #[test]
    fn strip_paths_redacts_absolute_paths_only() {
        let sanitized = strip_paths("File \"/home/learner/solution.py\", line 3, in f");
        assert!(!sanitized.contains("/home"));
        assert!(sanitized.contains("line"));
    }
}
