//! Subprocess-backed agent
//!
//! The prompt is passed as the last argument. Output is forwarded line by
//! line into the agent's log namespace: stdout at INFO, stderr at WARN.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{AgentError, AgentFactory, DelegatedAgent};

/// Locate `program` the way a shell would
///
/// Names containing a path separator are checked as given; bare names are
/// searched on `PATH`.
pub fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| {
        let full = dir.join(program);
        if full.is_file() {
            return Some(full);
        }
        if cfg!(windows) {
            let exe = full.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

#[derive(Debug, Clone)]
pub struct ProcessAgentFactory {
    program: String,
    args: Vec<String>,
    workdir: Option<PathBuf>,
}

impl ProcessAgentFactory {
    pub fn new(program: impl Into<String>, args: Vec<String>, workdir: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            workdir,
        }
    }
}

impl AgentFactory for ProcessAgentFactory {
    fn create(&self) -> Result<Box<dyn DelegatedAgent>, AgentError> {
        let program = resolve_program(&self.program)
            .ok_or_else(|| AgentError::ProgramNotFound(self.program.clone()))?;

        if let Some(dir) = &self.workdir {
            if !dir.is_dir() {
                return Err(AgentError::Other(format!(
                    "agent working directory {} does not exist",
                    dir.display()
                )));
            }
        }

        Ok(Box::new(ProcessAgent {
            program,
            args: self.args.clone(),
            workdir: self.workdir.clone(),
            child: None,
        }))
    }
}

/// Agent running as a child process
#[derive(Debug)]
pub struct ProcessAgent {
    program: PathBuf,
    args: Vec<String>,
    workdir: Option<PathBuf>,
    child: Option<Child>,
}

impl ProcessAgent {
    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl DelegatedAgent for ProcessAgent {
    async fn run(&mut self, prompt: &str) -> Result<(), AgentError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        info!(
            target: "open_manus::agent",
            program = %self.program.display(),
            "Starting agent process"
        );
        let mut child = cmd.spawn().map_err(AgentError::Spawn)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let child = self.child.insert(child);

        let (_, _, status) = tokio::join!(
            forward_lines(stdout, false),
            forward_lines(stderr, true),
            child.wait()
        );
        let status = status?;
        self.child = None;

        if status.success() {
            info!(target: "open_manus::agent", "Agent process finished");
            Ok(())
        } else {
            Err(AgentError::Exit(status.to_string()))
        }
    }

    async fn cleanup(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                if let Err(e) = child.kill().await {
                    warn!(target: "open_manus::agent", error = %e, "Failed to kill agent process");
                } else {
                    debug!(target: "open_manus::agent", "Killed leftover agent process");
                }
            }
        }
    }
}

async fn forward_lines<R>(pipe: Option<R>, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return;
    };
    let mut lines = BufReader::new(pipe).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        if is_stderr {
            warn!(target: "open_manus::agent", "{}", line);
        } else {
            info!(target: "open_manus::agent", "{}", line);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn agent(program: &str, args: &[&str]) -> Box<dyn DelegatedAgent> {
        ProcessAgentFactory::new(program, args.iter().map(|s| s.to_string()).collect(), None)
            .create()
            .unwrap()
    }

    #[test]
    fn test_resolve_program_on_path() {
        assert!(resolve_program("sh").is_some());
        assert!(resolve_program("askcfo-definitely-missing").is_none());
        assert!(resolve_program("/no/such/dir/agent").is_none());
    }

    #[tokio::test]
    async fn test_prompt_is_last_argument() {
        let mut agent = agent("sh", &["-c", "test \"$0\" = 'fetch 10-K'"]);
        agent.run("fetch 10-K").await.unwrap();
        agent.cleanup().await;
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let mut agent = agent("sh", &["-c", "echo boom >&2; exit 3"]);
        let err = agent.run("anything").await.unwrap_err();
        assert!(matches!(err, AgentError::Exit(_)));
        agent.cleanup().await;
    }

    #[test]
    fn test_missing_workdir_fails_to_create() {
        let factory = ProcessAgentFactory::new("sh", vec![], Some(PathBuf::from("/no/such/workdir")));
        assert!(matches!(factory.create(), Err(AgentError::Other(_))));
    }
}
