//! Safe execution layer: run the beans binary with a scrubbed environment, a wall-clock
//! timeout, and a ceiling on captured output. No shell is used; arguments are passed as
//! a list to avoid injection.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::error::{excerpt, BeansError};

/// Inherited variables passed through by default (terminal, locale, home, shell, path search).
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &[
    "TERM",
    "COLORTERM",
    "LANG",
    "LANGUAGE",
    "LC_ALL",
    "LC_CTYPE",
    "LC_MESSAGES",
    "HOME",
    "USER",
    "SHELL",
    "PATH",
    "TMPDIR",
];

/// Variables under this prefix are workspace settings for the CLI and always pass through.
pub const DEFAULT_ENV_PREFIX: &str = "BEANS_";

/// Which inherited environment variables a child process may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvPolicy {
    allow: Vec<String>,
    prefix: Option<String>,
}

impl Default for EnvPolicy {
    fn default() -> Self {
        Self {
            allow: DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
            prefix: Some(DEFAULT_ENV_PREFIX.to_string()),
        }
    }
}

impl EnvPolicy {
    pub fn new(allow: Vec<String>, prefix: Option<String>) -> Self {
        Self {
            allow,
            prefix: prefix.filter(|p| !p.is_empty()),
        }
    }

    pub fn permits(&self, name: &str) -> bool {
        self.allow.iter().any(|a| a == name)
            || self.prefix.as_deref().map_or(false, |p| name.starts_with(p))
    }

    /// Filter an inherited environment down to the permitted variables.
    pub fn filter<I, V>(&self, vars: I) -> Vec<(String, V)>
    where
        I: IntoIterator<Item = (String, V)>,
    {
        vars.into_iter().filter(|(k, _)| self.permits(k)).collect()
    }
}

/// Runs one binary against one working directory with fixed limits.
#[derive(Debug, Clone)]
pub struct Runner {
    binary: PathBuf,
    cwd: PathBuf,
    env: EnvPolicy,
    timeout: Duration,
    max_output: usize,
}

impl Runner {
    pub fn new(
        binary: impl Into<PathBuf>,
        cwd: impl Into<PathBuf>,
        env: EnvPolicy,
        timeout: Duration,
        max_output: usize,
    ) -> Self {
        Self {
            binary: binary.into(),
            cwd: cwd.into(),
            env,
            timeout,
            max_output,
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Run `binary args...` and return stdout. Non-zero exit, timeout, and output past the
    /// ceiling are all errors; nothing is retried.
    pub async fn run(&self, args: &[String]) -> Result<String, BeansError> {
        let binary = self.binary.display().to_string();
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .current_dir(&self.cwd)
            .env_clear()
            .envs(self.env.filter(inherited_env()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        log::debug!("exec: {} {}", binary, args.first().map(String::as_str).unwrap_or(""));
        let mut child = cmd.spawn().map_err(|source| BeansError::Spawn {
            binary: binary.clone(),
            source,
        })?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let max = self.max_output;

        let work = async move {
            // try_join stops at the first overflow instead of waiting on the other pipe.
            let (out, err) =
                tokio::try_join!(read_capped(stdout, max), read_capped(stderr, max))?;
            let status = child.wait().await.map_err(PipeError::Io)?;
            Ok::<_, PipeError>((out, err, status))
        };
        // On timeout or overflow the future is dropped, which drops the child and kills it.
        let (out, err, status) = match tokio::time::timeout(self.timeout, work).await {
            Err(_) => return Err(BeansError::Timeout(self.timeout)),
            Ok(Err(PipeError::Overflow)) => return Err(BeansError::OutputTooLarge(max)),
            Ok(Err(PipeError::Io(e))) => return Err(BeansError::Io(e)),
            Ok(Ok(done)) => done,
        };

        let stdout = String::from_utf8_lossy(&out).into_owned();
        if status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&err).into_owned();
            let detail = if stderr.trim().is_empty() { stdout } else { stderr };
            Err(BeansError::Exit {
                status: status.to_string(),
                stderr: excerpt(&detail),
            })
        }
    }
}

/// Inherited variables whose names are valid UTF-8; values are passed through as-is.
fn inherited_env() -> impl Iterator<Item = (String, std::ffi::OsString)> {
    std::env::vars_os().filter_map(|(k, v)| Some((k.into_string().ok()?, v)))
}

enum PipeError {
    Io(std::io::Error),
    Overflow,
}

/// Read a pipe to the end, failing once it has produced more than `max` bytes.
async fn read_capped<R>(pipe: Option<R>, max: usize) -> Result<Vec<u8>, PipeError>
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return Ok(Vec::new());
    };
    let mut buf = Vec::new();
    pipe.take(max as u64 + 1)
        .read_to_end(&mut buf)
        .await
        .map_err(PipeError::Io)?;
    if buf.len() > max {
        Err(PipeError::Overflow)
    } else {
        Ok(buf)
    }
}
