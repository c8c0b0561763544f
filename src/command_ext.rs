use anyhow::Context as _;
use async_trait::async_trait;
use std::process::{Output, Stdio};
use tokio::{
    io::{AsyncBufReadExt as _, AsyncRead, BufReader},
    process::Command,
};

#[derive(PartialEq, Eq, Copy, Clone)]
pub enum StreamMode {
    Capture,
    /// Capture and also log every line as it arrives.
    Log(log::Level),
}

#[async_trait]
pub trait CommandExt {
    /// Runs to completion, capturing stdout and stderr. Does not fail on a nonzero exit.
    ///
    /// `context` prefixes logged lines. Stderr is always logged at debug level.
    async fn run_to_completion(&mut self, context: &str, stdout_mode: StreamMode) -> anyhow::Result<Output>;
}

#[async_trait]
impl CommandExt for Command {
    async fn run_to_completion(&mut self, context: &str, stdout_mode: StreamMode) -> anyhow::Result<Output> {
        let mut child = self
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("{context}: spawning"))?;

        let stdout = child.stdout.take().expect("take child stdout");
        let stderr = child.stderr.take().expect("take child stderr");
        let (stdout, stderr) = tokio::try_join!(
            collect_lines(stdout, context, stdout_mode),
            collect_lines(stderr, context, StreamMode::Log(log::Level::Debug)),
        )?;

        let status = child.wait().await.with_context(|| format!("{context}: waiting for exit"))?;
        log::debug!("{context}: exited with {status}");
        Ok(Output { status, stdout: stdout.into_bytes(), stderr: stderr.into_bytes() })
    }
}

async fn collect_lines(stream: impl AsyncRead + Unpin, context: &str, mode: StreamMode) -> anyhow::Result<String> {
    let mut lines = BufReader::new(stream).lines();
    let mut buf = String::new();
    while let Some(line) = lines.next_line().await? {
        if let StreamMode::Log(level) = mode {
            log::log!(level, "{context}: {line}");
        }
        buf.push_str(&line);
        buf.push('\n');
    }
    Ok(buf)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_both_streams_without_failing_on_exit_code() {
        let output = Command::new("sh")
            .args(["-c", "echo out; echo err >&2; exit 3"])
            .run_to_completion("sh", StreamMode::Capture)
            .await
            .unwrap();
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stdout, b"out\n");
        assert_eq!(output.stderr, b"err\n");
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let err = Command::new("/nonexistent/pulumi")
            .run_to_completion("pulumi", StreamMode::Capture)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("pulumi: spawning"));
    }
}
