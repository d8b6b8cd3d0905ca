//! Shared subprocess plumbing for the CLI-agent adapters.
//!
//! Both CLI backends take one prompt on stdin and answer with NDJSON on
//! stdout. Prompts always travel via stdin, never argv, so untrusted
//! conversation content cannot reach a shell. Children are spawned with
//! `kill_on_drop` so an abandoned call never leaks a process.

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::chat::ChatMessage;
use crate::env;
use crate::llm::types::{LlmError, StreamSink};

/// Ceiling for one full CLI invocation, from the prompt write through
/// process exit.
pub(crate) const RUN_TIMEOUT: Duration = Duration::from_secs(120);
/// Ceiling for `--version` probes.
pub(crate) const VERSION_TIMEOUT: Duration = Duration::from_secs(10);
/// Read-poll interval for streaming stdout; each expiry re-checks the
/// cancellation flag and the call deadline while the child is silent.
const READ_POLL: Duration = Duration::from_secs(2);

/// Flatten a conversation into the plain-text transcript a single-prompt
/// CLI understands: `"Role: content"` paragraphs, then the new message.
pub(crate) fn transcript(history: &[ChatMessage], new_message: &str) -> String {
    let mut prompt = String::new();
    for msg in history {
        prompt.push_str(msg.role().transcript_label());
        prompt.push_str(": ");
        prompt.push_str(&msg.full_content());
        prompt.push_str("\n\n");
    }
    if !new_message.is_empty() {
        prompt.push_str("User: ");
        prompt.push_str(new_message);
    }
    prompt
}

/// Build a command with the environment CLI agents need: home as the
/// working directory and PATH extended with the usual Node install
/// locations, which launchers on macOS do not put on the inherited PATH.
fn command<I, S>(program: &str, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let home = env::home_dir();
    if let Some(home) = &home {
        cmd.current_dir(home);
    }
    let current = std::env::var("PATH").unwrap_or_default();
    cmd.env("PATH", env::extended_cli_path(&current, home.as_deref()));
    cmd
}

fn spawn<I, S>(program: &str, args: I) -> Result<Child, LlmError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    command(program, args)
        .spawn()
        .map_err(|err| LlmError::Configuration(format!("failed to launch {program}: {err}")))
}

/// Write the prompt and close stdin, bounded by the call deadline. A
/// child that never drains its stdin pipe cannot stall the call past it.
async fn write_prompt(child: &mut Child, prompt: &str, deadline: Instant) -> Result<(), LlmError> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };
    tokio::time::timeout_at(deadline, async {
        stdin
            .write_all(prompt.as_bytes())
            .await
            .map_err(|err| LlmError::Network(format!("failed to write prompt: {err}")))?;
        // Closing stdin signals end of prompt.
        stdin
            .shutdown()
            .await
            .map_err(|err| LlmError::Network(format!("failed to close stdin: {err}")))
    })
    .await
    .map_err(|_| LlmError::Timeout {
        seconds: RUN_TIMEOUT.as_secs(),
    })?
}

#[derive(Debug)]
pub(crate) struct CliOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run one invocation to completion: prompt in, both streams captured,
/// bounded by [`RUN_TIMEOUT`]. A non-zero exit becomes
/// [`LlmError::Process`] with the captured stderr.
pub(crate) async fn run<I, S>(program: &str, args: I, prompt: &str) -> Result<CliOutput, LlmError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let deadline = Instant::now() + RUN_TIMEOUT;
    let mut child = spawn(program, args)?;
    write_prompt(&mut child, prompt, deadline).await?;

    let output = tokio::time::timeout_at(deadline, child.wait_with_output())
        .await
        .map_err(|_| LlmError::Timeout {
            seconds: RUN_TIMEOUT.as_secs(),
        })?
        .map_err(|err| LlmError::Network(format!("failed to collect {program} output: {err}")))?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    match output.status.code() {
        Some(0) => Ok(CliOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
        }),
        code => Err(LlmError::Process {
            code: code.unwrap_or(-1),
            stderr,
        }),
    }
}

/// `--version` probe; `Some(version)` only on a clean exit within the
/// probe ceiling.
pub(crate) async fn version(program: &str) -> Option<String> {
    let output = tokio::time::timeout(VERSION_TIMEOUT, command(program, ["--version"]).output())
        .await
        .ok()?
        .ok()?;
    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}

/// A live streaming invocation: line-buffered stdout, stderr drained on
/// its own task so a chatty child cannot deadlock on a full pipe. The
/// whole call shares one [`RUN_TIMEOUT`] deadline, from the prompt write
/// through the final reap.
pub(crate) struct CliStream {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr: JoinHandle<String>,
    deadline: Instant,
}

/// Outcome of one stdout read attempt.
#[derive(Debug)]
pub(crate) enum LineRead {
    Line(String),
    Eof,
    /// The caller's cancel flag flipped; the child has been killed and
    /// no further events may be emitted.
    Cancelled,
}

pub(crate) async fn stream<I, S>(program: &str, args: I, prompt: &str) -> Result<CliStream, LlmError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let deadline = Instant::now() + RUN_TIMEOUT;
    let mut child = spawn(program, args)?;
    write_prompt(&mut child, prompt, deadline).await?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| LlmError::Protocol("child stdout unavailable".to_string()))?;
    let stderr_pipe = child.stderr.take();
    let stderr = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(mut pipe) = stderr_pipe {
            let _ = pipe.read_to_string(&mut buf).await;
        }
        buf
    });

    Ok(CliStream {
        child,
        lines: BufReader::new(stdout).lines(),
        stderr,
        deadline,
    })
}

impl CliStream {
    /// Next stdout line, polling in [`READ_POLL`] slices so cancellation
    /// and the deadline are observed even while the child is silent.
    /// Cancellation and deadline expiry both kill the child here.
    pub(crate) async fn next_line(&mut self, sink: &dyn StreamSink) -> Result<LineRead, LlmError> {
        loop {
            if sink.is_cancelled() {
                self.kill_child().await;
                return Ok(LineRead::Cancelled);
            }
            if Instant::now() >= self.deadline {
                self.kill_child().await;
                return Err(LlmError::Timeout {
                    seconds: RUN_TIMEOUT.as_secs(),
                });
            }
            match tokio::time::timeout(READ_POLL, self.lines.next_line()).await {
                // Poll expired without data: re-check the flags.
                Err(_) => continue,
                Ok(Ok(Some(line))) => return Ok(LineRead::Line(line)),
                Ok(Ok(None)) => return Ok(LineRead::Eof),
                Ok(Err(err)) => {
                    self.kill_child().await;
                    return Err(LlmError::Network(format!(
                        "failed to read process output: {err}"
                    )));
                }
            }
        }
    }

    async fn kill_child(&mut self) {
        let _ = self.child.kill().await;
        self.stderr.abort();
    }

    /// Reap the child after EOF, within what remains of the call
    /// deadline. Non-zero exit yields the drained stderr.
    pub(crate) async fn finish(mut self) -> Result<(), LlmError> {
        let status = tokio::time::timeout_at(self.deadline, self.child.wait())
            .await
            .map_err(|_| LlmError::Timeout {
                seconds: RUN_TIMEOUT.as_secs(),
            })?
            .map_err(|err| LlmError::Network(format!("failed to reap process: {err}")))?;

        match status.code() {
            Some(0) => Ok(()),
            code => {
                let stderr = self.stderr.await.unwrap_or_default();
                Err(LlmError::Process {
                    code: code.unwrap_or(-1),
                    stderr: stderr.trim().to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Role;
    use crate::llm::test_support::RecordingSink;

    #[test]
    fn transcript_labels_roles_and_appends_new_message() {
        let history = vec![
            ChatMessage::new(Role::System, "be terse"),
            ChatMessage::new(Role::User, "hi"),
            ChatMessage::new(Role::Assistant, "hello"),
        ];
        let prompt = transcript(&history, "next question");
        assert_eq!(
            prompt,
            "System: be terse\n\nUser: hi\n\nAssistant: hello\n\nUser: next question"
        );
    }

    #[test]
    fn transcript_without_new_message_ends_after_history() {
        let history = vec![ChatMessage::new(Role::User, "hi")];
        assert_eq!(transcript(&history, ""), "User: hi\n\n");
    }

    #[tokio::test]
    async fn run_captures_stdout() {
        let output = run("cat", Vec::<String>::new(), "echoed back").await.unwrap();
        assert_eq!(output.stdout, "echoed back");
    }

    #[tokio::test]
    async fn nonzero_exit_carries_code_and_stderr() {
        let err = run("sh", ["-c", "echo boom >&2; exit 2"], "")
            .await
            .unwrap_err();
        match err {
            LlmError::Process { code, stderr } => {
                assert_eq!(code, 2);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_a_configuration_error() {
        let err = run("/nonexistent/agent-cli", Vec::<String>::new(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Configuration(_)));
    }

    async fn expect_line(stream: &mut CliStream, sink: &dyn StreamSink) -> String {
        match stream.next_line(sink).await.unwrap() {
            LineRead::Line(line) => line,
            other => panic!("expected a line, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_yields_lines_then_clean_finish() {
        let sink = RecordingSink::new();
        let mut stream = stream("sh", ["-c", "cat; echo second"], "first\n")
            .await
            .unwrap();
        assert_eq!(expect_line(&mut stream, &sink).await, "first");
        assert_eq!(expect_line(&mut stream, &sink).await, "second");
        assert!(matches!(
            stream.next_line(&sink).await.unwrap(),
            LineRead::Eof
        ));
        stream.finish().await.unwrap();
    }

    #[tokio::test]
    async fn silent_child_observes_cancellation_promptly() {
        let sink = RecordingSink::new();
        sink.cancel();
        let start = std::time::Instant::now();
        let mut stream = stream("sh", ["-c", "sleep 30"], "").await.unwrap();
        assert!(matches!(
            stream.next_line(&sink).await.unwrap(),
            LineRead::Cancelled
        ));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn expired_deadline_times_out_a_silent_child() {
        let sink = RecordingSink::new();
        let mut stream = stream("sh", ["-c", "sleep 30"], "").await.unwrap();
        stream.deadline = Instant::now();
        let err = stream.next_line(&sink).await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout { .. }));
    }

    #[tokio::test]
    async fn stalled_stdin_write_hits_the_deadline() {
        // A child that never reads stdin while the prompt overflows the
        // pipe buffer must fail at the deadline, not hang.
        let mut child = spawn("sh", ["-c", "sleep 30"]).unwrap();
        let deadline = Instant::now() + Duration::from_millis(200);
        let prompt = "x".repeat(4 * 1024 * 1024);
        let err = write_prompt(&mut child, &prompt, deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Timeout { .. }));
        let _ = child.kill().await;
    }

    #[tokio::test]
    async fn version_probe_reports_clean_exit() {
        // `true` ignores arguments and exits 0 with empty output.
        assert_eq!(version("true").await.as_deref(), Some(""));
        assert_eq!(version("/nonexistent/agent-cli").await, None);
    }
}
