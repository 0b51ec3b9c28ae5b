use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use uuid::Uuid;

pub const SENTINEL_PREFIX: &str = "__CHATSH_END_OF_COMMAND_";

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to start shell '{shell}': {source}")]
    Spawn {
        shell: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write to the shell: {0}")]
    Write(#[source] io::Error),
    #[error("failed to read shell output: {0}")]
    Read(#[source] io::Error),
    #[error("shell exited before the script completed")]
    Exited,
}

/// Runs one script to completion and returns what it printed.
#[async_trait]
pub trait ScriptRunner: Send {
    async fn run_script(
        &mut self,
        script: &str,
        echo: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String, ShellError>;
}

/// A live shell fed through its stdin. Completion of each script is detected
/// by echoing a per-session sentinel after it and reading until a line
/// contains that sentinel. A script that itself prints the sentinel ends its
/// capture early; the random UUID in the marker makes that practically
/// impossible but it is not prevented.
pub struct ShellBridge<W, R> {
    stdin: W,
    stdout: BufReader<R>,
    sentinel: String,
    // Held so the process is killed when the bridge goes away.
    _child: Option<Child>,
}

pub type ShellSession = ShellBridge<ChildStdin, ChildStdout>;

impl ShellSession {
    /// Starts `shell` in `working_dir` with stderr folded into stdout.
    pub async fn spawn(shell: &Path, working_dir: &Path) -> Result<Self, ShellError> {
        let spawn_error = |source| ShellError::Spawn {
            shell: shell.display().to_string(),
            source,
        };

        let mut command = Command::new(shell);
        command
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        // Own process group: a terminal Ctrl-C must reach chatsh, not the shell.
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command.spawn().map_err(spawn_error)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error(io::Error::other("stdin was not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(io::Error::other("stdout was not captured")))?;

        let mut bridge = ShellBridge::from_streams(stdin, stdout);
        bridge._child = Some(child);
        bridge.send("exec 2>&1\n").await?;

        tracing::debug!(shell = %shell.display(), "shell session started");
        Ok(bridge)
    }
}

impl<W, R> ShellBridge<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncRead + Unpin + Send,
{
    pub fn from_streams(stdin: W, stdout: R) -> Self {
        Self {
            stdin,
            stdout: BufReader::new(stdout),
            sentinel: format!("{SENTINEL_PREFIX}{}__", Uuid::new_v4().simple()),
            _child: None,
        }
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Sends `script` and blocks until the sentinel comes back. Every output
    /// line is handed to `on_line` as soon as it is read.
    pub async fn execute<F>(&mut self, script: &str, mut on_line: F) -> Result<String, ShellError>
    where
        F: FnMut(&str),
    {
        let command = format!("{script}\necho \"{}\"\n", self.sentinel);
        self.send(&command).await?;

        let mut output = String::new();
        let mut raw = Vec::new();
        loop {
            raw.clear();
            let read = self
                .stdout
                .read_until(b'\n', &mut raw)
                .await
                .map_err(ShellError::Read)?;
            if read == 0 {
                return Err(ShellError::Exited);
            }

            let line = String::from_utf8_lossy(&raw);
            if let Some(position) = line.find(self.sentinel.as_str()) {
                // Output that did not end in a newline shares the sentinel's line.
                let unterminated = &line[..position];
                if !unterminated.is_empty() {
                    on_line(unterminated);
                    output.push_str(unterminated);
                }
                break;
            }

            on_line(&line);
            output.push_str(&line);
        }

        tracing::debug!(bytes = output.len(), "shell script finished");
        Ok(output)
    }

    async fn send(&mut self, text: &str) -> Result<(), ShellError> {
        self.stdin
            .write_all(text.as_bytes())
            .await
            .map_err(ShellError::Write)?;
        self.stdin.flush().await.map_err(ShellError::Write)
    }
}

#[async_trait]
impl<W, R> ScriptRunner for ShellBridge<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncRead + Unpin + Send,
{
    async fn run_script(
        &mut self,
        script: &str,
        echo: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String, ShellError> {
        self.execute(script, |line| echo(line)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn test_capture_is_independent_of_read_fragmentation() {
        let (bridge_in, mut shell_in) = duplex(4096);
        let (mut shell_out, bridge_out) = duplex(4096);
        let mut bridge = ShellBridge::from_streams(bridge_in, bridge_out);
        let sentinel = bridge.sentinel().to_string();

        let fake_shell = tokio::spawn(async move {
            let mut received = Vec::new();
            let mut buf = [0u8; 256];
            while !String::from_utf8_lossy(&received).contains(&sentinel) {
                let n = shell_in.read(&mut buf).await.unwrap();
                received.extend_from_slice(&buf[..n]);
            }
            for piece in ["he", "llo", "\n", &sentinel[..5], &sentinel[5..], "\n"] {
                shell_out.write_all(piece.as_bytes()).await.unwrap();
                shell_out.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            String::from_utf8(received).unwrap()
        });

        let mut mirrored = Vec::new();
        let output = bridge
            .execute("echo hello", |line| mirrored.push(line.to_string()))
            .await
            .unwrap();

        assert_eq!(output, "hello\n");
        assert_eq!(mirrored, vec!["hello\n"]);

        let sent = fake_shell.await.unwrap();
        assert!(sent.starts_with("echo hello\necho \"__CHATSH_END_OF_COMMAND_"));
    }

    #[tokio::test]
    async fn test_closed_output_is_reported_as_exit() {
        let (bridge_in, _shell_in) = duplex(4096);
        let (shell_out, bridge_out) = duplex(4096);
        drop(shell_out);
        let mut bridge = ShellBridge::from_streams(bridge_in, bridge_out);

        let err = bridge.execute("ls", |_| {}).await.unwrap_err();
        assert!(matches!(err, ShellError::Exited));
    }

    #[tokio::test]
    async fn test_run_script_mirrors_each_line_through_echo() {
        let (bridge_in, mut shell_in) = duplex(4096);
        let (mut shell_out, bridge_out) = duplex(4096);
        let mut bridge = ShellBridge::from_streams(bridge_in, bridge_out);
        let sentinel = bridge.sentinel().to_string();

        let fake_shell = tokio::spawn(async move {
            let mut received = Vec::new();
            let mut buf = [0u8; 256];
            while !String::from_utf8_lossy(&received).contains(&sentinel) {
                let n = shell_in.read(&mut buf).await.unwrap();
                received.extend_from_slice(&buf[..n]);
            }
            let reply = format!("a.txt\nb/\n{sentinel}\n");
            shell_out.write_all(reply.as_bytes()).await.unwrap();
            shell_out.flush().await.unwrap();
        });

        let mut mirrored = Vec::new();
        let mut echo = |line: &str| mirrored.push(line.to_string());
        let output = bridge.run_script("ls -p", &mut echo).await.unwrap();
        fake_shell.await.unwrap();

        assert_eq!(output, "a.txt\nb/\n");
        assert_eq!(mirrored, vec!["a.txt\n", "b/\n"]);
    }

    #[test]
    fn test_sentinels_are_unique_per_bridge() {
        let (a_in, _a) = duplex(64);
        let (_b, a_out) = duplex(64);
        let (c_in, _c) = duplex(64);
        let (_d, c_out) = duplex(64);

        let first = ShellBridge::from_streams(a_in, a_out);
        let second = ShellBridge::from_streams(c_in, c_out);
        assert!(first.sentinel().starts_with(SENTINEL_PREFIX));
        assert_ne!(first.sentinel(), second.sentinel());
    }
}
