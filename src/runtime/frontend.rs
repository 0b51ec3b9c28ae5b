use anyhow::Result;
use async_trait::async_trait;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::{execute, queue};
use std::io::{self, Stdout, Write};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

const ASSISTANT_COLOR: Color = Color::AnsiValue(12);
const SYSTEM_COLOR: Color = Color::AnsiValue(244);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// The main `(count/budget) λ :` prompt.
    Input,
    /// Per-block execution confirmation.
    Confirmation,
}

/// Everything the turn loop shows to or asks of the operator.
#[async_trait]
pub trait Frontend: Send {
    /// Shows `prompt` and waits for one line; `None` at end of input.
    async fn read_line(&mut self, kind: PromptKind, prompt: &str) -> Result<Option<String>>;

    fn blank_line(&mut self) -> Result<()>;

    fn begin_response(&mut self) -> Result<()>;

    /// Renders one streamed fragment immediately.
    fn render_fragment(&mut self, fragment: &str) -> Result<()>;

    fn end_response(&mut self) -> Result<()>;

    /// Mirrors one line of shell output while a script runs. Display only;
    /// a failed write must not abort the script.
    fn mirror_shell_line(&mut self, line: &str);

    fn end_shell_output(&mut self) -> Result<()>;

    fn notice(&mut self, message: &str) -> Result<()>;

    fn farewell(&mut self) -> Result<()>;
}

pub struct TerminalFrontend {
    input: Lines<BufReader<Stdin>>,
    stdout: Stdout,
}

impl TerminalFrontend {
    pub fn new() -> Self {
        Self {
            input: BufReader::new(tokio::io::stdin()).lines(),
            stdout: io::stdout(),
        }
    }
}

impl Default for TerminalFrontend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Frontend for TerminalFrontend {
    async fn read_line(&mut self, kind: PromptKind, prompt: &str) -> Result<Option<String>> {
        match kind {
            PromptKind::Input => execute!(self.stdout, Print(prompt))?,
            PromptKind::Confirmation => execute!(
                self.stdout,
                SetForegroundColor(SYSTEM_COLOR),
                Print(prompt),
                ResetColor
            )?,
        }
        Ok(self.input.next_line().await?)
    }

    fn blank_line(&mut self) -> Result<()> {
        execute!(self.stdout, Print("\n"))?;
        Ok(())
    }

    fn begin_response(&mut self) -> Result<()> {
        execute!(self.stdout, Print("\n"), SetForegroundColor(ASSISTANT_COLOR))?;
        Ok(())
    }

    fn render_fragment(&mut self, fragment: &str) -> Result<()> {
        execute!(self.stdout, Print(fragment))?;
        Ok(())
    }

    fn end_response(&mut self) -> Result<()> {
        execute!(self.stdout, Print("\n\n"), ResetColor)?;
        Ok(())
    }

    fn mirror_shell_line(&mut self, line: &str) {
        let _ = queue!(
            self.stdout,
            SetForegroundColor(SYSTEM_COLOR),
            Print(line),
            ResetColor
        );
        let _ = self.stdout.flush();
    }

    fn end_shell_output(&mut self) -> Result<()> {
        execute!(self.stdout, ResetColor, Print("\n"))?;
        Ok(())
    }

    fn notice(&mut self, message: &str) -> Result<()> {
        execute!(
            self.stdout,
            SetForegroundColor(SYSTEM_COLOR),
            Print(message),
            Print("\n\n"),
            ResetColor
        )?;
        Ok(())
    }

    fn farewell(&mut self) -> Result<()> {
        execute!(
            self.stdout,
            SetForegroundColor(ASSISTANT_COLOR),
            Print("\n\n Bye!\n"),
            ResetColor
        )?;
        Ok(())
    }
}
