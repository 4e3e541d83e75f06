//! Yes/no questions asked around a run (destroy the machine? open a shell?).

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::env;
use std::fmt;
use std::sync::Arc;
use tokio::io::{
    self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin,
};
use tokio::sync::Mutex;

pub type PromptFuture<'a> = BoxFuture<'a, Result<bool>>;

/// Answers yes/no questions. `interactive_default` applies when an operator
/// accepts the suggestion; `unattended_default` when no operator is present.
pub trait Prompter: Send + Sync {
    fn confirm<'a>(
        &'a self,
        question: &'a str,
        interactive_default: bool,
        unattended_default: bool,
    ) -> PromptFuture<'a>;
}

/// Always answers with the unattended default.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnattendedPrompter;

impl Prompter for UnattendedPrompter {
    fn confirm<'a>(
        &'a self,
        question: &'a str,
        _interactive_default: bool,
        unattended_default: bool,
    ) -> PromptFuture<'a> {
        answer_unattended(question, unattended_default)
    }
}

fn answer_unattended(question: &str, answer: bool) -> PromptFuture<'_> {
    Box::pin(async move {
        tracing::info!(question, answer, "answered unattended");
        Ok(answer)
    })
}

/// Asks on the terminal, unless the process runs under CI.
///
/// Stdin is read through one buffered reader shared by every question, so
/// answers piped in ahead of time are consumed one line per question.
#[derive(Clone)]
pub struct ConsolePrompter {
    unattended: bool,
    input: Arc<Mutex<Option<Lines<BufReader<Stdin>>>>>,
}

impl Default for ConsolePrompter {
    fn default() -> Self {
        Self::from_env()
    }
}

impl fmt::Debug for ConsolePrompter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsolePrompter")
            .field("unattended", &self.unattended)
            .finish_non_exhaustive()
    }
}

impl ConsolePrompter {
    /// Treats the run as unattended when `CI` is set to a truthy value.
    pub fn from_env() -> Self {
        Self::with_mode(ci_flag(env::var("CI").ok().as_deref()))
    }

    pub fn interactive() -> Self {
        Self::with_mode(false)
    }

    fn with_mode(unattended: bool) -> Self {
        Self {
            unattended,
            input: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_unattended(&self) -> bool {
        self.unattended
    }

    async fn ask_console(&self, question: &str, default: bool) -> Result<bool> {
        let mut input = self.input.lock().await;
        let lines = input.get_or_insert_with(|| BufReader::new(io::stdin()).lines());
        ask(lines, &mut io::stdout(), question, default).await
    }
}

impl Prompter for ConsolePrompter {
    fn confirm<'a>(
        &'a self,
        question: &'a str,
        interactive_default: bool,
        unattended_default: bool,
    ) -> PromptFuture<'a> {
        if self.unattended {
            return answer_unattended(question, unattended_default);
        }
        Box::pin(self.ask_console(question, interactive_default))
    }
}

/// Writes `question` to `output` and reads answers from `lines` until one
/// parses. End of input counts as `default`.
async fn ask<R, W>(
    lines: &mut Lines<R>,
    output: &mut W,
    question: &str,
    default: bool,
) -> Result<bool>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let hint = if default { "[Y/n]" } else { "[y/N]" };

    loop {
        output
            .write_all(format!("{question} {hint} ").as_bytes())
            .await
            .context("failed to write prompt")?;
        output.flush().await.context("failed to flush prompt")?;

        let Some(line) = lines.next_line().await.context("failed to read answer")? else {
            return Ok(default);
        };
        match parse_answer(&line, default) {
            Some(answer) => return Ok(answer),
            None => tracing::debug!(input = %line, "unrecognised answer; asking again"),
        }
    }
}

/// `None` means the input was neither yes nor no.
fn parse_answer(input: &str, default: bool) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

fn ci_flag(value: Option<&str>) -> bool {
    match value {
        Some(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            !matches!(normalized.as_str(), "" | "0" | "false" | "no")
        }
        None => false,
    }
}
