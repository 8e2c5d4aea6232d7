//! Terminal line input shared by the interactive session and the approval gate
//!
//! The rustyline editor blocks, so it lives on its own thread and serves read
//! requests over a channel. Reads with a deadline on a terminal are polled
//! through crossterm instead, so they end on time and leave the terminal in
//! cooked mode. Off a terminal a deadline read cannot be cancelled on the
//! thread; whatever arrives for it late is discarded with a notice rather
//! than being applied to a later prompt.

use std::collections::VecDeque;
use std::io::{IsTerminal, Write};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use colored::Colorize;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

/// How long past a deadline to wait for the editor thread to report it
const DEADLINE_GRACE: Duration = Duration::from_secs(1);

/// Errors from reading operator input
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Interrupted by user")]
    Interrupted,

    #[error("Console is closed")]
    Closed,

    #[error("No input before the deadline")]
    TimedOut,

    #[error("Line editor error: {0}")]
    Editor(String),
}

/// A source of operator input lines
#[async_trait]
pub trait LineSource: Send + Sync {
    /// Show `prompt` and read one line; `Ok(None)` means end of input
    async fn read_line(&self, prompt: &str) -> Result<Option<String>, ConsoleError>;

    /// Like [`LineSource::read_line`], but gives up with [`ConsoleError::TimedOut`] at `deadline`
    async fn read_line_until(&self, prompt: &str, deadline: Instant) -> Result<Option<String>, ConsoleError> {
        match tokio::time::timeout_at(deadline, self.read_line(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(ConsoleError::TimedOut),
        }
    }

    /// Remember a line for history recall
    fn add_history(&self, _line: &str) {}
}

/// Put the terminal back in cooked mode if crossterm left it raw
pub fn restore_terminal() {
    if let Err(e) = disable_raw_mode() {
        warn!("restore_terminal: failed to leave raw mode: {}", e);
    }
}

/// Raw mode for the lifetime of the guard
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self, ConsoleError> {
        enable_raw_mode().map_err(|e| ConsoleError::Editor(e.to_string()))?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        restore_terminal();
    }
}

/// What a key press does to the line being typed
#[derive(Debug, PartialEq, Eq)]
enum KeyAction {
    Typed(char),
    Erased,
    Submit,
    Interrupt,
    EndOfInput,
    Ignore,
}

fn apply_key(line: &mut String, key: KeyEvent) -> KeyAction {
    if key.kind == KeyEventKind::Release {
        return KeyAction::Ignore;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Enter => KeyAction::Submit,
        KeyCode::Char('c') if ctrl => KeyAction::Interrupt,
        KeyCode::Char('d') if ctrl && line.is_empty() => KeyAction::EndOfInput,
        KeyCode::Char(_) if ctrl => KeyAction::Ignore,
        KeyCode::Char(c) => {
            line.push(c);
            KeyAction::Typed(c)
        }
        KeyCode::Backspace => match line.pop() {
            Some(_) => KeyAction::Erased,
            None => KeyAction::Ignore,
        },
        _ => KeyAction::Ignore,
    }
}

/// Read one line on the terminal, giving up at `deadline`
fn read_terminal_line(prompt: &str, deadline: std::time::Instant) -> Result<Option<String>, ConsoleError> {
    let io_err = |e: std::io::Error| ConsoleError::Editor(e.to_string());
    let mut out = std::io::stdout();
    let _raw = RawMode::enable()?;
    write!(out, "{}", prompt).map_err(io_err)?;
    out.flush().map_err(io_err)?;

    let mut line = String::new();
    loop {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        if remaining.is_zero() {
            write!(out, "\r\n").map_err(io_err)?;
            return Err(ConsoleError::TimedOut);
        }
        if !event::poll(remaining).map_err(io_err)? {
            continue;
        }
        let Event::Key(key) = event::read().map_err(io_err)? else {
            continue;
        };
        match apply_key(&mut line, key) {
            KeyAction::Typed(c) => write!(out, "{}", c).map_err(io_err)?,
            KeyAction::Erased => write!(out, "\u{8} \u{8}").map_err(io_err)?,
            KeyAction::Submit => {
                write!(out, "\r\n").map_err(io_err)?;
                return Ok(Some(line));
            }
            KeyAction::Interrupt => {
                write!(out, "^C\r\n").map_err(io_err)?;
                return Err(ConsoleError::Interrupted);
            }
            KeyAction::EndOfInput => {
                write!(out, "\r\n").map_err(io_err)?;
                return Ok(None);
            }
            KeyAction::Ignore => {}
        }
        out.flush().map_err(io_err)?;
    }
}

type ReadReply = oneshot::Sender<Result<Option<String>, ConsoleError>>;

enum ConsoleCommand {
    ReadLine {
        prompt: String,
        deadline: Option<std::time::Instant>,
        reply: ReadReply,
    },
    AddHistory { line: String },
}

/// Terminal console backed by rustyline on a dedicated thread
pub struct Console {
    tx: mpsc::UnboundedSender<ConsoleCommand>,
}

impl Console {
    /// Start the editor thread
    pub fn spawn() -> Result<Self, ConsoleError> {
        debug!("Console::spawn: called");
        let (tx, mut rx) = mpsc::unbounded_channel::<ConsoleCommand>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), ConsoleError>>();

        std::thread::spawn(move || {
            let mut editor = match DefaultEditor::new() {
                Ok(editor) => {
                    let _ = ready_tx.send(Ok(()));
                    editor
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(ConsoleError::Editor(e.to_string())));
                    return;
                }
            };
            debug!("Console: editor thread started");

            while let Some(command) = rx.blocking_recv() {
                match command {
                    ConsoleCommand::ReadLine { prompt, deadline, reply } => {
                        let result = match deadline {
                            Some(deadline) if std::io::stdin().is_terminal() => read_terminal_line(&prompt, deadline),
                            _ => match editor.readline(&prompt) {
                                Ok(line) => Ok(Some(line)),
                                Err(ReadlineError::Interrupted) => Err(ConsoleError::Interrupted),
                                Err(ReadlineError::Eof) => Ok(None),
                                Err(e) => Err(ConsoleError::Editor(e.to_string())),
                            },
                        };
                        let late_line = matches!(result, Ok(Some(_)));
                        if reply.send(result).is_err() && late_line {
                            debug!("Console: reader gave up, discarding late input");
                            println!("{}", "(input ignored: that request already timed out)".dimmed());
                        }
                    }
                    ConsoleCommand::AddHistory { line } => {
                        let _ = editor.add_history_entry(line);
                    }
                }
            }
            debug!("Console: editor thread exiting");
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { tx }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ConsoleError::Closed),
        }
    }
}

#[async_trait]
impl LineSource for Console {
    async fn read_line(&self, prompt: &str) -> Result<Option<String>, ConsoleError> {
        debug!(%prompt, "Console::read_line: called");
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ConsoleCommand::ReadLine {
                prompt: prompt.to_string(),
                deadline: None,
                reply,
            })
            .map_err(|_| ConsoleError::Closed)?;
        rx.await.map_err(|_| ConsoleError::Closed)?
    }

    async fn read_line_until(&self, prompt: &str, deadline: Instant) -> Result<Option<String>, ConsoleError> {
        debug!(%prompt, "Console::read_line_until: called");
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ConsoleCommand::ReadLine {
                prompt: prompt.to_string(),
                deadline: Some(deadline.into_std()),
                reply,
            })
            .map_err(|_| ConsoleError::Closed)?;
        match tokio::time::timeout_at(deadline + DEADLINE_GRACE, rx).await {
            Ok(result) => result.map_err(|_| ConsoleError::Closed)?,
            Err(_) => Err(ConsoleError::TimedOut),
        }
    }

    fn add_history(&self, line: &str) {
        if self
            .tx
            .send(ConsoleCommand::AddHistory { line: line.to_string() })
            .is_err()
        {
            warn!("Console::add_history: editor thread is gone");
        }
    }
}

enum Scripted {
    Line(String),
    Interrupt,
}

/// Pre-scripted input, for unattended runs and tests
///
/// Records every prompt it was shown. Once the script runs out it either
/// reports end of input or, with [`ScriptedInput::hang_when_exhausted`],
/// never answers.
pub struct ScriptedInput {
    script: Mutex<VecDeque<Scripted>>,
    prompts: Mutex<Vec<String>>,
    hang: bool,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(lines.into_iter().map(|l| Scripted::Line(l.into())).collect()),
            prompts: Mutex::new(Vec::new()),
            hang: false,
        }
    }

    /// Wait forever instead of reporting end of input
    pub fn hang_when_exhausted(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Queue a Ctrl-C after the current script
    pub fn then_interrupt(self) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Scripted::Interrupt);
        }
        self
    }

    /// Prompts shown so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Lines not consumed yet
    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LineSource for ScriptedInput {
    async fn read_line(&self, prompt: &str) -> Result<Option<String>, ConsoleError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let next = self.script.lock().map_err(|_| ConsoleError::Closed)?.pop_front();
        match next {
            Some(Scripted::Line(line)) => Ok(Some(line)),
            Some(Scripted::Interrupt) => Err(ConsoleError::Interrupted),
            None if self.hang => std::future::pending().await,
            None => Ok(None),
        }
    }
}
