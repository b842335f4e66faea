//! Line-oriented terminal front end.
//!
//! Input lines are read on a dedicated thread so a pending read never keeps
//! the process alive after shutdown. Delivered chat lines arrive through the
//! session's channel sink and are printed on the foreground task.

use chatroom_core::ChatSession;
use std::io::{BufRead, IsTerminal, Write};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, warn};

const SENDER_STYLE: &str = "\x1b[35m";
const RESET: &str = "\x1b[0m";

/// How the foreground loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCause {
    Command,
    EndOfInput,
    Interrupted,
    Terminated,
}

/// Termination signals other than Ctrl-C.
///
/// Handlers are registered on creation, so a signal that arrives while a send
/// is in flight is picked up on the next loop iteration.
struct ExitSignals {
    #[cfg(unix)]
    terminate: Option<tokio::signal::unix::Signal>,
}

impl ExitSignals {
    #[cfg(unix)]
    fn install() -> Self {
        use tokio::signal::unix::{signal, SignalKind};
        let terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => Some(terminate),
            Err(e) => {
                warn!("[Terminal] cannot listen for SIGTERM: {}", e);
                None
            }
        };
        Self { terminate }
    }

    #[cfg(not(unix))]
    fn install() -> Self {
        Self {}
    }

    #[cfg(unix)]
    async fn terminated(&mut self) {
        if let Some(terminate) = self.terminate.as_mut() {
            if terminate.recv().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await
    }

    #[cfg(not(unix))]
    async fn terminated(&mut self) {
        std::future::pending::<()>().await
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Exit,
    Message(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        Input::Empty
    } else if trimmed.eq_ignore_ascii_case("exit") {
        Input::Exit
    } else {
        Input::Message(trimmed)
    }
}

/// Style the `sender:` prefix of a chat line.
fn render_line(line: &str, styled: bool) -> String {
    match line.split_once(':') {
        Some((sender, rest)) if styled => format!("{}{}:{}{}", SENDER_STYLE, sender, RESET, rest),
        _ => line.to_string(),
    }
}

fn spawn_stdin_reader() -> UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("[Terminal] stdin read failed: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

pub struct Terminal {
    styled: bool,
}

impl Terminal {
    /// Only constructed once the session is registered.
    pub fn new() -> Self {
        Self {
            styled: std::io::stdout().is_terminal(),
        }
    }

    fn print(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{}", render_line(line, self.styled)) {
            debug!("[Terminal] write failed: {}", e);
        }
    }

    pub async fn run(&self, session: &ChatSession, mut lines: UnboundedReceiver<String>) -> ExitCause {
        println!("Welcome to the chat room, {}!", session.name());
        println!("Type a message and press Enter to send. Type 'exit' to leave.");

        let mut signals = ExitSignals::install();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let mut input = spawn_stdin_reader();
        let mut receiving = true;

        loop {
            tokio::select! {
                _ = &mut ctrl_c => return ExitCause::Interrupted,
                _ = signals.terminated() => return ExitCause::Terminated,

                typed = input.recv() => match typed {
                    Some(text) => match parse_input(&text) {
                        Input::Empty => continue,
                        Input::Exit => return ExitCause::Command,
                        Input::Message(message) => {
                            if let Err(e) = session.send(message).await {
                                eprintln!("Error sending message: {}", e);
                            }
                        }
                    },
                    None => return ExitCause::EndOfInput,
                },

                delivered = lines.recv(), if receiving => match delivered {
                    Some(line) => self.print(&line),
                    None => {
                        debug!("[Terminal] delivery stopped, no further lines");
                        receiving = false;
                    }
                },
            }
        }
    }

    /// Flush anything still buffered for the terminal.
    pub fn release(self) {
        if let Err(e) = std::io::stdout().flush() {
            warn!("[Terminal] failed to flush stdout: {}", e);
        }
    }
}
