//! Plain-text rendering of session updates

use std::io::{self, Write};

use parley_proto::{EventKind, Message};
use parley_sync::{ChatSession, ConnectionStatus, LogChange, SessionUpdate};

/// Prints streamed replies incrementally and status changes to stderr
pub struct Renderer {
    verbose: bool,
    /// Text of the open reply already written to stdout
    streamed: String,
    typing_shown: bool,
}

impl Renderer {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            streamed: String::new(),
            typing_shown: false,
        }
    }

    pub fn render(&mut self, session: &ChatSession, update: SessionUpdate) -> io::Result<()> {
        match update {
            SessionUpdate::Log {
                kind: EventKind::LlmToken,
                change: LogChange::Appended(index) | LogChange::Updated(index),
            } => self.print_delta(&session.messages()[index]),
            SessionUpdate::Log {
                kind: EventKind::LlmDone,
                change: LogChange::Updated(index),
            } => self.print_final(&session.messages()[index]),
            SessionUpdate::Log {
                kind: EventKind::MessageAck,
                change: LogChange::Updated(index),
            } => {
                if self.verbose {
                    let message = &session.messages()[index];
                    eprintln!(
                        "[delivered {} at {}]",
                        message.id,
                        message.timestamp.format("%H:%M:%S")
                    );
                }
                Ok(())
            }
            SessionUpdate::Log { .. } => Ok(()),
            SessionUpdate::Typing { remote_typing } => {
                if remote_typing && !self.typing_shown {
                    eprintln!("[someone is typing...]");
                }
                self.typing_shown = remote_typing;
                Ok(())
            }
            SessionUpdate::Status(status) => {
                print_status(status);
                Ok(())
            }
        }
    }

    fn print_delta(&mut self, message: &Message) -> io::Result<()> {
        let mut out = io::stdout().lock();
        if self.streamed.is_empty() {
            write!(out, "{}> ", message.sender.label())?;
        }
        match message.content.strip_prefix(self.streamed.as_str()) {
            Some(delta) => write!(out, "{}", delta)?,
            None => write!(out, "\r{}> {}", message.sender.label(), message.content)?,
        }
        out.flush()?;
        self.streamed.clone_from(&message.content);
        Ok(())
    }

    fn print_final(&mut self, message: &Message) -> io::Result<()> {
        let mut out = io::stdout().lock();
        match message.content.strip_prefix(self.streamed.as_str()) {
            Some(rest) if !self.streamed.is_empty() => writeln!(out, "{}", rest)?,
            _ => {
                if !self.streamed.is_empty() {
                    writeln!(out)?;
                }
                writeln!(out, "{}> {}", message.sender.label(), message.content)?;
            }
        }
        out.flush()?;
        self.streamed.clear();
        Ok(())
    }
}

fn print_status(status: ConnectionStatus) {
    match status {
        ConnectionStatus::Open => eprintln!("[connected]"),
        ConnectionStatus::Disconnected => {
            eprintln!("[disconnected: gave up reconnecting]")
        }
        other => eprintln!("[{}]", other),
    }
}
