//! `/`-prefixed commands typed during a session.
//!
//! Each sub-module holds one handler. Handlers get a [`CommandContext`] for
//! the running session and return `Break` only when the session must end.

pub mod clear;
pub mod exit;
pub mod file;
pub mod help;
pub mod history;

use std::ops::ControlFlow;

use thiserror::Error;
use tokio::sync::mpsc;

use tether_net::Receiver;
use tether_shared::constants::COMMAND_PREFIX;

use crate::events::{emit, SessionEvent};
use crate::session::{Session, SessionOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandInfo {
    pub name: &'static str,
    pub usage: &'static str,
    pub description: &'static str,
}

pub const COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        name: "exit",
        usage: "/exit",
        description: "Leave the chat and notify the peer",
    },
    CommandInfo {
        name: "file",
        usage: "/file [path]",
        description: "Send a file to the peer",
    },
    CommandInfo {
        name: "clear",
        usage: "/clear",
        description: "Delete the chat history with this peer",
    },
    CommandInfo {
        name: "history",
        usage: "/history",
        description: "Show the chat history with this peer",
    },
    CommandInfo {
        name: "help",
        usage: "/help",
        description: "Show this list",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    File(Option<String>),
    Clear,
    History,
    Help,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: /{0} (type /help for the list)")]
    Unknown(String),

    #[error("/{0} takes no arguments")]
    UnexpectedArgument(&'static str),
}

impl Command {
    /// `None` when `input` is not a command at all.
    pub fn parse(input: &str) -> Option<Result<Self, CommandError>> {
        let body = input.trim().strip_prefix(COMMAND_PREFIX)?;

        let (name, arg) = match body.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, Some(rest.trim()).filter(|r| !r.is_empty())),
            None => (body, None),
        };

        let no_arg = |cmd: Command, name: &'static str| match arg {
            None => Ok(cmd),
            Some(_) => Err(CommandError::UnexpectedArgument(name)),
        };

        let parsed = match name.to_ascii_lowercase().as_str() {
            "exit" | "quit" => no_arg(Self::Exit, "exit"),
            "file" => Ok(Self::File(arg.map(str::to_string))),
            "clear" => no_arg(Self::Clear, "clear"),
            "history" => no_arg(Self::History, "history"),
            "help" => no_arg(Self::Help, "help"),
            _ => Err(CommandError::Unknown(name.to_string())),
        };
        Some(parsed)
    }
}

/// What a handler can touch while it runs.
pub struct CommandContext<'a> {
    pub session: &'a Session,
    pub input: &'a mut mpsc::Receiver<String>,
    pub receiver: &'a Receiver,
}

impl CommandContext<'_> {
    /// Ask a question and wait for the next input line. `None` if input ended
    /// or the connection went away while waiting.
    pub async fn prompt(&mut self, question: &str) -> Option<String> {
        emit(
            &self.session.events,
            SessionEvent::Prompt(question.to_string()),
        );

        tokio::select! {
            line = self.input.recv() => line.map(|l| l.trim().to_string()),
            _ = self.receiver.stopped() => None,
        }
    }

    pub async fn confirm(&mut self, question: &str) -> bool {
        match self.prompt(&format!("{question} (y/N) ")).await {
            Some(answer) => matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"),
            None => false,
        }
    }
}

pub async fn dispatch(command: Command, ctx: &mut CommandContext<'_>) -> ControlFlow<SessionOutcome> {
    match command {
        Command::Exit => exit::run(ctx).await,
        Command::File(path) => file::run(ctx, path).await,
        Command::Clear => clear::run(ctx).await,
        Command::History => history::run(ctx).await,
        Command::Help => help::run(ctx).await,
    }
}
