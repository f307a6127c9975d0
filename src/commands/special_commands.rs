//! Special commands parser for interactive chat mode
//!
//! Special commands manage conversations and the reference page instead of
//! being sent to the guide. They are prefixed with `/`; the command word is
//! case-insensitive, arguments are kept as typed.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Start a fresh conversation
    NewConversation,

    /// List saved threads
    ListThreads,

    /// Open a thread and load its history
    OpenThread(String),

    /// Delete a thread
    DeleteThread(String),

    /// Rename the active thread
    RenameThread(String),

    /// Show the reference page and its citations
    ShowSources,

    /// Jump to a page of the guide
    SetPage(u32),

    /// Store a new API key
    SetKey(String),

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command
    ///
    /// The input should be sent to the guide as a question.
    None,
}

fn required_arg(command: &str, usage: &str, arg: &str) -> Result<String, CommandError> {
    if arg.is_empty() {
        Err(CommandError::MissingArgument {
            command: command.to_string(),
            usage: usage.to_string(),
        })
    } else {
        Ok(arg.to_string())
    }
}

/// Parse user input into a special command
///
/// # Examples
///
/// ```
/// use travai::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/new").unwrap(), SpecialCommand::NewConversation);
/// assert_eq!(parse_special_command("/PAGE 12").unwrap(), SpecialCommand::SetPage(12));
/// assert_eq!(parse_special_command("Where is Wat Pho?").unwrap(), SpecialCommand::None);
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if lower == "exit" || lower == "quit" {
        return Ok(SpecialCommand::Exit);
    }
    if !trimmed.starts_with('/') {
        return Ok(SpecialCommand::None);
    }

    let (command, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((command, arg)) => (command.to_lowercase(), arg.trim()),
        None => (lower.clone(), ""),
    };

    match command.as_str() {
        "/new" => Ok(SpecialCommand::NewConversation),
        "/threads" | "/list" => Ok(SpecialCommand::ListThreads),
        "/open" => required_arg("/open", "/open <thread-id>", arg).map(SpecialCommand::OpenThread),
        "/delete" => {
            required_arg("/delete", "/delete <thread-id>", arg).map(SpecialCommand::DeleteThread)
        }
        "/rename" => required_arg("/rename", "/rename <title>", arg).map(SpecialCommand::RenameThread),
        "/sources" => Ok(SpecialCommand::ShowSources),
        "/page" => {
            let arg = required_arg("/page", "/page <number>", arg)?;
            match arg.parse::<u32>() {
                Ok(page) if page >= 1 => Ok(SpecialCommand::SetPage(page)),
                _ => Err(CommandError::UnsupportedArgument {
                    command: "/page".to_string(),
                    arg,
                }),
            }
        }
        "/key" => required_arg("/key", "/key <api-key>", arg).map(SpecialCommand::SetKey),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/exit" | "/quit" => Ok(SpecialCommand::Exit),
        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Print help for special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat
=====================================

CONVERSATIONS:
  /new             - Start a new conversation
  /threads         - List saved threads
  /open <id>       - Open a thread and load its history
  /rename <title>  - Rename the current thread
  /delete <id>     - Delete a thread

GUIDE PAGES:
  /sources         - Show the reference page and cited pages
  /page <n>        - Jump to page n of the guide

CREDENTIALS:
  /key <value>     - Store a new API key

SESSION:
  /help            - Show this help message
  /exit, exit      - Leave the chat

Press Ctrl-C while an answer is streaming to stop it.
"#
    );
}
