/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes these top-level command modules:

- `chat`: Interactive streaming chat
- `threads`: Thread listing, history, rename and delete
- `auth`: API key storage helper
*/

use crate::backend::HttpBackend;
use crate::config::Config;
use crate::credentials::{resolve_api_key, KeyStore};
use crate::error::{Result, TravaiError};
use crate::session::{ChatEvent, ControllerSettings, StreamController};
use colored::Colorize;
use std::sync::Arc;
use tokio::sync::mpsc;

// Special commands parser for the chat REPL
pub mod special_commands;

// Thread management commands
pub mod threads;

/// Builds the HTTP backend with the resolved API key
pub fn backend_from_config(config: &Config, key_store: &KeyStore) -> Result<HttpBackend> {
    let api_key = resolve_api_key(config, key_store);
    if api_key.is_none() {
        tracing::warn!("No API key configured; the server will reject requests until one is set");
    }
    HttpBackend::from_config(&config.server, api_key)
}

/// Builds a controller talking to the configured server
pub fn connect(
    config: &Config,
    key_store: &KeyStore,
) -> Result<(StreamController, mpsc::UnboundedReceiver<ChatEvent>)> {
    let backend = backend_from_config(config, key_store)?;
    Ok(StreamController::new(
        Arc::new(backend),
        ControllerSettings::from_config(config),
    ))
}

/// Prints a backend error, pointing at `/key` when the key was rejected
fn report_error(error: &anyhow::Error) {
    if TravaiError::is_unauthorized_error(error) {
        eprintln!(
            "{}",
            "The server rejected the API key. Set a new one with /key <value>.".yellow()
        );
    } else {
        eprintln!("{}", format!("Error: {}", error).red());
    }
}

// Chat command handler
pub mod chat {
    //! Interactive chat mode handler.
    //!
    //! Runs a readline loop. Plain input starts a streaming turn whose text is
    //! printed as the typewriter reveals it; `/` commands manage threads.
    //! Ctrl-C while an answer streams stops that answer.

    use super::*;
    use crate::commands::special_commands::{parse_special_command, print_help, SpecialCommand};
    use crate::commands::threads::{format_citations, print_messages, print_reference, print_threads};
    use crate::session::controller::AUTHORIZATION_NOTICE;
    use crate::session::{TurnHandle, TurnOutcome};
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use std::collections::HashSet;
    use std::io::Write;

    /// Opening of a fenced block; text from here on is held until finalization
    const FENCE: &str = "```";

    /// Decides which revealed text can be printed immediately
    ///
    /// A terminal cannot take back printed text, so anything from the first
    /// code fence on is held until the final message is known. The trailing
    /// citation block is then never shown, while other fenced blocks are
    /// printed once the answer is final.
    #[derive(Debug, Default)]
    pub struct RevealPrinter {
        revealed: String,
        printed: usize,
    }

    impl RevealPrinter {
        /// Creates an empty printer
        pub fn new() -> Self {
            Self::default()
        }

        /// Adds revealed text and returns the part that is safe to print
        pub fn push(&mut self, delta: &str) -> String {
            self.revealed.push_str(delta);
            let limit = match self.revealed.find(FENCE) {
                Some(fence) => fence,
                // A trailing backtick may be the start of a fence.
                None => self.revealed.trim_end_matches('`').len(),
            };
            if limit <= self.printed {
                return String::new();
            }
            let out = self.revealed[self.printed..limit].to_string();
            self.printed = limit;
            out
        }

        /// Returns the rest of `final_text` not yet printed and resets
        pub fn finish(&mut self, final_text: &str) -> String {
            let printed = &self.revealed[..self.printed];
            let out = if let Some(rest) = final_text.strip_prefix(printed) {
                rest.to_string()
            } else {
                // Finalization trims the text around a removed citation block.
                match final_text.trim_start().strip_prefix(printed.trim()) {
                    Some(rest) if printed.ends_with(char::is_whitespace) => {
                        rest.trim_start().to_string()
                    }
                    Some(rest) => rest.to_string(),
                    None => format!("\n{}", final_text),
                }
            };
            self.revealed.clear();
            self.printed = 0;
            out
        }
    }

    /// Start interactive chat mode
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `thread` - Optional thread id to resume
    ///
    /// # Examples
    ///
    /// ```
    /// use travai::commands::chat;
    /// use travai::config::Config;
    ///
    /// // In application code:
    /// // chat::run_chat(Config::default(), None).await?;
    /// ```
    pub async fn run_chat(config: Config, thread: Option<String>) -> Result<()> {
        tracing::info!("Starting interactive chat");

        let key_store = KeyStore::default();
        let (controller, mut events) = connect(&config, &key_store)?;
        let mut rl = DefaultEditor::new()?;

        print_welcome_banner(&config);

        if let Err(e) = controller.refresh_threads().await {
            tracing::debug!("Initial thread refresh failed: {}", e);
            report_error(&e);
        }

        if let Some(id) = thread {
            if let Err(e) = controller.select_conversation(&id).await {
                report_error(&e);
            }
        }
        print_messages(&controller.messages().await);

        loop {
            let prompt = format!("{} ", "you>".green().bold());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(trimmed)?;

                    match parse_special_command(trimmed) {
                        Ok(SpecialCommand::None) => {}
                        Ok(SpecialCommand::Exit) => break,
                        Ok(command) => {
                            handle_special_command(&controller, &key_store, command).await;
                            continue;
                        }
                        Err(e) => {
                            eprintln!("{}", e.to_string().red());
                            continue;
                        }
                    }

                    // Events from history loads and thread refreshes are
                    // already reflected in the store.
                    while events.try_recv().is_ok() {}

                    let conversation_id = controller.active_id().await;
                    let turn = controller.start(&conversation_id, trimmed).await?;
                    if stream_turn(&controller, &mut events, turn).await == TurnOutcome::Unauthorized
                    {
                        prompt_for_key(&mut rl, &controller, &key_store)?;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }
        }

        controller.cancel().await;
        println!("Goodbye!");
        Ok(())
    }

    /// Renders one turn until it ends; Ctrl-C cancels it
    async fn stream_turn(
        controller: &StreamController,
        events: &mut mpsc::UnboundedReceiver<ChatEvent>,
        turn: TurnHandle,
    ) -> TurnOutcome {
        let mut printer = RevealPrinter::new();
        let mut announced = HashSet::new();
        print!("{} ", "guide>".cyan().bold());
        flush();

        let wait = turn.wait();
        tokio::pin!(wait);

        let outcome = loop {
            tokio::select! {
                outcome = &mut wait => break outcome,
                Some(event) = events.recv() => render_event(&mut printer, &mut announced, event),
                _ = tokio::signal::ctrl_c() => {
                    controller.cancel().await;
                }
            }
        };
        while let Ok(event) = events.try_recv() {
            render_event(&mut printer, &mut announced, event);
        }

        match &outcome {
            TurnOutcome::Completed(_) => {}
            TurnOutcome::Cancelled => println!("\n"),
            TurnOutcome::Failed(message) => {
                eprintln!("\n{}\n", format!("Error: {}", message).red())
            }
            TurnOutcome::Unauthorized => eprintln!("\n{}\n", AUTHORIZATION_NOTICE.yellow()),
        }
        outcome
    }

    fn render_event(printer: &mut RevealPrinter, announced: &mut HashSet<i64>, event: ChatEvent) {
        match event {
            ChatEvent::Revealed { delta, .. } => {
                print!("{}", printer.push(&delta));
                flush();
            }
            ChatEvent::ToolCallsUpdated { tool_calls, .. } => {
                for call in tool_calls.iter().filter(|c| !c.name.is_empty()) {
                    if announced.insert(call.index) {
                        print!("{} ", format!("[{}]", call.name).magenta());
                        flush();
                    }
                }
            }
            ChatEvent::Finalized {
                message,
                reference_page,
                ..
            } => {
                println!("{}", printer.finish(&message.content));
                if !message.citations.is_empty() {
                    println!(
                        "  {} {}",
                        "Sources:".dimmed(),
                        format_citations(&message.citations)
                    );
                }
                if let Some(page) = reference_page {
                    println!("  {} {}", "Reference page:".dimmed(), page);
                }
                println!();
            }
            other => tracing::debug!("Chat event: {:?}", other),
        }
    }

    fn flush() {
        let _ = std::io::stdout().flush();
    }

    async fn handle_special_command(
        controller: &StreamController,
        key_store: &KeyStore,
        command: SpecialCommand,
    ) {
        match command {
            SpecialCommand::NewConversation => {
                let id = controller.new_conversation().await;
                println!("{} {}\n", "New conversation".green(), id.dimmed());
                print_messages(&controller.messages().await);
            }
            SpecialCommand::ListThreads => match controller.refresh_threads().await {
                Ok(threads) => {
                    let active = controller.active_id().await;
                    print_threads(&threads, Some(active.as_str()));
                }
                Err(e) => report_error(&e),
            },
            SpecialCommand::OpenThread(id) => {
                match controller.select_conversation(&id).await {
                    Ok(()) => {
                        println!("{} {}\n", "Opened".green(), id.cyan());
                        print_messages(&controller.messages().await);
                        print_reference(&controller.reference().await);
                    }
                    Err(e) => report_error(&e),
                }
            }
            SpecialCommand::DeleteThread(id) => {
                match controller.delete_conversation(&id).await {
                    Ok(()) => println!("{}", format!("Deleted thread {}", id).green()),
                    Err(e) => report_error(&e),
                }
                println!(
                    "{} {}\n",
                    "Current conversation:".dimmed(),
                    controller.active_id().await
                );
            }
            SpecialCommand::RenameThread(title) => {
                let id = controller.active_id().await;
                match controller.rename_conversation(&id, &title).await {
                    Ok(()) => println!("{}", format!("Renamed to \"{}\"", title).green()),
                    Err(e) => report_error(&e),
                }
            }
            SpecialCommand::ShowSources => print_reference(&controller.reference().await),
            SpecialCommand::SetPage(page) => {
                controller.set_reference_page(page).await;
                print_reference(&controller.reference().await);
            }
            SpecialCommand::SetKey(key) => {
                if let Err(e) = key_store.store(&key) {
                    tracing::warn!("Could not save API key: {}", e);
                    eprintln!(
                        "{}",
                        "Could not save the key to the keyring; using it for this session only."
                            .yellow()
                    );
                }
                controller.set_api_key(Some(key));
                println!("{}", "API key updated.".green());
            }
            SpecialCommand::Help => print_help(),
            SpecialCommand::Exit | SpecialCommand::None => {}
        }
    }

    fn prompt_for_key(
        rl: &mut DefaultEditor,
        controller: &StreamController,
        key_store: &KeyStore,
    ) -> Result<()> {
        match rl.readline("API key: ") {
            Ok(line) if !line.trim().is_empty() => {
                let key = line.trim().to_string();
                if let Err(e) = key_store.store(&key) {
                    tracing::warn!("Could not save API key: {}", e);
                }
                controller.set_api_key(Some(key));
                println!("{}", "API key updated. Send your question again.".green());
                Ok(())
            }
            Ok(_) | Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn print_welcome_banner(config: &Config) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║              Travai Thailand Guide - Welcome!                ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!("Server: {}", config.server.base_url.cyan());
        println!("Type '/help' for available commands, 'exit' to quit\n");
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn push_all(printer: &mut RevealPrinter, deltas: &[&str]) -> String {
            deltas.iter().map(|d| printer.push(d)).collect()
        }

        #[test]
        fn test_plain_answer_prints_everything() {
            let mut printer = RevealPrinter::new();
            let shown = push_all(&mut printer, &["It's ", "in ", "Bangkok."]);
            assert_eq!(shown, "It's in Bangkok.");
            assert_eq!(printer.finish("It's in Bangkok."), "");
        }

        #[test]
        fn test_leading_newlines_are_not_printed_twice() {
            let mut printer = RevealPrinter::new();
            let text = "\n\nBangkok is the capital.";
            assert_eq!(printer.push(text), text);
            assert_eq!(printer.finish(text), "");

            printer.push(text);
            assert_eq!(printer.finish("Bangkok is the capital."), "");
        }

        #[test]
        fn test_citation_block_is_never_printed() {
            let mut printer = RevealPrinter::new();
            let shown = push_all(
                &mut printer,
                &[
                    "It's in ",
                    "Bangkok.\n",
                    "``",
                    "`json\n{\"sources\": [{\"page\": 12}]}\n",
                    "```",
                ],
            );
            assert_eq!(shown, "It's in Bangkok.\n");
            assert_eq!(printer.finish("It's in Bangkok."), "");
        }

        #[test]
        fn test_inline_backticks_are_released() {
            let mut printer = RevealPrinter::new();
            assert_eq!(printer.push("Order `"), "Order ");
            assert_eq!(printer.push("khao soi` here"), "`khao soi` here");
        }

        #[test]
        fn test_other_code_blocks_print_at_finish() {
            let mut printer = RevealPrinter::new();
            let text = "Phrase:\n```\nkhop khun krap\n```";
            let shown = push_all(&mut printer, &[text]);
            assert_eq!(shown, "Phrase:\n");
            assert_eq!(printer.finish(text), "```\nkhop khun krap\n```");
        }

        #[test]
        fn test_finish_resets_state() {
            let mut printer = RevealPrinter::new();
            printer.push("first");
            printer.finish("first");
            assert_eq!(printer.push("second"), "second");
        }

        #[test]
        fn test_unexpected_final_text_is_printed_whole() {
            let mut printer = RevealPrinter::new();
            printer.push("partial answer");
            assert_eq!(printer.finish("Error: boom"), "\nError: boom");
        }
    }
}

// API key storage handler
pub mod auth {
    use super::*;
    use rustyline::DefaultEditor;

    /// Store (or clear) the API key in the system keyring
    ///
    /// # Arguments
    ///
    /// * `key` - API key; prompted for when `None`
    /// * `clear` - Remove the stored key instead
    pub fn store_api_key(key: Option<String>, clear: bool) -> Result<()> {
        let store = KeyStore::default();
        if clear {
            store.clear()?;
            println!("{}", "Stored API key cleared.".green());
            return Ok(());
        }

        let key = match key {
            Some(key) => key,
            None => {
                let mut rl = DefaultEditor::new()?;
                rl.readline("API key: ")?
            }
        };
        store.store(&key)?;
        println!("{}", "API key stored in the system keyring.".green());
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_store_empty_key_fails() {
            let res = store_api_key(Some("   ".to_string()), false);
            assert!(res.is_err());
        }
    }
}
