//! Thread management commands and shared printing helpers

use crate::backend::Backend;
use crate::citations::Citation;
use crate::commands::{backend_from_config, connect};
use crate::config::Config;
use crate::conversation::{Message, ReferenceState, Role, ThreadSummary};
use crate::credentials::KeyStore;
use crate::error::Result;
use colored::Colorize;
use prettytable::{format, Table};

/// Print the saved threads as a table
pub async fn list_threads(config: Config) -> Result<()> {
    let backend = backend_from_config(&config, &KeyStore::default())?;
    let threads = backend.list_threads().await?;
    print_threads(&threads, None);
    Ok(())
}

/// Print the history of a thread with its citations
pub async fn show_history(config: Config, id: String) -> Result<()> {
    let (controller, _events) = connect(&config, &KeyStore::default())?;
    controller.select_conversation(&id).await?;

    println!("\n{} {}\n", "Thread".bold(), id.cyan());
    print_messages(&controller.messages().await);
    print_reference(&controller.reference().await);
    Ok(())
}

/// Rename a thread
pub async fn rename_thread(config: Config, id: String, title: String) -> Result<()> {
    let backend = backend_from_config(&config, &KeyStore::default())?;
    backend.rename_thread(&id, title.trim()).await?;
    println!("{}", format!("Renamed {} to \"{}\"", id, title.trim()).green());
    Ok(())
}

/// Delete a thread
pub async fn delete_thread(config: Config, id: String) -> Result<()> {
    let backend = backend_from_config(&config, &KeyStore::default())?;
    backend.delete_thread(&id).await?;
    println!("{}", format!("Deleted thread {}", id).green());
    Ok(())
}

/// Render threads in a table, marking `active` if given
pub fn print_threads(threads: &[ThreadSummary], active: Option<&str>) {
    if threads.is_empty() {
        println!("{}", "No saved threads found.".yellow());
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "".bold(),
        "ID".bold(),
        "Title".bold(),
        "Created".bold()
    ]);

    for thread in threads {
        let marker = if active == Some(thread.id.as_str()) {
            "*".green().to_string()
        } else {
            String::new()
        };
        let title = truncate_chars(&thread.title, 40);
        let created = thread.created_at.as_deref().unwrap_or("-");
        table.add_row(prettytable::row![marker, thread.id.cyan(), title, created]);
    }

    println!("\nSaved Threads:");
    table.printstd();
    println!();
    println!("Use {} to resume a thread.", "travai chat --thread <ID>".cyan());
    println!();
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Formats citations as a short page list
///
/// # Examples
///
/// ```
/// use travai::citations::Citation;
/// use travai::commands::threads::format_citations;
///
/// assert_eq!(format_citations(&[Citation::new(12), Citation::new(30)]), "p. 12, p. 30");
/// ```
pub fn format_citations(citations: &[Citation]) -> String {
    citations
        .iter()
        .map(|c| format!("p. {}", c.page))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Print a message list with roles, tool calls and citations
pub fn print_messages(messages: &[Message]) {
    for message in messages {
        let label = match message.role {
            Role::User => "you".green().bold(),
            Role::Assistant => "guide".cyan().bold(),
            Role::System => "system".dimmed(),
        };
        println!("{}> {}", label, message.content);

        for call in &message.tool_calls {
            println!("  {} {}", "tool".magenta(), call.name);
        }
        if !message.citations.is_empty() {
            println!(
                "  {} {}",
                "Sources:".dimmed(),
                format_citations(&message.citations)
            );
        }
        println!();
    }
}

/// Print the current reference page
pub fn print_reference(reference: &ReferenceState) {
    match reference.page {
        Some(page) => {
            println!("{} {}", "Reference page:".bold(), page.to_string().cyan());
            if !reference.citations.is_empty() {
                println!(
                    "{} {}",
                    "Cited:".dimmed(),
                    format_citations(&reference.citations)
                );
            }
        }
        None => println!("{}", "No reference page selected.".yellow()),
    }
}
