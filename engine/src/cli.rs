//! CLI interface for Forge
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::memory::MemoryType;

/// Forge
///
/// Chat with a model that reads and edits the documents in your workspace,
/// and keeps a memory of decisions, lessons and customer conversations.
#[derive(Parser, Debug)]
#[command(name = "forge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one message and print the answer
    Chat {
        /// The message to send
        message: String,

        /// Session to continue (a new one is created when omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Provider to use instead of the configured default
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Chat interactively until EOF or "/quit"
    Repl {
        /// Session to continue (a new one is created when omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Provider to use instead of the configured default
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Manage chat sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Manage long-lived memories
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Print the workspace tree
    Tree,

    /// Manage provider API keys
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Run system diagnostics
    Doctor,
}

/// Session management actions
#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// List all sessions, most recent first
    List,

    /// Show a session with its history
    Show {
        /// Session ID
        id: String,
    },

    /// Rename a session
    Rename {
        /// Session ID
        id: String,
        /// New title (blank leaves the title unchanged)
        title: String,
    },

    /// Delete a session and its history
    Delete {
        /// Session ID
        id: String,
    },
}

/// Memory management actions
#[derive(Subcommand, Debug)]
pub enum MemoryAction {
    /// Store a new memory
    Add {
        /// Memory type (assumption, decision, customer-convo, evidence,
        /// contradiction, lesson, milestone)
        #[arg(short = 't', long = "type")]
        memory_type: MemoryType,

        /// One-line summary
        summary: String,

        /// Longer description
        #[arg(short, long)]
        details: Option<String>,

        /// Idea the memory belongs to (repeatable)
        #[arg(long = "idea")]
        ideas: Vec<String>,

        /// Customer involved (repeatable)
        #[arg(long = "customer")]
        customers: Vec<String>,

        /// Free-form tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Importance between 0 and 1
        #[arg(short, long)]
        importance: Option<f64>,
    },

    /// Rank memories against a query
    Search {
        /// Query text
        query: String,

        /// Active idea, boosts memories about it (repeatable)
        #[arg(long = "idea")]
        ideas: Vec<String>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List every memory in insertion order
    List,

    /// Show one memory
    Show {
        /// Memory ID
        id: String,
    },
}

/// API key management actions
#[derive(Subcommand, Debug)]
pub enum KeyAction {
    /// Store a provider API key in the OS keychain (prompts for the value)
    Set {
        /// Provider name (anthropic, gemini)
        provider: String,
    },

    /// Remove a provider API key from the OS keychain
    Delete {
        /// Provider name (anthropic, gemini)
        provider: String,
    },

    /// Show which providers have a key available
    Status {
        /// Limit the report to one provider
        provider: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["forge", "tree"]);
        assert!(matches!(cli.command, Command::Tree));
        assert!(!cli.json);
        assert!(cli.log.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["forge", "--json", "--log", "debug", "doctor"]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));
    }

    #[test]
    fn test_chat_command() {
        let cli = Cli::parse_from([
            "forge",
            "chat",
            "summarize my inbox",
            "--session",
            "s1",
            "--provider",
            "gemini",
        ]);
        if let Command::Chat {
            message,
            session,
            provider,
        } = cli.command
        {
            assert_eq!(message, "summarize my inbox");
            assert_eq!(session.as_deref(), Some("s1"));
            assert_eq!(provider.as_deref(), Some("gemini"));
        } else {
            panic!("Expected Chat command");
        }
    }

    #[test]
    fn test_sessions_rename() {
        let cli = Cli::parse_from(["forge", "sessions", "rename", "s1", "Launch plan"]);
        if let Command::Sessions {
            action: SessionAction::Rename { id, title },
        } = cli.command
        {
            assert_eq!(id, "s1");
            assert_eq!(title, "Launch plan");
        } else {
            panic!("Expected SessionAction::Rename");
        }
    }

    #[test]
    fn test_memory_add() {
        let cli = Cli::parse_from([
            "forge",
            "memory",
            "add",
            "--type",
            "customer-convo",
            "Jane wants SSO",
            "--idea",
            "acme",
            "--idea",
            "beta",
            "--importance",
            "0.8",
        ]);
        if let Command::Memory {
            action:
                MemoryAction::Add {
                    memory_type,
                    summary,
                    ideas,
                    importance,
                    ..
                },
        } = cli.command
        {
            assert_eq!(memory_type, MemoryType::CustomerConvo);
            assert_eq!(summary, "Jane wants SSO");
            assert_eq!(ideas, vec!["acme", "beta"]);
            assert_eq!(importance, Some(0.8));
        } else {
            panic!("Expected MemoryAction::Add");
        }
    }

    #[test]
    fn test_memory_add_rejects_unknown_type() {
        let result = Cli::try_parse_from(["forge", "memory", "add", "--type", "rumor", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_key_status_optional_provider() {
        let cli = Cli::parse_from(["forge", "key", "status"]);
        assert!(matches!(
            cli.command,
            Command::Key {
                action: KeyAction::Status { provider: None }
            }
        ));
    }
}
