//! CLI interface for DeepSearch
//!
//! Defines the commands and global flags using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// DeepSearch research engine
///
/// Answers questions by searching the web, reading pages and writing a cited
/// answer, within a fixed step budget.
#[derive(Parser, Debug)]
#[command(name = "deepsearch")]
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
    /// Research a question and stream the answer
    Ask {
        /// The question to research
        question: String,

        /// Continue an existing conversation
        #[arg(short, long, value_name = "ID")]
        session: Option<String>,
    },

    /// Show a session's answer after a disconnect
    Resume {
        /// Session ID
        session: String,
    },

    /// Show recent conversations
    History {
        /// Number of sessions to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show a conversation with its research trace
    Show {
        /// Session ID
        session: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_parsing() {
        let cli = Cli::parse_from(["deepsearch", "ask", "what is io_uring?"]);
        if let Command::Ask { question, session } = cli.command {
            assert_eq!(question, "what is io_uring?");
            assert!(session.is_none());
        } else {
            panic!("Expected Ask command");
        }
        assert!(!cli.json);
        assert!(cli.log.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_ask_with_session() {
        let cli = Cli::parse_from(["deepsearch", "ask", "follow up", "--session", "chat_abc"]);
        assert!(matches!(
            cli.command,
            Command::Ask { session: Some(ref s), .. } if s == "chat_abc"
        ));
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from([
            "deepsearch",
            "--json",
            "--log",
            "debug",
            "--config",
            "/tmp/ds.toml",
            "history",
        ]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/ds.toml")));
    }

    #[test]
    fn test_history_command() {
        let cli = Cli::parse_from(["deepsearch", "history", "--limit", "20"]);
        if let Command::History { limit } = cli.command {
            assert_eq!(limit, 20);
        } else {
            panic!("Expected History command");
        }
    }

    #[test]
    fn test_show_and_resume() {
        let cli = Cli::parse_from(["deepsearch", "show", "chat_1"]);
        assert!(matches!(cli.command, Command::Show { ref session } if session == "chat_1"));

        let cli = Cli::parse_from(["deepsearch", "resume", "chat_2"]);
        assert!(matches!(cli.command, Command::Resume { ref session } if session == "chat_2"));
    }
}
