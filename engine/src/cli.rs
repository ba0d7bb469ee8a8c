//! CLI interface for Bindery
//!
//! Commands and global flags, defined with clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Bindery protein binder design agent
///
/// Chats with a language model that can fetch structures, inspect them and
/// run binder design jobs on your machine.
#[derive(Parser, Debug)]
#[command(name = "bindery")]
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
    /// Talk to the agent; without --message starts an interactive session
    Chat {
        /// Send a single message and exit when the turn is done
        #[arg(short, long)]
        message: Option<String>,

        /// Continue an existing conversation id
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Show stored conversation messages
    History {
        /// Only show this conversation
        #[arg(short, long)]
        conversation: Option<String>,

        /// Number of messages to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show the recorded lifecycle of a design job
    JobsLog {
        /// Job ID
        job_id: String,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_defaults() {
        let cli = Cli::parse_from(["bindery", "chat"]);
        assert!(matches!(
            cli.command,
            Command::Chat {
                message: None,
                conversation: None
            }
        ));
        assert!(!cli.json);
        assert!(cli.log.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["bindery", "chat", "--json", "--log", "debug"]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));
    }

    #[test]
    fn test_chat_message() {
        let cli = Cli::parse_from(["bindery", "chat", "-m", "fetch 6AL5"]);
        if let Command::Chat { message, .. } = cli.command {
            assert_eq!(message.as_deref(), Some("fetch 6AL5"));
        } else {
            panic!("Expected Chat command");
        }
    }

    #[test]
    fn test_history_command() {
        let cli = Cli::parse_from(["bindery", "history", "--conversation", "c1", "--limit", "5"]);
        if let Command::History {
            conversation,
            limit,
        } = cli.command
        {
            assert_eq!(conversation.as_deref(), Some("c1"));
            assert_eq!(limit, 5);
        } else {
            panic!("Expected History command");
        }
    }

    #[test]
    fn test_history_default_limit() {
        let cli = Cli::parse_from(["bindery", "history"]);
        assert!(matches!(cli.command, Command::History { limit: 20, .. }));
    }

    #[test]
    fn test_jobs_log_command() {
        let cli = Cli::parse_from(["bindery", "jobs-log", "abc-123"]);
        if let Command::JobsLog { job_id } = cli.command {
            assert_eq!(job_id, "abc-123");
        } else {
            panic!("Expected JobsLog command");
        }
    }

    #[test]
    fn test_config_actions() {
        let cli = Cli::parse_from(["bindery", "--config", "/tmp/b.toml", "config", "path"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/b.toml")));
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Path
            }
        ));
    }
}
