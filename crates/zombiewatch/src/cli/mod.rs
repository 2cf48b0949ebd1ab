//! Command-line interface for zombiewatch.
//!
//! This module provides the CLI structure for the `zombiewatch` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, LocationsCommand, ServeCommand, StatusCommand};

/// zombiewatch - Track driver locations and spot zombie drivers
///
/// Records driver GPS locations and flags drivers that have barely moved
/// over a recent time window.
#[derive(Debug, Parser)]
#[command(name = "zombiewatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server and the ingestion workers
    Serve(ServeCommand),

    /// Show recent locations of a driver
    Locations(LocationsCommand),

    /// Show whether a driver is a zombie
    Status(StatusCommand),

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.verbose, self.quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Verbosity;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
        assert_eq!(Cli::command().get_name(), "zombiewatch");
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(
            parse(&["zombiewatch", "-q", "config", "path"]).verbosity(),
            Verbosity::Quiet
        );
        assert_eq!(
            parse(&["zombiewatch", "config", "path"]).verbosity(),
            Verbosity::Normal
        );
        assert_eq!(
            parse(&["zombiewatch", "-v", "config", "path"]).verbosity(),
            Verbosity::Verbose
        );
        assert_eq!(
            parse(&["zombiewatch", "-vv", "config", "path"]).verbosity(),
            Verbosity::Trace
        );
    }

    #[test]
    fn test_parse_serve() {
        let cli = parse(&["zombiewatch", "serve", "--port", "9000"]);
        match cli.command {
            Command::Serve(cmd) => {
                assert_eq!(cmd.port, Some(9000));
                assert!(cmd.host.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_locations() {
        let cli = parse(&["zombiewatch", "locations", "foo", "--minutes", "10", "--json"]);
        match cli.command {
            Command::Locations(cmd) => {
                assert_eq!(cmd.driver, "foo");
                assert_eq!(cmd.minutes, 10);
                assert!(cmd.json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_locations_default_minutes() {
        let cli = parse(&["zombiewatch", "locations", "foo"]);
        assert!(matches!(
            cli.command,
            Command::Locations(LocationsCommand { minutes: 5, .. })
        ));
    }

    #[test]
    fn test_parse_locations_rejects_negative_minutes() {
        assert!(Cli::try_parse_from(["zombiewatch", "locations", "foo", "-m", "-1"]).is_err());
    }

    #[test]
    fn test_parse_status() {
        let cli = parse(&["zombiewatch", "status", "foo"]);
        assert!(matches!(cli.command, Command::Status(StatusCommand { json: false, .. })));
    }

    #[test]
    fn test_parse_status_requires_driver() {
        assert!(Cli::try_parse_from(["zombiewatch", "status"]).is_err());
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = parse(&["zombiewatch", "config", "validate", "--file", "/tmp/z.toml"]);
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: Some(_) })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["zombiewatch", "-c", "/custom/config.toml", "status", "foo"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }
}
