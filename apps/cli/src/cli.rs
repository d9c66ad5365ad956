//! Command-line arguments

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "rotator",
    version,
    about = "Scheduled password rotation for an account guarded by one-time codes",
    long_about = None
)]
pub struct Cli {
    /// Configuration file (TOML); `ROTATOR_*` variables override it
    #[arg(short, long, global = true, env = "ROTATOR_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// More log output; repeat for more
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the rotation scheduler until interrupted
    Start,

    /// Show the schedule and recent history
    Status(StatusArgs),

    /// Rotate now, ignoring the schedule (the rate limit still applies)
    Change(ChangeArgs),

    /// Generate passwords with the configured policy and score them
    TestPassword(TestPasswordArgs),

    /// Log in with the stored credential without changing anything
    TestConnection,

    /// Settle an unconfirmed password change
    Resolve(ResolveArgs),
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Recent records to show
    #[arg(short = 'n', long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct ChangeArgs {
    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct TestPasswordArgs {
    /// Passwords to generate
    #[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub count: u32,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// The change took effect; the live password is read from
    /// `ROTATOR_RESOLVED_PASSWORD` or the first line of stdin
    #[arg(long, conflicts_with = "not_applied", required_unless_present = "not_applied")]
    pub applied: bool,

    /// The change did not take effect; the stored password stands
    #[arg(long)]
    pub not_applied: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_resolve_needs_a_verdict() {
        assert!(Cli::try_parse_from(["rotator", "resolve"]).is_err());
        assert!(Cli::try_parse_from(["rotator", "resolve", "--applied", "--not-applied"]).is_err());

        let cli = Cli::try_parse_from(["rotator", "resolve", "--not-applied"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Resolve(ResolveArgs {
                applied: false,
                not_applied: true
            })
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["rotator", "status", "-vv", "--config", "x.toml"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }
}
