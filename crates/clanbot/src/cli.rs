use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "clanbot")]
#[command(author, version, about = "Telegram bot that handles clan membership applications", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the bot (long polling)
    Run,

    /// Apply database migrations and exit
    Migrate,

    /// Load the configuration, print a summary and exit
    CheckConfig,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_no_subcommand() {
        let cli = Cli::try_parse_from(["clanbot"]).unwrap();
        assert_eq!(cli.command, None);
    }

    #[test]
    fn test_subcommands() {
        let cli = Cli::try_parse_from(["clanbot", "migrate"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Migrate));

        let cli = Cli::try_parse_from(["clanbot", "check-config"]).unwrap();
        assert_eq!(cli.command, Some(Commands::CheckConfig));

        assert!(Cli::try_parse_from(["clanbot", "deploy"]).is_err());
    }
}
