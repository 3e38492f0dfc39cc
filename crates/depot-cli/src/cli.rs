use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "depot",
    about = "Depot binary store administration",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Chain configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Root for default provider locations; overrides the configuration
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the resolved provider chain
    Chain,
    /// Store a file
    Put(PutArgs),
    /// Fetch content by SHA-1
    Get(GetArgs),
    /// Check whether content is stored
    Exists(Sha1Arg),
    /// Remove content from every provider
    Rm(Sha1Arg),
}

#[derive(Args)]
pub struct PutArgs {
    pub file: PathBuf,
    /// Expected SHA-1; the upload is rejected if the content differs
    #[arg(long)]
    pub sha1: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub sha1: String,
    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct Sha1Arg {
    pub sha1: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "depot", "put", "a.jar", "--sha1", "abc", "--base-dir", "/data", "--format", "json",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.base_dir, Some(PathBuf::from("/data")));
        match cli.command {
            Command::Put(args) => {
                assert_eq!(args.file, PathBuf::from("a.jar"));
                assert_eq!(args.sha1.as_deref(), Some("abc"));
            }
            _ => panic!("expected put"),
        }
    }

    #[test]
    fn get_output_is_optional() {
        let cli = Cli::try_parse_from(["depot", "get", "abc"]).unwrap();
        assert!(matches!(cli.command, Command::Get(GetArgs { output: None, .. })));
    }
}
