mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use onedrive_core::{ConflictBehavior, DriveClient};
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;

#[derive(Debug, Parser)]
#[command(name = "odrive", version, about = "Command line client for OneDrive drives")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Remote items are paths relative to the drive root, or `id:<item-id>`.
#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Show the metadata of an item
    Info {
        item: String,
        #[arg(long, value_delimiter = ',')]
        select: Vec<String>,
    },
    /// List the children of a folder
    Ls {
        #[arg(default_value = "/")]
        folder: String,
        /// Follow paging links until the listing is complete
        #[arg(long)]
        all: bool,
    },
    /// Create a folder
    Mkdir {
        parent: String,
        name: String,
        #[arg(long, value_enum, default_value_t = ConflictArg::Rename)]
        conflict: ConflictArg,
    },
    /// Move an item under another folder
    Mv {
        item: String,
        parent_id: String,
        #[arg(long)]
        name: Option<String>,
    },
    Rename {
        item: String,
        name: String,
    },
    /// Start a server-side copy and print the monitor URL
    Cp {
        item: String,
        parent_id: String,
        #[arg(long)]
        drive_id: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Move an item to the recycle bin
    Rm { item: String },
    Search {
        text: String,
        #[arg(long, default_value = "/")]
        folder: String,
    },
    /// Print one page of changes, starting from `--token` when given
    Delta {
        #[arg(default_value = "/")]
        folder: String,
        #[arg(long)]
        token: Option<String>,
    },
    Thumbnails { item: String },
    /// Print a short-lived download URL
    DownloadUrl {
        item: String,
        /// Byte range as `start-end`, inclusive
        #[arg(long, value_parser = commands::parse_range)]
        range: Option<(u64, u64)>,
    },
    /// Upload a local file to a remote path
    Upload {
        local: PathBuf,
        remote: String,
        #[arg(long, value_enum, default_value_t = ConflictArg::Rename)]
        conflict: ConflictArg,
        /// Use an upload session even for small files
        #[arg(long)]
        session: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConflictArg {
    Rename,
    Replace,
    Fail,
}

impl From<ConflictArg> for ConflictBehavior {
    fn from(value: ConflictArg) -> Self {
        match value {
            ConflictArg::Rename => ConflictBehavior::Rename,
            ConflictArg::Replace => ConflictBehavior::Replace,
            ConflictArg::Fail => ConflictBehavior::Fail,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = CliConfig::from_env()?;
    let mut client = DriveClient::with_base_url(&config.graph_url, config.access_token.clone())?;
    client.set_drive(config.drive.clone());
    client.set_max_duration(config.max_duration);

    commands::run(cli.command, &client, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(std::iter::once("odrive").chain(args.iter().copied()))
            .unwrap()
            .command
    }

    #[test]
    fn ls_defaults_to_root() {
        assert_eq!(
            parse(&["ls"]),
            Command::Ls {
                folder: "/".into(),
                all: false
            }
        );
    }

    #[test]
    fn upload_accepts_conflict_and_session_flags() {
        assert_eq!(
            parse(&["upload", "./a.bin", "Backups/a.bin", "--conflict", "replace", "--session"]),
            Command::Upload {
                local: PathBuf::from("./a.bin"),
                remote: "Backups/a.bin".into(),
                conflict: ConflictArg::Replace,
                session: true,
            }
        );
    }

    #[test]
    fn info_splits_select_fields() {
        assert_eq!(
            parse(&["info", "id:ABC", "--select", "id,name"]),
            Command::Info {
                item: "id:ABC".into(),
                select: vec!["id".into(), "name".into()],
            }
        );
    }

    #[test]
    fn download_url_parses_range() {
        assert_eq!(
            parse(&["download-url", "a.txt", "--range", "0-99"]),
            Command::DownloadUrl {
                item: "a.txt".into(),
                range: Some((0, 99)),
            }
        );
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["odrive", "sync"]).is_err());
    }
}
