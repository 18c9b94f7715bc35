//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Resumable HTTP downloads and uploads.
///
/// Interrupted downloads resume from the bytes already on disk the next time
/// the same URL is fetched into the same directory.
#[derive(Parser, Debug)]
#[command(name = "transfer")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print a JSON summary on stdout instead of a progress bar
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// HTTP connect timeout in seconds (1-3600)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub connect_timeout: Option<u64>,

    /// HTTP read timeout in seconds (1-3600)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub read_timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Transfer direction.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download a URL, resuming a partial file when one exists
    Download(DownloadArgs),
    /// Upload a local file with a single POST
    Upload(UploadArgs),
}

/// Arguments for `transfer download`.
#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    /// URL to download
    pub url: String,

    /// Storage root directory (defaults to the config value, then ".")
    #[arg(short = 'o', long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Subdirectory under the root to store the file in
    #[arg(short = 'd', long, value_name = "DIR", default_value = "")]
    pub dir: PathBuf,

    /// Store the file under this name instead of the URL's last path segment
    #[arg(long, value_name = "NAME")]
    pub rename: Option<String>,

    /// SQLite file holding resume records (defaults to <root>/.transfer-state.db)
    #[arg(long, value_name = "PATH")]
    pub state_db: Option<PathBuf>,
}

/// Arguments for `transfer upload`.
#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    /// Destination URL
    pub url: String,

    /// File to send
    pub file: PathBuf,

    /// Content-Type header for the request body
    #[arg(long, value_name = "MIME")]
    pub content_type: Option<String>,
}
