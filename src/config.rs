use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};

use crate::{Error, Result, DEFAULT_API_URL, PLACEHOLDER_HOSTNAME};

/// Command line of the `postarchive` binary.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Posterous hostname, without the trailing `.posterous.com`.
    #[arg(long, default_value = PLACEHOLDER_HOSTNAME)]
    pub hostname: String,

    /// Where the `xml` and `files` directories are kept.
    #[arg(long, default_value = "backup")]
    pub backup_dir: PathBuf,

    /// Base URL of the metadata API.
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Maximum number of files downloaded at the same time.
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Per request timeout, in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// How asset urls are discovered inside the metadata.
    #[arg(long, value_enum, default_value_t = ExtractorKind::Pattern)]
    pub extractor: ExtractorKind,

    /// Skip fetching metadata and re-scan an existing xml directory instead.
    #[arg(long)]
    pub from_xml: Option<PathBuf>,

    /// Stop after the metadata pages are saved.
    #[arg(long, default_value_t = false)]
    pub skip_files: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExtractorKind {
    /// Regex scan of the raw document.
    Pattern,
    /// Walk the XML text nodes and the HTML embedded in them.
    Markup,
}

/// Validated settings shared by every stage of a run.
#[derive(Debug, Clone)]
pub struct Config {
    pub hostname: String,
    pub backup_dir: PathBuf,
    pub api_url: String,
    pub concurrency: usize,
    pub timeout: Duration,
    pub extractor: ExtractorKind,
    pub from_xml: Option<PathBuf>,
    pub skip_files: bool,
}

impl Config {
    /// Returns `Error::Config` when a required setting is missing, before anything touches the network.
    pub fn from_args(args: Args) -> Result<Self> {
        let hostname = args.hostname.trim().to_string();
        if hostname.is_empty() || hostname == PLACEHOLDER_HOSTNAME {
            return Err(Error::Config(
                "you need to pass your posterous hostname with --hostname".into(),
            ));
        }
        if args.concurrency == 0 {
            return Err(Error::Config("--concurrency must be at least 1".into()));
        }
        if args.timeout == 0 {
            return Err(Error::Config("--timeout must be at least 1 second".into()));
        }
        if args.api_url.trim().is_empty() {
            return Err(Error::Config("--api-url can't be empty".into()));
        }

        Ok(Config {
            hostname,
            backup_dir: args.backup_dir,
            api_url: args.api_url.trim_end_matches('/').to_string(),
            concurrency: args.concurrency,
            timeout: Duration::from_secs(args.timeout),
            extractor: args.extractor,
            from_xml: args.from_xml,
            skip_files: args.skip_files,
        })
    }
}
