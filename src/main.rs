use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use postarchive::{
    config::{Args, Config},
    error_time, info_time, process,
    request::HttpRemote,
    Result,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let start_time = Local::now();
    let args = Args::parse();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info_time!("Received Ctrl-C, stopping");
                cancel.cancel();
            }
        }
    });

    match backup(args, cancel).await {
        Ok(summary) => info_time!(start_time, "Backup finished: {summary}"),
        Err(e) => {
            error_time!("Backup Failed. {e}");
            std::process::exit(1);
        }
    }
}

async fn backup(args: Args, cancel: CancellationToken) -> Result<process::BackupSummary> {
    let config = Config::from_args(args)?;
    let remote = Arc::new(HttpRemote::new(&config)?);
    process::run(&config, remote, cancel).await
}
