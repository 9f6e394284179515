use std::{fmt, path::PathBuf, sync::Arc};

use chrono::Local;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    download::{download_all, DownloadReport},
    extract::{derive_originals, extract_dir, extractor_for},
    info_time,
    parse::PageSummary,
    request::Remote,
    store::BackupRun,
    Error, Result,
};

/// What a finished backup did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSummary {
    pub xml_dir: PathBuf,
    /// `None` when the metadata phase was skipped.
    pub pages_saved: Option<usize>,
    pub urls_found: usize,
    pub originals_derived: usize,
    pub downloads: DownloadReport,
}

impl fmt::Display for BackupSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(pages) = self.pages_saved {
            write!(f, "{pages} pages saved, ")?;
        }
        write!(
            f,
            "{} file urls + {} originals from {}; {}",
            self.urls_found,
            self.originals_derived,
            self.xml_dir.display(),
            self.downloads
        )
    }
}

/// Saves metadata pages until one comes back without posts. Returns the number of pages saved.
///
/// A page is written before its status is looked at, so a page the service flagged as failed
/// stays on disk next to the ones before it.
pub async fn backup_pages<R: Remote + ?Sized>(
    remote: &R,
    run: &mut BackupRun,
    cancel: &CancellationToken,
) -> Result<usize> {
    let start_time = Local::now();
    run.create_xml_dir().await?;

    let mut page = 1;
    loop {
        let xml = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            res = remote.fetch_page(page) => res.map_err(|source| Error::Network {
                url: remote.page_url(page),
                source,
            })?,
        };

        let summary = PageSummary::parse(page, &xml)?;
        if !summary.has_posts() {
            // No posts means the previous page was the last.
            info_time!("page {page} is empty, stopping");
            break;
        }

        info_time!("saving xml for page {page}");
        run.write_page(page, &xml).await?;

        if !summary.is_ok(page)? {
            return Err(Error::ServiceReported {
                page,
                stat: summary.stat(page)?.to_string(),
            });
        }
        page += 1;
    }

    let saved = page - 1;
    info_time!(start_time, "Saved {saved} pages to {}", run.xml_dir.display());
    Ok(saved)
}

/// A whole backup: metadata pages, then every file they mention plus the originals of the
/// scaled variants.
pub async fn run<R: Remote>(
    config: &Config,
    remote: Arc<R>,
    cancel: CancellationToken,
) -> Result<BackupSummary> {
    let (run, pages_saved) = match &config.from_xml {
        Some(xml_dir) => {
            info_time!("Re-using metadata in {}", xml_dir.display());
            (BackupRun::resume(&config.backup_dir, xml_dir.clone()), None)
        }
        None => {
            let mut run = BackupRun::new(&config.backup_dir);
            let saved = backup_pages(remote.as_ref(), &mut run, &cancel).await?;
            (run, Some(saved))
        }
    };

    let mut summary = BackupSummary {
        xml_dir: run.xml_dir.clone(),
        pages_saved,
        urls_found: 0,
        originals_derived: 0,
        downloads: DownloadReport::default(),
    };
    if config.skip_files {
        return Ok(summary);
    }

    let mut urls = extract_dir(&run.xml_dir, extractor_for(config.extractor)).await?;
    let originals = derive_originals(&urls);
    summary.urls_found = urls.len();
    summary.originals_derived = originals.len();
    urls.extend(originals);

    summary.downloads =
        download_all(remote, &run.files_dir, urls, config.concurrency, cancel).await?;
    Ok(summary)
}
