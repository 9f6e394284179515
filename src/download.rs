use std::{
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::{fs, sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{error_time, extract::strip_file_host, info_time, request::Remote, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded,
    /// The target file was already there, nothing was requested.
    Skipped,
}

/// Tally of one asset phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadReport {
    pub downloaded: usize,
    pub skipped: usize,
    /// Urls mapping onto a path already scheduled in the same phase.
    pub duplicates: usize,
    pub failed: usize,
}

impl fmt::Display for DownloadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloaded, {} already present, {} duplicate urls, {} failed",
            self.downloaded, self.skipped, self.duplicates, self.failed
        )
    }
}

/// Where a file url is mirrored: the path after `/getfile/` replayed under `files_dir`.
///
/// Empty segments are dropped; `.`/`..` segments and urls outside the file host are refused.
pub fn local_asset_path(files_dir: &Path, url: &str) -> Result<PathBuf> {
    let unmappable = || Error::AssetPath(url.to_string());

    let relative = strip_file_host(url).ok_or_else(unmappable)?;
    let mut segments: Vec<&str> = relative.split('/').collect();
    let file_name = segments.pop().filter(|name| !name.is_empty()).ok_or_else(unmappable)?;

    let mut path = files_dir.to_path_buf();
    for segment in segments.into_iter().chain(std::iter::once(file_name)) {
        match segment {
            "" => continue,
            "." | ".." => return Err(unmappable()),
            _ => path.push(segment),
        }
    }
    Ok(path)
}

/// Mirrors one url under `files_dir`, skipping it when the local copy already exists.
pub async fn download_asset<R: Remote + ?Sized>(
    remote: &R,
    files_dir: &Path,
    url: &str,
) -> Result<DownloadOutcome> {
    let path = local_asset_path(files_dir, url)?;
    fetch_to(remote, url, &path).await
}

async fn fetch_to<R: Remote + ?Sized>(remote: &R, url: &str, path: &Path) -> Result<DownloadOutcome> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    // Only a regular file counts as already downloaded; anything else fails at the write.
    if fs::metadata(path).await.is_ok_and(|m| m.is_file()) {
        info_time!("file exists, skipping {}", path.display());
        return Ok(DownloadOutcome::Skipped);
    }

    info_time!("getting ready to download {url} to {}", path.display());
    let bytes = remote
        .fetch_asset(url)
        .await
        .map_err(|source| Error::AssetFetch {
            url: url.to_string(),
            source,
        })?;

    // Only complete files ever appear under the final name.
    let part = part_path(path);
    fs::write(&part, &bytes).await?;
    if let Err(e) = fs::rename(&part, path).await {
        let _ = fs::remove_file(&part).await;
        return Err(e.into());
    }
    info_time!("done {}", path.display());
    Ok(DownloadOutcome::Downloaded)
}

#[inline]
fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

/// Downloads every url with at most `concurrency` requests in flight.
///
/// Urls are started in list order. A url whose local path was already scheduled is counted
/// as a duplicate and never started, so no two tasks write the same file. Per-url failures
/// are logged and counted; only cancellation fails the whole phase.
pub async fn download_all<R: Remote>(
    remote: Arc<R>,
    files_dir: &Path,
    urls: Vec<String>,
    concurrency: usize,
    cancel: CancellationToken,
) -> Result<DownloadReport> {
    let mut report = DownloadReport::default();

    let mut seen = HashSet::new();
    let mut plan = Vec::with_capacity(urls.len());
    for url in urls {
        match local_asset_path(files_dir, &url) {
            Ok(path) if seen.insert(path.clone()) => plan.push((url, path)),
            Ok(_) => report.duplicates += 1,
            Err(e) => {
                error_time!("Download failed: {e}");
                report.failed += 1;
            }
        }
    }
    info_time!(
        "{} files to fetch, {} duplicate urls dropped",
        plan.len(),
        report.duplicates
    );

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut task_set = JoinSet::new();
    let mut cancelled = false;
    for (url, path) in plan {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            permit = semaphore.clone().acquire_owned() => permit.map_err(|_| Error::Cancelled)?,
        };

        task_set.spawn({
            let remote = remote.clone();
            let cancel = cancel.clone();
            async move {
                let _permit = permit;
                let res = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                    res = fetch_to(remote.as_ref(), &url, &path) => res,
                };
                (url, res)
            }
        });
    }

    while let Some(task) = task_set.join_next().await {
        let (url, res) = task?;
        match res {
            Ok(DownloadOutcome::Downloaded) => report.downloaded += 1,
            Ok(DownloadOutcome::Skipped) => report.skipped += 1,
            Err(Error::Cancelled) => cancelled = true,
            Err(e) => {
                error_time!("Download failed for {url}: {e}");
                report.failed += 1;
            }
        }
    }

    if cancelled {
        return Err(Error::Cancelled);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::TempDir;

    use super::*;
    use crate::request::mock::MockRemote;

    const URL: &str = "http://getfile5.posterous.com/getfile/files.posterous.com/blog/XyZ/photo.jpg";

    #[test]
    fn test_local_asset_path_mirrors_remote_path() {
        let files = Path::new("backup/files");
        let path = local_asset_path(files, URL).unwrap();
        assert_eq!(path, Path::new("backup/files/files.posterous.com/blog/XyZ/photo.jpg"));

        // Same remote path behind a different getfile host maps to the same place.
        let other = URL.replace("getfile5", "getfile12");
        assert_eq!(local_asset_path(files, &other).unwrap(), path);
        assert_eq!(local_asset_path(files, URL).unwrap(), path);
    }

    #[test]
    fn test_local_asset_path_refuses_bad_urls() {
        let files = Path::new("files");
        for url in [
            "http://example.com/getfile/a.jpg",
            "http://getfile1.posterous.com/getfile/a/",
            "http://getfile1.posterous.com/getfile/a/../../etc/passwd",
        ] {
            assert!(matches!(local_asset_path(files, url), Err(Error::AssetPath(_))), "{url}");
        }
        assert_eq!(
            local_asset_path(files, "http://getfile1.posterous.com/getfile/a//b.jpg").unwrap(),
            Path::new("files/a/b.jpg")
        );
    }

    #[tokio::test]
    async fn test_download_is_idempotent() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let remote = MockRemote {
            assets: HashMap::from([(URL.to_string(), b"jpeg bytes".to_vec())]),
            ..Default::default()
        };

        let first = download_asset(&remote, temp_dir.path(), URL).await?;
        assert_eq!(first, DownloadOutcome::Downloaded);
        let path = local_asset_path(temp_dir.path(), URL)?;
        assert_eq!(std::fs::read(&path)?, b"jpeg bytes");
        assert!(!part_path(&path).exists());

        let second = download_asset(&remote, temp_dir.path(), URL).await?;
        assert_eq!(second, DownloadOutcome::Skipped);
        assert_eq!(remote.calls(), [URL]);
        assert_eq!(std::fs::read(&path)?, b"jpeg bytes");
        Ok(())
    }

    #[tokio::test]
    async fn test_directory_in_the_way_is_not_a_skip() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let url = "http://getfile5.posterous.com/getfile/a/b";
        let remote = MockRemote {
            assets: HashMap::from([(url.to_string(), b"bytes".to_vec())]),
            ..Default::default()
        };
        let path = local_asset_path(temp_dir.path(), url)?;
        std::fs::create_dir_all(&path)?;

        let res = download_asset(&remote, temp_dir.path(), url).await;
        assert!(matches!(res, Err(Error::Io(_))), "{res:?}");
        assert_eq!(remote.calls(), [url]);
        assert!(path.is_dir());
        assert!(!part_path(&path).exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_is_asset_fetch_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let remote = MockRemote::default();

        let res = download_asset(&remote, temp_dir.path(), URL).await;
        assert!(matches!(res, Err(Error::AssetFetch { .. })));
        assert!(!local_asset_path(temp_dir.path(), URL)?.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_download_all_continues_after_failure() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let missing = URL.replace("photo.jpg", "gone.jpg");
        let remote = Arc::new(MockRemote {
            assets: HashMap::from([(URL.to_string(), b"ok".to_vec())]),
            ..Default::default()
        });

        let report = download_all(
            remote.clone(),
            temp_dir.path(),
            vec![missing.clone(), URL.to_string(), URL.to_string(), "mailto:x".to_string()],
            1,
            CancellationToken::new(),
        )
        .await?;

        assert_eq!(
            report,
            DownloadReport {
                downloaded: 1,
                skipped: 0,
                duplicates: 1,
                failed: 2,
            }
        );
        assert_eq!(remote.calls(), [missing, URL.to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_download_all_with_concurrency() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let urls: Vec<String> = (0..20).map(|i| URL.replace("photo", &format!("photo{i}"))).collect();
        let remote = Arc::new(MockRemote {
            assets: urls.iter().map(|u| (u.clone(), u.clone().into_bytes())).collect(),
            ..Default::default()
        });

        let report = download_all(remote.clone(), temp_dir.path(), urls.clone(), 4, CancellationToken::new()).await?;
        assert_eq!(report.downloaded, 20);
        for url in &urls {
            assert_eq!(std::fs::read(local_asset_path(temp_dir.path(), url)?)?, url.as_bytes());
        }

        let again = download_all(remote.clone(), temp_dir.path(), urls, 4, CancellationToken::new()).await?;
        assert_eq!(again.skipped, 20);
        assert_eq!(remote.calls().len(), 20);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_before_start() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let remote = Arc::new(MockRemote::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let res = download_all(remote.clone(), temp_dir.path(), vec![URL.to_string()], 1, cancel).await;
        assert!(matches!(res, Err(Error::Cancelled)));
        assert!(remote.calls().is_empty());
        Ok(())
    }
}
