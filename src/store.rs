use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use tokio::fs;

use crate::{Result, FILES_DIR_NAME, TIMESTAMP_FORMAT, XML_DIR_NAME};

/// One execution of the backup. The metadata directory is private to the run, the files
/// directory is shared with every other run under the same root.
#[derive(Debug, Clone)]
pub struct BackupRun {
    pub started: DateTime<Local>,
    pub xml_dir: PathBuf,
    pub files_dir: PathBuf,
}

impl BackupRun {
    /// Captures the start time and derives the run's directories. Nothing is created yet.
    pub fn new(backup_dir: &Path) -> Self {
        Self::at(backup_dir, Local::now())
    }

    pub fn at(backup_dir: &Path, started: DateTime<Local>) -> Self {
        let timestamp = started.format(TIMESTAMP_FORMAT).to_string();
        BackupRun {
            started,
            xml_dir: backup_dir.join(XML_DIR_NAME).join(timestamp),
            files_dir: backup_dir.join(FILES_DIR_NAME),
        }
    }

    /// Reuses an existing metadata directory; files still go under `backup_dir`.
    pub fn resume(backup_dir: &Path, xml_dir: PathBuf) -> Self {
        BackupRun {
            started: Local::now(),
            xml_dir,
            files_dir: backup_dir.join(FILES_DIR_NAME),
        }
    }

    /// Creates a metadata directory no other run has used. When the timestamped name is
    /// taken (two runs in the same second) a `-2`, `-3`, ... suffix is added and `xml_dir`
    /// is updated.
    pub async fn create_xml_dir(&mut self) -> Result<()> {
        if let Some(parent) = self.xml_dir.parent() {
            fs::create_dir_all(parent).await?;
        }

        let base = self.xml_dir.clone();
        let mut attempt = 1;
        loop {
            match fs::create_dir(&self.xml_dir).await {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    attempt += 1;
                    let mut name = base.file_name().unwrap_or_default().to_os_string();
                    name.push(format!("-{attempt}"));
                    self.xml_dir = base.with_file_name(name);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn page_path(&self, page: usize) -> PathBuf {
        self.xml_dir.join(format!("page{page}.xml"))
    }

    /// Writes the page content verbatim.
    pub async fn write_page(&self, page: usize, content: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.xml_dir).await?;
        let path = self.page_path(page);
        fs::write(&path, content).await?;
        Ok(path)
    }
}

/// Every regular file in `dir`, `page<N>.xml` files first by ascending `N`, then the rest by name.
pub async fn list_pages(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }

    files.sort_by_cached_key(|path| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        (page_number(&name).unwrap_or(usize::MAX), name)
    });
    Ok(files)
}

#[inline]
fn page_number(file_name: &str) -> Option<usize> {
    file_name
        .strip_prefix("page")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}
