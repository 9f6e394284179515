use async_trait::async_trait;
use reqwest::Client;

use crate::{config::Config, info_time, FetchError, Result, PAGE_SIZE};

/// The two remote services a backup talks to.
#[async_trait]
pub trait Remote: Send + Sync + 'static {
    /// Address of a metadata page, used in error messages.
    fn page_url(&self, page: usize) -> String;

    /// Requests a page of post metadata and returns the raw document.
    async fn fetch_page(&self, page: usize) -> core::result::Result<String, FetchError>;

    /// Requests a single file from the file host.
    async fn fetch_asset(&self, url: &str) -> core::result::Result<Vec<u8>, FetchError>;
}

/// `Remote` over plain HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    // Client uses Arc so we can clone cheaply
    client: Client,
    api_url: String,
    hostname: String,
}

impl HttpRemote {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpRemote {
            client,
            api_url: config.api_url.clone(),
            hostname: config.hostname.clone(),
        })
    }
}

#[async_trait]
impl Remote for HttpRemote {
    fn page_url(&self, page: usize) -> String {
        format!(
            "{}/api/readposts?hostname={}&num_posts={PAGE_SIZE}&page={page}",
            self.api_url, self.hostname
        )
    }

    async fn fetch_page(&self, page: usize) -> core::result::Result<String, FetchError> {
        info_time!("Requesting page: {page}");
        let res = self.client.get(self.page_url(page)).send().await?;
        let res = check_status(res)?;
        Ok(res.text().await?)
    }

    async fn fetch_asset(&self, url: &str) -> core::result::Result<Vec<u8>, FetchError> {
        let res = check_status(self.client.get(url).send().await?)?;
        Ok(res.bytes().await?.to_vec())
    }
}

#[inline]
fn check_status(res: reqwest::Response) -> core::result::Result<reqwest::Response, FetchError> {
    let status = res.status();
    if status.is_success() {
        Ok(res)
    } else {
        Err(FetchError::Status(status))
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::{collections::HashMap, sync::Mutex};

    use reqwest::StatusCode;

    use super::*;

    /// A page document in the shape the API answers with.
    pub(crate) fn page_xml(stat: &str, bodies: &[&str]) -> String {
        let posts: String = bodies
            .iter()
            .map(|body| format!("<post><title>t</title><body>{body}</body></post>"))
            .collect();
        format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rsp stat=\"{stat}\">{posts}</rsp>")
    }

    /// In-memory `Remote` recording every request it serves.
    #[derive(Default)]
    pub(crate) struct MockRemote {
        pub(crate) pages: Vec<String>,
        pub(crate) assets: HashMap<String, Vec<u8>>,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    impl MockRemote {
        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Remote for MockRemote {
        fn page_url(&self, page: usize) -> String {
            format!("mock://page/{page}")
        }

        async fn fetch_page(&self, page: usize) -> core::result::Result<String, FetchError> {
            self.calls.lock().unwrap().push(self.page_url(page));
            Ok(self
                .pages
                .get(page - 1)
                .cloned()
                .unwrap_or_else(|| page_xml("ok", &[])))
        }

        async fn fetch_asset(&self, url: &str) -> core::result::Result<Vec<u8>, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            self.assets
                .get(url)
                .cloned()
                .ok_or(FetchError::Status(StatusCode::NOT_FOUND))
        }
    }
}
