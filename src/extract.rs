use std::{collections::HashSet, path::Path, sync::Arc, sync::LazyLock};

use quick_xml::{events::Event, Reader};
use regex::Regex;
use scraper::{Html, Selector};
use tokio::{fs, task::spawn_blocking};

use crate::{config::ExtractorKind, info_time, store::list_pages, Error, Result};

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// A file url embedded in a document, up to the quote or tag that closes it.
regex!(EMBEDDED_FILE_URL_REGEX, r#"(http://getfile.*?\.posterous\.com/getfile/.*?)[<'"]"#);
regex!(FILE_HOST_PREFIX_REGEX, r"^http://getfile.*?\.posterous\.com/getfile/");
// Greedy: the last `.thumb`/`.scaledN` wins and anything after it is dropped too.
regex!(VARIANT_URL_REGEX, r"(?i)^(.+)\.(?:thumb|scaled[0-9]*)");

/// Finds file-host urls inside one metadata document.
///
/// Implementations keep encounter order and never deduplicate: a url mentioned twice is
/// returned twice.
pub trait AssetExtractor: Send + Sync {
    fn extract(&self, content: &str) -> Result<Vec<String>>;
}

/// Regex scan of the raw text, no understanding of its structure.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternExtractor;

impl AssetExtractor for PatternExtractor {
    fn extract(&self, content: &str) -> Result<Vec<String>> {
        Ok(EMBEDDED_FILE_URL_REGEX
            .captures_iter(content)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .collect())
    }
}

/// Walks the XML text nodes. A node that is a bare file url is taken as is, a node holding
/// HTML is parsed and its `src`/`href` attributes are checked.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkupExtractor;

impl AssetExtractor for MarkupExtractor {
    fn extract(&self, content: &str) -> Result<Vec<String>> {
        let selector = create_selector("[src], [href]")?;
        let mut reader = Reader::from_str(content);
        let mut urls = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    scan_text(&text, &selector, &mut urls);
                }
                Ok(Event::CData(c)) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    scan_text(&text, &selector, &mut urls);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(Error::MalformedDocument(format!(
                        "error at position {}: {e}",
                        reader.buffer_position()
                    )))
                }
            }
        }
        Ok(urls)
    }
}

fn scan_text(text: &str, selector: &Selector, urls: &mut Vec<String>) {
    let text = text.trim();
    if !text.contains('<') {
        if is_file_url(text) && !text.contains(char::is_whitespace) {
            urls.push(text.to_string());
        }
        return;
    }

    let fragment = Html::parse_fragment(text);
    for element in fragment.select(selector) {
        for attr in ["src", "href"] {
            if let Some(value) = element.value().attr(attr) {
                if is_file_url(value) {
                    urls.push(value.to_string());
                }
            }
        }
    }
}

#[inline]
fn create_selector(sel_str: &str) -> Result<Selector> {
    Selector::parse(sel_str).map_err(|_| Error::ParseMissingSelector(sel_str.into()))
}

/// True for urls served by the Posterous file host.
#[inline]
pub fn is_file_url(url: &str) -> bool {
    FILE_HOST_PREFIX_REGEX.is_match(url)
}

/// The path of a file url relative to the file host, `None` for any other url.
pub fn strip_file_host(url: &str) -> Option<&str> {
    FILE_HOST_PREFIX_REGEX.find(url).map(|m| &url[m.end()..])
}

pub fn extractor_for(kind: ExtractorKind) -> Arc<dyn AssetExtractor> {
    match kind {
        ExtractorKind::Pattern => Arc::new(PatternExtractor),
        ExtractorKind::Markup => Arc::new(MarkupExtractor),
    }
}

/// Runs `extractor` over every file of a metadata directory and concatenates the results.
pub async fn extract_dir(dir: &Path, extractor: Arc<dyn AssetExtractor>) -> Result<Vec<String>> {
    let mut urls = Vec::new();
    for path in list_pages(dir).await? {
        let bytes = fs::read(&path).await?;
        let found = spawn_blocking({
            let extractor = extractor.clone();
            move || extractor.extract(&String::from_utf8_lossy(&bytes))
        })
        .await??;

        info_time!("found {} file urls in {}", found.len(), path.display());
        urls.extend(found);
    }
    Ok(urls)
}

/// For a thumbnail or scaled variant (`x.jpg.thumb`, `x.jpg.scaled500`, `x.jpg.scaled500.jpg`)
/// the url of the unscaled file (`x.jpg`).
pub fn original_url(url: &str) -> Option<&str> {
    VARIANT_URL_REGEX
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Originals of every variant in `urls`, each listed once, in first-seen order.
/// Urls that aren't variants contribute nothing.
pub fn derive_originals(urls: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut originals = Vec::new();
    for original in urls.iter().filter_map(|url| original_url(url)) {
        if seen.insert(original) {
            info_time!("orig file: {original}");
            originals.push(original.to_string());
        }
    }
    originals
}
