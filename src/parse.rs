use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};

use crate::{Error, Result};

/// What the pagination loop needs to know about one metadata page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSummary {
    /// Number of `<post>` elements anywhere in the document.
    pub posts: usize,
    rsp_found: bool,
    stat: Option<String>,
}

impl PageSummary {
    /// Walks the whole document once. Anything that isn't well-formed XML with a root element
    /// is reported as `Error::MalformedResponse` for `page`.
    pub fn parse(page: usize, xml: &str) -> Result<Self> {
        let malformed = |reason: String| Error::MalformedResponse { page, reason };

        let mut reader = Reader::from_str(xml);
        let mut summary = PageSummary::default();
        let mut depth = 0usize;
        let mut saw_root = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    summary.visit(&e).map_err(malformed)?;
                    saw_root = true;
                    depth += 1;
                }
                Ok(Event::Empty(e)) => {
                    summary.visit(&e).map_err(malformed)?;
                    saw_root = true;
                }
                Ok(Event::End(_)) => depth = depth.saturating_sub(1),
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(malformed(format!(
                        "error at position {}: {e}",
                        reader.buffer_position()
                    )))
                }
            }
        }

        if !saw_root {
            return Err(malformed("document has no root element".into()));
        }
        if depth != 0 {
            return Err(malformed(format!("document ended with {depth} unclosed element(s)")));
        }
        Ok(summary)
    }

    fn visit(&mut self, e: &BytesStart) -> core::result::Result<(), String> {
        match e.local_name().as_ref() {
            b"post" => self.posts += 1,
            // Only the first <rsp> carries the status.
            b"rsp" if !self.rsp_found => {
                self.rsp_found = true;
                self.stat = e
                    .try_get_attribute("stat")
                    .map_err(|e| e.to_string())?
                    .map(|attr| attr.unescape_value().map(|v| v.into_owned()))
                    .transpose()
                    .map_err(|e| e.to_string())?;
            }
            _ => {}
        }
        Ok(())
    }

    pub fn has_posts(&self) -> bool {
        self.posts > 0
    }

    /// The `stat` attribute of the response element.
    pub fn stat(&self, page: usize) -> Result<&str> {
        if !self.rsp_found {
            return Err(Error::MalformedResponse {
                page,
                reason: "missing <rsp> element".into(),
            });
        }
        self.stat.as_deref().ok_or_else(|| Error::MalformedResponse {
            page,
            reason: "<rsp> has no stat attribute".into(),
        })
    }

    pub fn is_ok(&self, page: usize) -> Result<bool> {
        Ok(self.stat(page)? == "ok")
    }
}

/// True if the page holds at least one post, i.e. pagination should go on.
pub fn page_has_posts(page: usize, xml: &str) -> Result<bool> {
    Ok(PageSummary::parse(page, xml)?.has_posts())
}

/// True if the service marked the page with `stat="ok"`.
pub fn response_ok(page: usize, xml: &str) -> Result<bool> {
    PageSummary::parse(page, xml)?.is_ok(page)
}
