//! URL handling module for Gallery-Harvest
//!
//! This module builds every page address the crawler requests from the
//! configured site base URL, extracts identifiers from link targets, and
//! models the per-collection image URL template.

mod template;

pub use template::{ImageUrlTemplate, PublishDate};

use crate::config::SiteConfig;
use url::Url;

/// Builds page URLs for the configured gallery site
#[derive(Debug, Clone)]
pub struct SiteUrls {
    base: Url,
    tag_index_path: String,
}

impl SiteUrls {
    /// Creates a URL builder from a base URL string
    ///
    /// A missing trailing slash is added so relative joins stay below the
    /// base path.
    pub fn new(base_url: &str, tag_index_path: &str) -> Result<Self, url::ParseError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            base,
            tag_index_path: tag_index_path.to_string(),
        })
    }

    /// Creates a URL builder from the site section of the configuration
    pub fn from_config(config: &SiteConfig) -> Result<Self, url::ParseError> {
        Self::new(&config.base_url, &config.tag_index_path)
    }

    /// The normalized base URL (always ending in '/')
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Host and optional port of the site, as sent in the Host header
    pub fn authority(&self) -> String {
        let host = self.base.host_str().unwrap_or_default();
        match self.base.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// The page listing every tag of the site
    pub fn tag_index(&self) -> Result<Url, url::ParseError> {
        self.base.join(&self.tag_index_path)
    }

    /// The first listing page of a tag (carries the page count)
    pub fn tag(&self, tag: &str) -> Result<Url, url::ParseError> {
        self.base.join(&format!("tag/{}/", tag))
    }

    /// A numbered listing page of a tag
    pub fn tag_page(&self, tag: &str, page: u32) -> Result<Url, url::ParseError> {
        self.base.join(&format!("tag/{}/page/{}/", tag, page))
    }

    /// The landing page of a collection
    pub fn collection(&self, identifier: &str) -> Result<Url, url::ParseError> {
        self.base.join(identifier)
    }
}

/// Returns the last non-empty path segment of a link target
///
/// Works for absolute URLs and bare paths alike; query strings and
/// fragments are ignored.
///
/// # Examples
///
/// ```
/// use gallery_harvest::url::last_path_segment;
///
/// assert_eq!(last_path_segment("https://www.example.com/tag/xinggan/"), Some("xinggan"));
/// assert_eq!(last_path_segment("/12345"), Some("12345"));
/// assert_eq!(last_path_segment("https://www.example.com/"), None);
/// ```
pub fn last_path_segment(href: &str) -> Option<&str> {
    let href = href.trim();
    let without_fragment = href.split('#').next().unwrap_or(href);
    let without_query = without_fragment
        .split('?')
        .next()
        .unwrap_or(without_fragment);

    let path = match without_query.find("://") {
        Some(scheme_end) => {
            let rest = &without_query[scheme_end + 3..];
            match rest.find('/') {
                Some(path_start) => &rest[path_start..],
                None => "",
            }
        }
        None => without_query,
    };

    path.split('/').filter(|segment| !segment.is_empty()).last()
}

/// Returns the file name an image URL is saved under
pub fn image_file_name(image_url: &str) -> Option<&str> {
    last_path_segment(image_url)
}
