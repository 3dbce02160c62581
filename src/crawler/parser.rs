//! HTML extractors for the gallery site's pages
//!
//! Each function takes a page body and pulls out exactly one kind of
//! information:
//! - Tag names from the tag index
//! - The page count of a tag listing
//! - Collection identifiers from a listing page
//! - Collection metadata from a collection landing page

use crate::storage::{is_valid_identifier, CollectionRecord};
use crate::url::{last_path_segment, ImageUrlTemplate, PublishDate};
use crate::ParseError;
use scraper::{ElementRef, Html, Selector};

const TAG_LINKS: &str = "dl.tags dd a[href]";
const PAGE_NAV_LINKS: &str = "div.nav-links a";
const LISTING_LINKS: &str = "ul#pins li a[href]";
const COLLECTION_TITLE: &str = "h2.main-title";
const COLLECTION_TAGS: &str = "div.main-tags a";
const IMAGE_NAV_LINKS: &str = "div.pagenavi a";
const FIRST_IMAGE: &str = "div.main-image p a img[src]";

/// Selects every element matching a selector
fn select_all<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Pushes `value` unless it was already seen, keeping first-seen order
fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|existing| existing == value) {
        values.push(value.to_string());
    }
}

fn parse_count(value: &str, context: &str) -> Result<u32, ParseError> {
    value.parse::<u32>().map_err(|_| ParseError::InvalidNumber {
        value: value.to_string(),
        context: context.to_string(),
    })
}

/// Extracts tag names from the tag index page
///
/// A tag's name is the last path segment of its link. Duplicates are
/// dropped; page order is kept.
pub fn list_tags(body: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    let mut tags = Vec::new();

    for link in select_all(&document, TAG_LINKS) {
        if let Some(tag) = link.value().attr("href").and_then(last_path_segment) {
            push_unique(&mut tags, tag);
        }
    }

    tags
}

/// Extracts the number of listing pages from a tag's first page
///
/// The count is the text of the second-to-last pagination link (the last
/// one is "next page"). A listing with no pager at all has a single page.
pub fn page_count(body: &str, tag: &str) -> Result<u32, ParseError> {
    let document = Html::parse_document(body);
    let context = format!("tag '{}'", tag);

    let links = select_all(&document, PAGE_NAV_LINKS);
    if links.is_empty() && !select_all(&document, LISTING_LINKS).is_empty() {
        return Ok(1);
    }
    if links.len() < 2 {
        return Err(ParseError::MissingNode {
            selector: PAGE_NAV_LINKS,
            context,
        });
    }

    parse_count(&element_text(&links[links.len() - 2]), &context)
}

/// Extracts collection identifiers from a tag listing page
///
/// Links whose last segment is not purely numeric are ignored.
pub fn list_identifiers(body: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    let mut identifiers = Vec::new();

    for link in select_all(&document, LISTING_LINKS) {
        if let Some(identifier) = link.value().attr("href").and_then(last_path_segment) {
            if is_valid_identifier(identifier) {
                push_unique(&mut identifiers, identifier);
            }
        }
    }

    identifiers
}

/// Extracts the metadata of a collection from its landing page
///
/// # Errors
///
/// Returns a ParseError if the title, the image count or the first image
/// is missing, or the first image URL does not follow the numbered pattern.
/// Tags are optional.
pub fn collection_metadata(body: &str, identifier: &str) -> Result<CollectionRecord, ParseError> {
    let document = Html::parse_document(body);
    let context = format!("collection {}", identifier);
    let missing = |selector: &'static str| ParseError::MissingNode {
        selector,
        context: context.clone(),
    };

    let name = select_all(&document, COLLECTION_TITLE)
        .first()
        .map(element_text)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| missing(COLLECTION_TITLE))?;

    let mut tag_names = Vec::new();
    for tag in select_all(&document, COLLECTION_TAGS) {
        let tag = element_text(&tag);
        if !tag.is_empty() {
            push_unique(&mut tag_names, &tag);
        }
    }

    let image_count = image_count(&document, &context).map_err(|e| match e {
        ParseError::MissingNode { selector, .. } => missing(selector),
        other => other,
    })?;

    let first_image = select_all(&document, FIRST_IMAGE)
        .first()
        .and_then(|img| img.value().attr("src"))
        .map(absolute_image_url)
        .ok_or_else(|| missing(FIRST_IMAGE))?;

    let template = ImageUrlTemplate::from_first_image(&first_image)?;
    let date = PublishDate::from_image_url(&first_image);

    Ok(CollectionRecord {
        identifier: identifier.to_string(),
        name,
        image_count,
        template,
        date,
        tag_names,
    })
}

/// Reads the image count from the collection pager
///
/// The second-to-last pager link holds the count, wrapped in a span.
fn image_count(document: &Html, context: &str) -> Result<u32, ParseError> {
    let links = select_all(document, IMAGE_NAV_LINKS);
    if links.len() < 2 {
        return Err(ParseError::MissingNode {
            selector: IMAGE_NAV_LINKS,
            context: context.to_string(),
        });
    }

    let link = &links[links.len() - 2];
    let text = match Selector::parse("span") {
        Ok(span) => link
            .select(&span)
            .next()
            .map(|span| element_text(&span))
            .unwrap_or_else(|| element_text(link)),
        Err(_) => element_text(link),
    };

    let count = parse_count(&text, context)?;
    if count == 0 {
        return Err(ParseError::InvalidNumber {
            value: text,
            context: context.to_string(),
        });
    }
    Ok(count)
}

/// Protocol-relative image sources are resolved against https
fn absolute_image_url(src: &str) -> String {
    let src = src.trim();
    if src.starts_with("//") {
        format!("https:{}", src)
    } else {
        src.to_string()
    }
}
