//! Per-collection image URL template
//!
//! Every image of a collection lives next to the first one and differs only
//! by a zero-padded sequence number, e.g.
//! `https://img.example.com/2020/09/27a01.jpg`, `.../27a02.jpg`, ...
//! The template keeps the part before the number (`prefix`), the part after
//! it (`suffix`) and the width of the number.

use crate::ParseError;

/// Number of leading file-name characters that precede the sequence index
const FILE_STEM_LEN: usize = 3;

/// Image URL template derived from a collection's first image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUrlTemplate {
    pub prefix: String,
    pub suffix: String,
    pub index_width: usize,
}

impl ImageUrlTemplate {
    /// Derives the template from the URL of the first image
    ///
    /// # Examples
    ///
    /// ```
    /// use gallery_harvest::url::ImageUrlTemplate;
    ///
    /// let template = ImageUrlTemplate::from_first_image(
    ///     "https://img.example.com/2020/09/27a01.jpg",
    /// ).unwrap();
    /// assert_eq!(template.prefix, "https://img.example.com/2020/09/27a");
    /// assert_eq!(template.suffix, ".jpg");
    /// assert_eq!(template.image_url(12), "https://img.example.com/2020/09/27a12.jpg");
    /// ```
    pub fn from_first_image(image_url: &str) -> Result<Self, ParseError> {
        let malformed = || ParseError::MalformedImageUrl(image_url.to_string());

        let (directory, file_name) = image_url.rsplit_once('/').ok_or_else(malformed)?;

        let stem_end = file_name
            .char_indices()
            .nth(FILE_STEM_LEN)
            .map(|(idx, _)| idx)
            .ok_or_else(malformed)?;
        let (stem, rest) = file_name.split_at(stem_end);

        let index_width = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if index_width == 0 {
            return Err(malformed());
        }

        Ok(Self {
            prefix: format!("{}/{}", directory, stem),
            suffix: rest[index_width..].to_string(),
            index_width,
        })
    }

    /// URL of the image with the given 1-based sequence index
    pub fn image_url(&self, index: u32) -> String {
        format!(
            "{}{:0width$}{}",
            self.prefix,
            index,
            self.suffix,
            width = self.index_width
        )
    }

    /// URLs of images 1..=count, in order
    pub fn expand(&self, count: u32) -> Vec<String> {
        (1..=count).map(|index| self.image_url(index)).collect()
    }
}

/// Publication date encoded in an image URL path (`/<year>/<month>/<dd>...`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishDate {
    pub year: String,
    pub month: String,
    pub day: String,
}

impl PublishDate {
    /// Reads the date from segments 3..=5 of a `scheme://host/y/m/dd...` URL
    ///
    /// Returns None when the URL does not have that shape.
    pub fn from_image_url(image_url: &str) -> Option<Self> {
        let parts: Vec<&str> = image_url.split('/').collect();
        if parts.len() < 6 {
            return None;
        }

        let day: String = parts[5].chars().take(2).collect();
        if day.chars().count() < 2 {
            return None;
        }

        Some(Self {
            year: parts[3].to_string(),
            month: parts[4].to_string(),
            day,
        })
    }
}
