/// Filename prefix that marks a stored object as a generated thumbnail.
pub const THUMB_PREFIX: &str = "thumb_";

pub trait StringExtensions {
    /// Uppercase the first character, e.g. `"crow".capitalize_first() == "Crow"`.
    fn capitalize_first(&self) -> String;
}

impl StringExtensions for String {
    fn capitalize_first(&self) -> String {
        let mut chars = self.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }
}

/// Strip the query string, if any, from a URL.
pub fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// The last path segment of a URL, query parameters stripped.
pub fn filename_from_url(url: &str) -> String {
    strip_query(url).rsplit('/').next().unwrap_or_default().to_string()
}

pub fn is_thumbnail_name(filename: &str) -> bool {
    filename.starts_with(THUMB_PREFIX)
}

/// Derive the full-size object URL from a thumbnail URL by dropping the
/// query string and the thumbnail prefix of the last path segment.
/// Returns the stripped URL unchanged when the filename carries no prefix.
pub fn full_url_from_thumb(url: &str) -> String {
    let bare = strip_query(url);
    let filename = filename_from_url(url);
    match filename.strip_prefix(THUMB_PREFIX) {
        Some(original) => {
            let base_len = bare.len() - filename.len();
            format!("{}{}", &bare[..base_len], original)
        }
        None => bare.to_string(),
    }
}
