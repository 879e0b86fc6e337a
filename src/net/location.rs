use hdsflow_media::{ChunkSpec, StreamIndex};

/// Derive the base URL fragments and relative bootstraps are resolved
/// against: the manifest URL without its query and final path segment.
///
/// Returns `None` when the URL has no `/` to cut at.
pub fn base_url_from_manifest(manifest_url: &str) -> Option<String> {
    let without_query = manifest_url
        .split_once('?')
        .map_or(manifest_url, |(path, _)| path);
    let cut = without_query.rfind('/')?;
    Some(without_query[..cut].to_string())
}

/// Whether `url` is fully qualified (`http://` or `https://`, any case).
pub fn is_absolute_url(url: &str) -> bool {
    let has_scheme = |prefix: &str| {
        url.as_bytes()
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes()))
    };
    has_scheme("http://") || has_scheme("https://")
}

/// Builds fragment and bootstrap URLs for one stream variant.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    base_url: String,
    media_url: Option<String>,
}

impl UrlResolver {
    pub fn new(base_url: impl Into<String>, media_url: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            media_url: media_url.filter(|url| !url.is_empty()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of one fragment:
    /// `{server_base}/{movie}{quality}Seg{segment}-Frag{fragment}`.
    ///
    /// The server base is the first non-empty bootstrap server, else the
    /// manifest base URL. A fully-qualified media URL replaces the server base;
    /// a relative one is the movie part. Without a media URL the bootstrap's
    /// movie identifier is used.
    pub fn fragment_url(&self, index: &StreamIndex, chunk: &ChunkSpec) -> String {
        let mut server_base = index.server_base().unwrap_or(&self.base_url);
        let mut movie = index.movie_id.as_str();

        if let Some(media) = self.media_url.as_deref() {
            if is_absolute_url(media) {
                server_base = media;
                movie = "";
            } else {
                movie = media;
            }
        }

        format!(
            "{}/{}{}Seg{}-Frag{}",
            server_base.trim_end_matches('/'),
            movie,
            index.quality_modifier.as_deref().unwrap_or(""),
            chunk.segment_number,
            chunk.fragment_number
        )
    }

    /// Resolve a bootstrap URL from the manifest.
    pub fn bootstrap_url(&self, url: &str) -> String {
        if is_absolute_url(url) {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url)
        }
    }
}
