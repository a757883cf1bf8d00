//! Download tasks and the content-type routing rule.
//!
//! A post becomes at most one [`DownloadTask`]. Routing is deliberately
//! conservative: only native video posts, known video-host links, and links
//! with an allow-listed image extension are queued; everything else (text
//! posts, galleries, articles, exotic formats) is discarded.

use std::path::PathBuf;

use url::Url;

/// Image extensions accepted for direct photo fetches.
pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];

/// Host serving the API's native video streams.
pub const VIDEO_HOST: &str = "v.redd.it";

/// Media category a task is routed to; also the storage sub-path name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Photo,
}

impl MediaKind {
    /// Sub-path component under the label directory.
    #[must_use]
    pub fn subdir(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Photo => "photo",
        }
    }
}

/// One unit of download work, queued at most once per item id per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// API-assigned unique item id.
    pub id: String,
    /// URL to fetch: the post permalink for video, the direct link for photo.
    pub url: String,
    /// Destination directory, `<base>/<label>/{video,photo}`.
    pub dest_dir: PathBuf,
    /// Destination filename, `<id>.mp4` or `<id><ext>`.
    pub filename: String,
    /// Which fetch path handles this task.
    pub kind: MediaKind,
}

impl DownloadTask {
    /// Full destination path for the fetched file.
    #[must_use]
    pub fn dest_path(&self) -> PathBuf {
        self.dest_dir.join(&self.filename)
    }
}

/// Applies the content-type decision rule to a resolved post URL.
///
/// Video wins over photo: a post marked `is_video` by the API, or whose URL
/// points at the native video host, is routed to [`MediaKind::Video`] even
/// if the URL also carries an image-looking extension. Otherwise the URL is
/// a photo only if its extension is allow-listed; anything else is `None`
/// (not a supported media type).
#[must_use]
pub fn route_media(resolved_url: &str, is_video: bool) -> Option<MediaKind> {
    if is_video || is_video_host(resolved_url) {
        return Some(MediaKind::Video);
    }
    image_extension(resolved_url).map(|_| MediaKind::Photo)
}

/// Whether the URL's host is the native video host.
///
/// Falls back to a substring check for URLs the parser rejects, matching
/// how upstream links occasionally omit a scheme.
fn is_video_host(resolved_url: &str) -> bool {
    match Url::parse(resolved_url) {
        Ok(url) => url
            .host_str()
            .is_some_and(|host| host == VIDEO_HOST || host.ends_with(".v.redd.it")),
        Err(_) => resolved_url.contains(VIDEO_HOST),
    }
}

/// Extracts an allow-listed image extension (with dot, lower-cased) from a
/// URL, ignoring any query string or fragment.
#[must_use]
pub fn image_extension(resolved_url: &str) -> Option<&'static str> {
    let path = match Url::parse(resolved_url) {
        Ok(url) => url.path().to_lowercase(),
        Err(_) => resolved_url.to_lowercase(),
    };
    IMAGE_EXTENSIONS
        .iter()
        .find(|ext| path.ends_with(*ext))
        .copied()
}
