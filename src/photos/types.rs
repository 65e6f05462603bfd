//! Wire types for the Google Photos Library API (v1).
//!
//! Only the fields the sync engine reads are modelled; unknown fields are
//! ignored by serde.

use serde::{Deserialize, Serialize};

/// Maximum `pageSize` accepted by `albums.list` and `sharedAlbums.list`.
pub const ALBUM_PAGE_SIZE: u32 = 50;

/// Maximum `pageSize` accepted by `mediaItems.search`.
pub const MEDIA_ITEM_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub product_url: Option<String>,
    #[serde(default)]
    pub media_items_count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAlbumsResponse {
    #[serde(default)]
    pub albums: Vec<Album>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSharedAlbumsResponse {
    #[serde(default)]
    pub shared_albums: Vec<Album>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// A single page of results from any cursor-paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    /// The continuation token, treating an empty string the same as absent.
    pub fn continuation(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

impl From<ListAlbumsResponse> for Page<Album> {
    fn from(r: ListAlbumsResponse) -> Self {
        Self {
            items: r.albums,
            next_page_token: r.next_page_token,
        }
    }
}

impl From<ListSharedAlbumsResponse> for Page<Album> {
    fn from(r: ListSharedAlbumsResponse) -> Self {
        Self {
            items: r.shared_albums,
            next_page_token: r.next_page_token,
        }
    }
}

impl From<SearchMediaItemsResponse> for Page<MediaItem> {
    fn from(r: SearchMediaItemsResponse) -> Self {
        Self {
            items: r.media_items,
            next_page_token: r.next_page_token,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    #[serde(default)]
    pub camera_make: Option<String>,
    #[serde(default)]
    pub camera_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoProcessingStatus {
    Unspecified,
    Processing,
    Ready,
    Failed,
}

impl VideoProcessingStatus {
    /// Convert to the string stored in the index.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::Processing => "PROCESSING",
            Self::Ready => "READY",
            Self::Failed => "FAILED",
        }
    }

    /// Parse from the string stored in the index.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "UNSPECIFIED" => Some(Self::Unspecified),
            "PROCESSING" => Some(Self::Processing),
            "READY" => Some(Self::Ready),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(default)]
    pub status: Option<VideoProcessingStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    /// RFC 3339 timestamp, e.g. `2014-10-02T15:01:23.045123456Z`.
    pub creation_time: String,
    /// int64 values are encoded as JSON strings by the API.
    #[serde(default)]
    pub width: Option<String>,
    #[serde(default)]
    pub height: Option<String>,
    #[serde(default)]
    pub photo: Option<Photo>,
    #[serde(default)]
    pub video: Option<Video>,
}

/// Whether an item is a photo or a video, decided from which media-metadata
/// sub-object the API returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Suffix appended to `baseUrl` to request the original bytes.
    pub fn download_suffix(&self) -> &'static str {
        match self {
            Self::Photo => "=d",
            Self::Video => "=dv",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "photo" => Some(Self::Photo),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    #[serde(default)]
    pub product_url: Option<String>,
    pub base_url: String,
    pub mime_type: String,
    pub media_metadata: MediaMetadata,
    pub filename: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl MediaItem {
    /// Photo metadata wins if (against the API contract) both are present.
    pub fn kind(&self) -> Option<MediaKind> {
        if self.media_metadata.photo.is_some() {
            Some(MediaKind::Photo)
        } else if self.media_metadata.video.is_some() {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    /// The presigned URL for the original bytes, or `None` when the item
    /// carries neither photo nor video metadata.
    pub fn download_url(&self) -> Option<String> {
        self.kind()
            .map(|kind| format!("{}{}", self.base_url, kind.download_suffix()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMediaItemsRequest {
    pub album_id: String,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMediaItemsResponse {
    #[serde(default)]
    pub media_items: Vec<MediaItem>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_media_item_photo() {
        let item: MediaItem = serde_json::from_value(json!({
            "id": "AF1Qip",
            "productUrl": "https://photos.google.com/lr/photo/AF1Qip",
            "baseUrl": "https://lh3.googleusercontent.com/lr/abc",
            "mimeType": "image/jpeg",
            "mediaMetadata": {
                "creationTime": "2021-06-01T12:30:00Z",
                "width": "4032",
                "height": "3024",
                "photo": {"cameraMake": "Google", "cameraModel": "Pixel 5"}
            },
            "filename": "PXL_0001.jpg"
        }))
        .unwrap();

        assert_eq!(item.kind(), Some(MediaKind::Photo));
        assert_eq!(
            item.download_url().as_deref(),
            Some("https://lh3.googleusercontent.com/lr/abc=d")
        );
        assert_eq!(item.media_metadata.width.as_deref(), Some("4032"));
        assert!(item.description.is_none());
    }

    #[test]
    fn test_deserialize_media_item_video() {
        let item: MediaItem = serde_json::from_value(json!({
            "id": "V1",
            "baseUrl": "https://lh3.googleusercontent.com/lr/v",
            "mimeType": "video/mp4",
            "mediaMetadata": {
                "creationTime": "2021-06-01T12:30:00Z",
                "width": "1920",
                "height": "1080",
                "video": {"fps": 29.97, "status": "READY"}
            },
            "filename": "clip.mp4",
            "description": "beach"
        }))
        .unwrap();

        assert_eq!(item.kind(), Some(MediaKind::Video));
        assert_eq!(
            item.download_url().as_deref(),
            Some("https://lh3.googleusercontent.com/lr/v=dv")
        );
        let video = item.media_metadata.video.unwrap();
        assert_eq!(video.status, Some(VideoProcessingStatus::Ready));
    }

    #[test]
    fn test_media_item_without_photo_or_video() {
        let item: MediaItem = serde_json::from_value(json!({
            "id": "X",
            "baseUrl": "https://example.com/x",
            "mimeType": "application/octet-stream",
            "mediaMetadata": {"creationTime": "2021-06-01T12:30:00Z"},
            "filename": "x.bin"
        }))
        .unwrap();
        assert_eq!(item.kind(), None);
        assert_eq!(item.download_url(), None);
    }

    #[test]
    fn test_deserialize_shared_albums_page() {
        let resp: ListSharedAlbumsResponse = serde_json::from_value(json!({
            "sharedAlbums": [{"id": "S1", "title": "Family"}],
            "nextPageToken": ""
        }))
        .unwrap();
        let page: Page<Album> = resp.into();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.continuation(), None);
    }

    #[test]
    fn test_empty_search_response() {
        let resp: SearchMediaItemsResponse = serde_json::from_value(json!({})).unwrap();
        assert!(resp.media_items.is_empty());
        assert!(resp.next_page_token.is_none());
    }

    #[test]
    fn test_search_request_omits_missing_token() {
        let req = SearchMediaItemsRequest {
            album_id: "A".into(),
            page_size: MEDIA_ITEM_PAGE_SIZE,
            page_token: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v, json!({"albumId": "A", "pageSize": 100}));
    }

    #[test]
    fn test_video_status_round_trip() {
        for status in [
            VideoProcessingStatus::Unspecified,
            VideoProcessingStatus::Processing,
            VideoProcessingStatus::Ready,
            VideoProcessingStatus::Failed,
        ] {
            assert_eq!(VideoProcessingStatus::from_str(status.as_str()), Some(status));
        }
    }
}
