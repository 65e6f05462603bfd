//! Per-item fetch with a single link refresh on expiry.

use bytes::Bytes;
use image::{DynamicImage, ImageFormat};

use super::error::DownloadError;
use crate::index::{ContentRecord, UrlRefresh};
use crate::photos::{MediaKind, RemoteCatalog};

/// Status the CDN returns once a presigned link has expired.
const STALE_LINK_STATUS: u16 = 403;

/// Payload of one fetched item, tagged by the item's media metadata.
pub enum FetchedContent {
    /// `bytes` holds the original encoding, which is what gets written to
    /// disk. `image` is `None` for formats this build cannot decode (HEIC,
    /// AVIF without a codec), which are stored unverified.
    Photo {
        image: Option<DynamicImage>,
        bytes: Bytes,
    },
    Video { bytes: Bytes },
}

impl FetchedContent {
    pub fn bytes(&self) -> &Bytes {
        match self {
            FetchedContent::Photo { bytes, .. } | FetchedContent::Video { bytes } => bytes,
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            FetchedContent::Photo { .. } => MediaKind::Photo,
            FetchedContent::Video { .. } => MediaKind::Video,
        }
    }
}

impl std::fmt::Debug for FetchedContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchedContent::Photo { image, bytes } => f
                .debug_struct("Photo")
                .field("dimensions", &image.as_ref().map(|i| (i.width(), i.height())))
                .field("len", &bytes.len())
                .finish(),
            FetchedContent::Video { bytes } => {
                f.debug_struct("Video").field("len", &bytes.len()).finish()
            }
        }
    }
}

/// A successful fetch, plus the new link if the stored one had expired.
#[derive(Debug)]
pub struct Fetched {
    pub content: FetchedContent,
    pub refreshed: Option<UrlRefresh>,
}

/// Decode a photo body when its declared format has a decoder.
///
/// A corrupt payload in a decodable format fails the item. Anything else is
/// passed through so it can still be mirrored byte for byte.
fn decode_photo(
    item: &ContentRecord,
    body: &Bytes,
) -> Result<Option<DynamicImage>, DownloadError> {
    let format = ImageFormat::from_mime_type(&item.mime_type)
        .or_else(|| ImageFormat::from_path(&item.filename).ok());
    match format {
        Some(format) if format.reading_enabled() => {
            image::load_from_memory_with_format(body, format)
                .map(Some)
                .map_err(|source| DownloadError::Decode {
                    path: item.filename.clone(),
                    source,
                })
        }
        _ => {
            tracing::debug!(
                id = %item.id,
                mime_type = %item.mime_type,
                "No decoder for {}, storing original bytes",
                item.filename
            );
            Ok(None)
        }
    }
}

async fn get(
    catalog: &dyn RemoteCatalog,
    url: &str,
    filename: &str,
) -> Result<(u16, Bytes), DownloadError> {
    catalog
        .fetch_bytes(url)
        .await
        .map_err(|source| DownloadError::Http {
            path: filename.to_string(),
            source,
        })
}

/// Fetch one indexed item.
///
/// A 403 triggers exactly one metadata lookup and one retry with the freshly
/// signed link. Any other status of 400 or above, or a second 403, fails the
/// item.
pub async fn fetch_item(
    catalog: &dyn RemoteCatalog,
    item: &ContentRecord,
) -> Result<Fetched, DownloadError> {
    let mut kind = item.media_kind;
    let mut refreshed = None;

    let (mut status, mut body) = get(catalog, &item.download_url, &item.filename).await?;

    if status == STALE_LINK_STATUS {
        tracing::debug!(id = %item.id, "Download link expired, refreshing {}", item.filename);
        let fresh = catalog
            .get_media_item(&item.id)
            .await
            .map_err(|source| DownloadError::LinkRefresh {
                path: item.filename.clone(),
                source,
            })?;
        kind = fresh
            .kind()
            .ok_or_else(|| DownloadError::InvalidMedia(item.id.clone()))?;
        let download_url = format!("{}{}", fresh.base_url, kind.download_suffix());

        (status, body) = get(catalog, &download_url, &item.filename).await?;
        refreshed = Some(UrlRefresh {
            id: item.id.clone(),
            base_url: fresh.base_url,
            download_url,
        });
    }

    if status >= 400 {
        return Err(DownloadError::HttpStatus {
            status,
            path: item.filename.clone(),
        });
    }

    let content = match kind {
        MediaKind::Photo => FetchedContent::Photo {
            image: decode_photo(item, &body)?,
            bytes: body,
        },
        MediaKind::Video => FetchedContent::Video { bytes: body },
    };

    Ok(Fetched { content, refreshed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photos::testing::{photo_item, video_item, FakeCatalog};

    fn record(item: &crate::photos::MediaItem) -> ContentRecord {
        ContentRecord::from_media_item(item, Some("A1")).unwrap()
    }

    #[tokio::test]
    async fn test_photo_is_decoded() {
        let item = record(&photo_item("P1", "a.png"));
        let catalog = FakeCatalog::new();

        let fetched = fetch_item(&catalog, &item).await.unwrap();
        assert!(fetched.refreshed.is_none());
        match fetched.content {
            FetchedContent::Photo { image, .. } => assert_eq!(image.unwrap().width(), 2),
            other => panic!("expected photo, got {other:?}"),
        }
        assert_eq!(catalog.fetched_urls(), ["https://fake.test/P1=d"]);
    }

    #[tokio::test]
    async fn test_video_bytes_are_opaque() {
        let item = record(&video_item("V1", "clip.mp4"));
        let catalog =
            FakeCatalog::new().with_body("https://fake.test/V1=dv", Bytes::from_static(b"mp4"));

        let fetched = fetch_item(&catalog, &item).await.unwrap();
        assert_eq!(fetched.content.kind(), MediaKind::Video);
        assert_eq!(fetched.content.bytes().as_ref(), b"mp4");
    }

    #[tokio::test]
    async fn test_stale_link_is_refreshed_once() {
        let item = record(&photo_item("P1", "a.png"));
        let mut fresh = photo_item("P1", "a.png");
        fresh.base_url = "https://fake.test/P1-fresh".to_string();
        let catalog = FakeCatalog::new()
            .with_statuses("https://fake.test/P1=d", &[403])
            .with_fresh_item(fresh);

        let fetched = fetch_item(&catalog, &item).await.unwrap();
        assert_eq!(catalog.metadata_lookups("P1"), 1);
        assert_eq!(
            catalog.fetched_urls(),
            ["https://fake.test/P1=d", "https://fake.test/P1-fresh=d"]
        );
        let refresh = fetched.refreshed.unwrap();
        assert_eq!(refresh.download_url, "https://fake.test/P1-fresh=d");
        assert_eq!(refresh.base_url, "https://fake.test/P1-fresh");
    }

    #[tokio::test]
    async fn test_second_403_fails_without_further_retries() {
        let item = record(&photo_item("P1", "a.png"));
        let mut fresh = photo_item("P1", "a.png");
        fresh.base_url = "https://fake.test/P1-fresh".to_string();
        let catalog = FakeCatalog::new()
            .with_statuses("https://fake.test/P1=d", &[403])
            .with_statuses("https://fake.test/P1-fresh=d", &[403])
            .with_fresh_item(fresh);

        let err = fetch_item(&catalog, &item).await.unwrap_err();
        assert!(matches!(err, DownloadError::HttpStatus { status: 403, .. }));
        assert_eq!(catalog.metadata_lookups("P1"), 1);
        assert_eq!(catalog.fetched_urls().len(), 2);
    }

    #[tokio::test]
    async fn test_other_client_error_is_not_retried() {
        let item = record(&photo_item("P1", "a.png"));
        let catalog = FakeCatalog::new().with_statuses("https://fake.test/P1=d", &[404]);

        let err = fetch_item(&catalog, &item).await.unwrap_err();
        assert!(matches!(err, DownloadError::HttpStatus { status: 404, ref path } if path == "a.png"));
        assert_eq!(catalog.metadata_lookups("P1"), 0);
        assert_eq!(catalog.fetched_urls().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_lookup_failure() {
        let item = record(&photo_item("GONE", "a.png"));
        let catalog = FakeCatalog::new().with_statuses("https://fake.test/GONE=d", &[403]);

        let err = fetch_item(&catalog, &item).await.unwrap_err();
        assert!(matches!(err, DownloadError::LinkRefresh { .. }));
        assert!(err.is_skippable());
    }

    #[tokio::test]
    async fn test_refreshed_item_without_metadata_is_invalid() {
        let item = record(&photo_item("P1", "a.png"));
        let mut fresh = photo_item("P1", "a.png");
        fresh.media_metadata.photo = None;
        let catalog = FakeCatalog::new()
            .with_statuses("https://fake.test/P1=d", &[403])
            .with_fresh_item(fresh);

        let err = fetch_item(&catalog, &item).await.unwrap_err();
        assert!(matches!(err, DownloadError::InvalidMedia(id) if id == "P1"));
    }

    #[tokio::test]
    async fn test_corrupt_png_is_rejected() {
        let item = record(&photo_item("P1", "a.png"));
        let catalog = FakeCatalog::new()
            .with_body("https://fake.test/P1=d", Bytes::from_static(b"\x00\x01garbage"));

        let err = fetch_item(&catalog, &item).await.unwrap_err();
        assert!(matches!(err, DownloadError::Decode { ref path, .. } if path == "a.png"));
    }

    #[tokio::test]
    async fn test_png_bytes_under_jpeg_mime_are_rejected() {
        let mut photo = photo_item("P1", "a.jpg");
        photo.mime_type = "image/jpeg".to_string();
        let item = record(&photo);
        let catalog = FakeCatalog::new();

        let err = fetch_item(&catalog, &item).await.unwrap_err();
        assert!(matches!(err, DownloadError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_heic_is_stored_without_decoding() {
        let mut photo = photo_item("P1", "IMG_0001.HEIC");
        photo.mime_type = "image/heic".to_string();
        let item = record(&photo);
        let heic = Bytes::from_static(b"\x00\x00\x00\x18ftypheic\x00\x00\x00\x00mif1heic");
        let catalog = FakeCatalog::new().with_body("https://fake.test/P1=d", heic.clone());

        let fetched = fetch_item(&catalog, &item).await.unwrap();
        match &fetched.content {
            FetchedContent::Photo { image, bytes } => {
                assert!(image.is_none());
                assert_eq!(bytes, &heic);
            }
            other => panic!("expected photo, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_mime_falls_back_to_extension() {
        let mut photo = photo_item("P1", "scan.png");
        photo.mime_type = "application/octet-stream".to_string();
        let item = record(&photo);
        let catalog = FakeCatalog::new()
            .with_body("https://fake.test/P1=d", Bytes::from_static(b"not a png"));

        let err = fetch_item(&catalog, &item).await.unwrap_err();
        assert!(matches!(err, DownloadError::Decode { .. }));
    }
}
