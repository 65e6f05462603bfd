//! Scripted in-process [`RemoteCatalog`] used by unit tests across the crate.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::client::RemoteCatalog;
use super::error::PhotosError;
use super::types::{Album, MediaItem, MediaMetadata, Page, Photo, Video, VideoProcessingStatus};

pub fn album(id: &str, title: &str) -> Album {
    Album {
        id: id.to_string(),
        title: Some(title.to_string()),
        product_url: None,
        media_items_count: None,
    }
}

fn metadata(photo: Option<Photo>, video: Option<Video>) -> MediaMetadata {
    MediaMetadata {
        creation_time: "2021-06-01T12:30:00Z".to_string(),
        width: Some("2".to_string()),
        height: Some("2".to_string()),
        photo,
        video,
    }
}

pub fn photo_item(id: &str, filename: &str) -> MediaItem {
    MediaItem {
        id: id.to_string(),
        product_url: None,
        base_url: format!("https://fake.test/{id}"),
        mime_type: "image/png".to_string(),
        media_metadata: metadata(Some(Photo::default()), None),
        filename: filename.to_string(),
        description: None,
    }
}

pub fn video_item(id: &str, filename: &str) -> MediaItem {
    MediaItem {
        id: id.to_string(),
        product_url: None,
        base_url: format!("https://fake.test/{id}"),
        mime_type: "video/mp4".to_string(),
        media_metadata: metadata(
            None,
            Some(Video {
                fps: Some(30.0),
                status: Some(VideoProcessingStatus::Ready),
            }),
        ),
        filename: filename.to_string(),
        description: None,
    }
}

/// A 2x2 PNG, small enough to decode instantly.
pub fn png_bytes() -> Bytes {
    let img = image::RgbImage::from_pixel(2, 2, image::Rgb([200, 10, 10]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    Bytes::from(buf.into_inner())
}

fn server_error(endpoint: &str) -> PhotosError {
    PhotosError::Api {
        status: 500,
        endpoint: endpoint.to_string(),
        message: "scripted failure".to_string(),
    }
}

fn page_of<T: Clone>(pages: &[Vec<T>], token: Option<&str>) -> Page<T> {
    let index: usize = token.and_then(|t| t.parse().ok()).unwrap_or(0);
    let items = pages.get(index).cloned().unwrap_or_default();
    let next_page_token = if index + 1 < pages.len() {
        Some((index + 1).to_string())
    } else {
        None
    };
    Page {
        items,
        next_page_token,
    }
}

#[derive(Default)]
struct Counters {
    album_pages: usize,
    shared_album_pages: usize,
    searches: HashMap<String, usize>,
    metadata_lookups: HashMap<String, usize>,
    fetches: Vec<String>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Fake remote library. Pages are served in order with numeric continuation
/// tokens; byte fetches answer from per-URL status scripts.
#[derive(Default)]
pub struct FakeCatalog {
    album_pages: Vec<Vec<Album>>,
    shared_album_pages: Vec<Vec<Album>>,
    album_items: HashMap<String, Vec<Vec<MediaItem>>>,
    fresh_items: HashMap<String, MediaItem>,
    failing_album_page: Option<usize>,
    statuses: Mutex<HashMap<String, VecDeque<u16>>>,
    bodies: HashMap<String, Bytes>,
    fetch_delay: Option<Duration>,
    counters: Mutex<Counters>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_album_pages(mut self, pages: Vec<Vec<Album>>) -> Self {
        self.album_pages = pages;
        self
    }

    pub fn with_shared_album_pages(mut self, pages: Vec<Vec<Album>>) -> Self {
        self.shared_album_pages = pages;
        self
    }

    pub fn with_album_items(mut self, album_id: &str, pages: Vec<Vec<MediaItem>>) -> Self {
        self.album_items.insert(album_id.to_string(), pages);
        self
    }

    /// Metadata returned by `get_media_item`, e.g. with a re-signed base URL.
    pub fn with_fresh_item(mut self, item: MediaItem) -> Self {
        self.fresh_items.insert(item.id.clone(), item);
        self
    }

    pub fn fail_album_page(mut self, index: usize) -> Self {
        self.failing_album_page = Some(index);
        self
    }

    /// Successive statuses for GETs of `url`; once exhausted, GETs return 200.
    pub fn with_statuses(self, url: &str, statuses: &[u16]) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .insert(url.to_string(), statuses.iter().copied().collect());
        self
    }

    pub fn with_body(mut self, url: &str, body: Bytes) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    /// Hold every byte fetch open for `delay`, so overlapping fetches show up
    /// in [`FakeCatalog::max_concurrent_fetches`].
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn album_page_requests(&self) -> usize {
        self.counters.lock().unwrap().album_pages
    }

    pub fn shared_album_page_requests(&self) -> usize {
        self.counters.lock().unwrap().shared_album_pages
    }

    pub fn search_requests(&self, album_id: &str) -> usize {
        *self
            .counters
            .lock()
            .unwrap()
            .searches
            .get(album_id)
            .unwrap_or(&0)
    }

    pub fn metadata_lookups(&self, id: &str) -> usize {
        *self
            .counters
            .lock()
            .unwrap()
            .metadata_lookups
            .get(id)
            .unwrap_or(&0)
    }

    /// Every URL passed to `fetch_bytes`, in call order.
    pub fn fetched_urls(&self) -> Vec<String> {
        self.counters.lock().unwrap().fetches.clone()
    }

    /// Highest number of `fetch_bytes` calls that were in progress at once.
    pub fn max_concurrent_fetches(&self) -> usize {
        self.counters.lock().unwrap().max_in_flight
    }
}

#[async_trait]
impl RemoteCatalog for FakeCatalog {
    async fn list_albums_page(
        &self,
        page_token: Option<&str>,
    ) -> Result<Page<Album>, PhotosError> {
        let index = {
            let mut c = self.counters.lock().unwrap();
            c.album_pages += 1;
            c.album_pages - 1
        };
        if self.failing_album_page == Some(index) {
            return Err(server_error("albums"));
        }
        Ok(page_of(&self.album_pages, page_token))
    }

    async fn list_shared_albums_page(
        &self,
        page_token: Option<&str>,
    ) -> Result<Page<Album>, PhotosError> {
        self.counters.lock().unwrap().shared_album_pages += 1;
        Ok(page_of(&self.shared_album_pages, page_token))
    }

    async fn search_album_page(
        &self,
        album_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<MediaItem>, PhotosError> {
        *self
            .counters
            .lock()
            .unwrap()
            .searches
            .entry(album_id.to_string())
            .or_default() += 1;
        let pages = self.album_items.get(album_id).cloned().unwrap_or_default();
        Ok(page_of(&pages, page_token))
    }

    async fn get_media_item(&self, id: &str) -> Result<MediaItem, PhotosError> {
        *self
            .counters
            .lock()
            .unwrap()
            .metadata_lookups
            .entry(id.to_string())
            .or_default() += 1;
        if let Some(item) = self.fresh_items.get(id) {
            return Ok(item.clone());
        }
        self.album_items
            .values()
            .flatten()
            .flatten()
            .find(|item| item.id == id)
            .cloned()
            .ok_or_else(|| PhotosError::Api {
                status: 404,
                endpoint: format!("mediaItems/{id}"),
                message: "not found".to_string(),
            })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<(u16, Bytes), PhotosError> {
        {
            let mut c = self.counters.lock().unwrap();
            c.fetches.push(url.to_string());
            c.in_flight += 1;
            c.max_in_flight = c.max_in_flight.max(c.in_flight);
        }
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        self.counters.lock().unwrap().in_flight -= 1;

        let status = self
            .statuses
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|s| s.pop_front())
            .unwrap_or(200);
        if status >= 400 {
            return Ok((status, Bytes::new()));
        }
        let body = self.bodies.get(url).cloned().unwrap_or_else(png_bytes);
        Ok((status, body))
    }
}
