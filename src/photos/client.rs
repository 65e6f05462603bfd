use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error::PhotosError;
use super::types::{
    Album, ListAlbumsResponse, ListSharedAlbumsResponse, MediaItem, Page,
    SearchMediaItemsRequest, SearchMediaItemsResponse, ALBUM_PAGE_SIZE, MEDIA_ITEM_PAGE_SIZE,
};
use crate::retry::{self, RetryAction, RetryConfig};

/// Production endpoint of the Photos Library API.
pub const DEFAULT_API_BASE_URL: &str = "https://photoslibrary.googleapis.com/v1";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Read-only view of the remote library.
///
/// Implementors expose single pages; pagination lives in
/// [`list_all_albums`] and [`search_all_album_media_items`] so every backend
/// follows the same continuation rules. Object-safe, shared as
/// `&dyn RemoteCatalog` across concurrent download workers.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// One page of the user's own albums.
    async fn list_albums_page(&self, page_token: Option<&str>)
        -> Result<Page<Album>, PhotosError>;

    /// One page of albums shared with the user.
    async fn list_shared_albums_page(
        &self,
        page_token: Option<&str>,
    ) -> Result<Page<Album>, PhotosError>;

    /// One page of the non-archived items in `album_id`.
    async fn search_album_page(
        &self,
        album_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<MediaItem>, PhotosError>;

    /// Fresh metadata (and therefore a freshly signed `baseUrl`) for one item.
    async fn get_media_item(&self, id: &str) -> Result<MediaItem, PhotosError>;

    /// Plain GET. Non-2xx statuses are returned, not raised.
    async fn fetch_bytes(&self, url: &str) -> Result<(u16, Bytes), PhotosError>;
}

/// Drive a cursor-paginated listing to completion.
///
/// Stops on the first page without a (non-empty) continuation token; any
/// page error aborts the whole listing.
async fn paginate<T, F, Fut>(what: &str, mut fetch_page: F) -> Result<Vec<T>, PhotosError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, PhotosError>>,
{
    let mut all = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0u32;

    loop {
        let page = fetch_page(token.take()).await?;
        pages += 1;
        let next = page.continuation().map(str::to_string);
        debug!(
            "{}: page {} returned {} entries (more: {})",
            what,
            pages,
            page.items.len(),
            next.is_some()
        );
        all.extend(page.items);
        match next {
            Some(t) => token = Some(t),
            None => break,
        }
    }

    Ok(all)
}

/// List every album; shared albums are appended after the user's own albums
/// without de-duplication.
pub async fn list_all_albums(
    catalog: &dyn RemoteCatalog,
    include_shared: bool,
) -> Result<Vec<Album>, PhotosError> {
    let mut albums = paginate("albums", |token| async move {
        catalog.list_albums_page(token.as_deref()).await
    })
    .await?;

    if include_shared {
        let shared = paginate("sharedAlbums", |token| async move {
            catalog.list_shared_albums_page(token.as_deref()).await
        })
        .await?;
        albums.extend(shared);
    }

    Ok(albums)
}

/// List the non-archived items of one album, in API order.
pub async fn search_all_album_media_items(
    catalog: &dyn RemoteCatalog,
    album_id: &str,
) -> Result<Vec<MediaItem>, PhotosError> {
    paginate("mediaItems:search", |token| async move {
        catalog.search_album_page(album_id, token.as_deref()).await
    })
    .await
}

/// `RemoteCatalog` backed by the Google Photos Library REST API.
pub struct GooglePhotosClient {
    http: Client,
    base_url: String,
    /// Sent on API calls only. Media byte URLs are pre-signed and may live
    /// on other hosts.
    auth: HeaderValue,
    retry: RetryConfig,
}

impl std::fmt::Debug for GooglePhotosClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GooglePhotosClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GooglePhotosClient {
    pub fn new(
        access_token: &str,
        base_url: impl Into<String>,
        retry: RetryConfig,
        timeout: Duration,
    ) -> Result<Self, PhotosError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {access_token}")).map_err(|_| {
            PhotosError::Api {
                status: 0,
                endpoint: "credentials".to_string(),
                message: "access token contains characters not allowed in a header".to_string(),
            }
        })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("gpsync/", env!("CARGO_PKG_VERSION"))),
        );

        let http = Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            retry,
        })
    }

    /// Request against the API base URL, carrying the bearer token.
    fn api_request(&self, method: reqwest::Method, endpoint: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.base_url, endpoint))
            .header(AUTHORIZATION, self.auth.clone())
    }

    /// Unauthenticated GET for a media byte URL.
    fn byte_request(&self, url: &str) -> RequestBuilder {
        self.http.get(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, PhotosError> {
        self.with_retry(endpoint, || async {
            let resp = self
                .api_request(reqwest::Method::GET, endpoint)
                .query(query)
                .send()
                .await?;
            decode_json(endpoint, resp).await
        })
        .await
    }

    async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T, PhotosError>
    where
        B: serde::Serialize + Sync,
        T: DeserializeOwned,
    {
        self.with_retry(endpoint, || async {
            let resp = self
                .api_request(reqwest::Method::POST, endpoint)
                .json(body)
                .send()
                .await?;
            decode_json(endpoint, resp).await
        })
        .await
    }

    async fn with_retry<T, F, Fut>(&self, endpoint: &str, op: F) -> Result<T, PhotosError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, PhotosError>>,
    {
        retry::retry_with_backoff(
            &self.retry,
            endpoint,
            |e: &PhotosError| {
                if e.is_retryable() {
                    RetryAction::Retry
                } else {
                    debug!("{} failed permanently: {}", endpoint, e);
                    RetryAction::Abort
                }
            },
            op,
        )
        .await
    }
}

async fn decode_json<T: DeserializeOwned>(endpoint: &str, resp: Response) -> Result<T, PhotosError> {
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(PhotosError::Api {
            status: status.as_u16(),
            endpoint: endpoint.to_string(),
            message,
        });
    }
    let body = resp.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

fn page_query(page_size: u32, page_token: Option<&str>) -> Vec<(&'static str, String)> {
    let mut query = vec![("pageSize", page_size.to_string())];
    if let Some(token) = page_token {
        query.push(("pageToken", token.to_string()));
    }
    query
}

#[async_trait]
impl RemoteCatalog for GooglePhotosClient {
    async fn list_albums_page(
        &self,
        page_token: Option<&str>,
    ) -> Result<Page<Album>, PhotosError> {
        let resp: ListAlbumsResponse = self
            .get_json("albums", &page_query(ALBUM_PAGE_SIZE, page_token))
            .await?;
        Ok(resp.into())
    }

    async fn list_shared_albums_page(
        &self,
        page_token: Option<&str>,
    ) -> Result<Page<Album>, PhotosError> {
        let resp: ListSharedAlbumsResponse = self
            .get_json("sharedAlbums", &page_query(ALBUM_PAGE_SIZE, page_token))
            .await?;
        Ok(resp.into())
    }

    async fn search_album_page(
        &self,
        album_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<MediaItem>, PhotosError> {
        let request = SearchMediaItemsRequest {
            album_id: album_id.to_string(),
            page_size: MEDIA_ITEM_PAGE_SIZE,
            page_token: page_token.map(str::to_string),
        };
        let resp: SearchMediaItemsResponse = self.post_json("mediaItems:search", &request).await?;
        Ok(resp.into())
    }

    async fn get_media_item(&self, id: &str) -> Result<MediaItem, PhotosError> {
        self.get_json(&format!("mediaItems/{id}"), &[]).await
    }

    async fn fetch_bytes(&self, url: &str) -> Result<(u16, Bytes), PhotosError> {
        let resp = self.byte_request(url).send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;
        Ok((status, body))
    }
}
