//! Remote library access against the Google Photos Library API: paginated
//! album and item enumeration, single-item metadata refresh, raw byte fetches.

pub mod client;
pub mod error;
#[cfg(test)]
pub mod testing;
pub mod types;

pub use client::{
    list_all_albums, search_all_album_media_items, GooglePhotosClient, RemoteCatalog,
    DEFAULT_API_BASE_URL,
};
pub use error::PhotosError;
pub use types::{Album, MediaItem, MediaKind};
