//! Download collaborator for remote key material.
//!
//! Key descriptors only need "fetch this URL into that file". Transport,
//! retries and status mapping live behind [`Downloader`].

use std::path::Path;

use crate::error::FetchError;

mod http;

pub use http::HttpDownloader;

/// Fetches remote content into a local file.
pub trait Downloader {
    /// Download `url` into `destination`, replacing its content.
    fn download(&self, url: &str, destination: &Path) -> Result<(), FetchError>;
}

impl<D: Downloader + ?Sized> Downloader for &D {
    fn download(&self, url: &str, destination: &Path) -> Result<(), FetchError> {
        (**self).download(url, destination)
    }
}
