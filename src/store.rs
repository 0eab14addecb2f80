//! Puts images on disk, either from a URL or from bytes a model handed back.

use std::future::Future;
use std::io::Cursor;
use std::path::Path;

use tracing::{Instrument, Span, debug, error, info, info_span};

use crate::constants::{DOWNLOAD_TIMEOUT, DOWNLOAD_USER_AGENT};
use crate::error::{MemeError, check_status};

/// Somewhere images can be written to.
pub trait ImageStore {
    /// Downloads `url` and writes it to `path` as a JPEG.
    fn save_from_url(&self, url: &str, path: &Path)
    -> impl Future<Output = Result<(), MemeError>>;

    /// Writes image bytes to `path` as a JPEG.
    fn save_bytes(&self, bytes: &[u8], path: &Path) -> impl Future<Output = Result<(), MemeError>>;
}

/// [ImageStore] that fetches over HTTP and writes to the local filesystem.
#[derive(Clone, Debug)]
pub struct HttpImageStore {
    http: reqwest::Client,
    span: Span,
}

impl HttpImageStore {
    /// Builds the store with its own HTTP client (download timeout + user agent).
    pub fn new(span: Span) -> Result<Self, MemeError> {
        let http = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .user_agent(DOWNLOAD_USER_AGENT)
            .build()?;
        Ok(Self { http, span })
    }

    /// Store with a default span
    pub fn with_default_span() -> Result<Self, MemeError> {
        Self::new(info_span!("image_store"))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, MemeError> {
        let response = self.http.get(url).send().await?;
        let response = check_status("Image download", response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn fetch_and_write(&self, url: &str, path: &Path) -> Result<(), MemeError> {
        info!("Downloading image from: {}", url);
        let bytes = self
            .download(url)
            .await
            .inspect_err(|err| error!("Error downloading image: {}", err))?;
        self.write_jpeg(&bytes, path).await
    }

    async fn write_jpeg(&self, bytes: &[u8], path: &Path) -> Result<(), MemeError> {
        let jpeg = normalize_image_to_jpeg(bytes)
            .inspect_err(|err| error!("Not a usable image: {}", err))?;
        write_file(path, &jpeg)
            .await
            .inspect_err(|err| error!("Error saving image to {}: {}", path.display(), err))?;
        info!("Image saved successfully to: {}", path.display());
        Ok(())
    }
}

impl ImageStore for HttpImageStore {
    async fn save_from_url(&self, url: &str, path: &Path) -> Result<(), MemeError> {
        self.fetch_and_write(url, path)
            .instrument(self.span.clone())
            .await
    }

    async fn save_bytes(&self, bytes: &[u8], path: &Path) -> Result<(), MemeError> {
        self.write_jpeg(bytes, path)
            .instrument(self.span.clone())
            .await
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), MemeError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Ensures image bytes are a valid JPEG, converting if possible.
pub fn normalize_image_to_jpeg(bytes: &[u8]) -> Result<Vec<u8>, MemeError> {
    if bytes.len() < 4 {
        debug!("Image is too short");
        return Err(MemeError::MalformedResponse(format!(
            "image payload is only {} bytes",
            bytes.len()
        )));
    }

    let reader = image::ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = reader.format();
    let image = reader.decode()?;

    if format == Some(image::ImageFormat::Jpeg) {
        return Ok(bytes.to_vec());
    }

    debug!("Converting {:?} image to JPEG", format);
    // JPEG has no alpha channel
    let rgb = image.to_rgb8();
    let mut output = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new(&mut output);
    encoder.encode_image(&rgb)?;
    Ok(output)
}
