//! Image uploads to object storage

mod types;

use reqwest::{multipart, Client};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, FieldError, Result};
use crate::fetch::{api_error, AccessToken, CLIENT_INFO};

pub use types::*;

/// Uploads validated images into one public bucket
#[derive(Debug, Clone)]
pub struct ImageUploader {
    /// The base URL for the backend project
    url: String,

    /// The API key
    key: String,

    /// HTTP client used for requests
    client: Client,

    bucket: String,

    max_bytes: u64,

    request_timeout: Option<Duration>,

    /// Signed-in user's token so storage policies see the uploader
    access_token: AccessToken,
}

impl ImageUploader {
    pub fn new(url: &str, key: &str, client: Client, bucket: &str, max_bytes: u64) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            client,
            bucket: bucket.to_string(),
            max_bytes,
            request_timeout: None,
            access_token: AccessToken::new(),
        }
    }

    pub fn with_access_token(mut self, token: AccessToken) -> Self {
        self.access_token = token;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Content type must be `image/*` and the size within the limit
    pub fn validate(&self, image: &ImageUpload) -> Result<()> {
        let mut errors = Vec::new();
        if !image.content_type.starts_with("image/") {
            errors.push(FieldError::new("image", "Please select an image file"));
        }
        if image.bytes.is_empty() {
            errors.push(FieldError::new("image", "The selected file is empty"));
        } else if image.bytes.len() as u64 > self.max_bytes {
            errors.push(FieldError::new(
                "image",
                format!(
                    "Image must be smaller than {} MB",
                    self.max_bytes / (1024 * 1024)
                ),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors))
        }
    }

    /// Upload a specimen photo and return its public URL
    pub async fn upload_specimen_image(&self, image: ImageUpload) -> Result<String> {
        self.upload(ImageFolder::Specimens, image).await
    }

    /// Upload into `folder` under a fresh random name and return the public URL
    pub async fn upload(&self, folder: ImageFolder, image: ImageUpload) -> Result<String> {
        self.validate(&image)?;

        let path = format!("{}/{}.{}", folder.as_str(), Uuid::new_v4(), image.extension());
        let url = format!("{}/storage/v1/object/{}/{}", self.url, self.bucket, path);
        let size = image.bytes.len();

        let form = multipart::Form::new().part(
            "file",
            multipart::Part::bytes(image.bytes)
                .file_name(image.file_name)
                .mime_str(&image.content_type)?,
        );

        let mut request = self
            .client
            .post(&url)
            .header("apikey", &self.key)
            .header("x-client-info", CLIENT_INFO)
            .bearer_auth(self.access_token.bearer_or(&self.key))
            .header("cache-control", "3600")
            .header("x-upsert", "false")
            .multipart(form);
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let err = api_error(response).await;
            log::error!("Upload of {} failed: {}", path, err);
            return Err(Error::storage(format!("Upload failed: {}", err)));
        }

        log::info!("Uploaded {} ({} bytes)", path, size);
        Ok(self.public_url(&path))
    }

    /// Public URL for an object in the bucket
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.url, self.bucket, path
        )
    }
}
