//! Configuration for the herbarium client

use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// Default upper bound for uploaded specimen images (5 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Connection settings for the managed backend.
/// Load these from the environment or a secrets source, never hard-code them.
#[derive(Debug, Clone)]
pub struct HerbariumConfig {
    pub url: Url,
    pub anon_key: String,
    pub options: ClientOptions,
}

impl HerbariumConfig {
    /// Creates a new configuration, validating the URL.
    pub fn new(url_str: &str, anon_key: String) -> Result<Self> {
        let url = Url::parse(url_str)?;
        if anon_key.is_empty() {
            return Err(Error::config("anon_key cannot be empty"));
        }
        Ok(Self {
            url,
            anon_key,
            options: ClientOptions::default(),
        })
    }

    /// Reads `HERBARIUM_URL`, `HERBARIUM_ANON_KEY` and the optional
    /// `HERBARIUM_GEOCODER_URL` from the environment.
    pub fn from_env() -> Result<Self> {
        let url_str = std::env::var("HERBARIUM_URL")
            .map_err(|_| Error::config("HERBARIUM_URL environment variable not found"))?;
        let anon_key = std::env::var("HERBARIUM_ANON_KEY")
            .map_err(|_| Error::config("HERBARIUM_ANON_KEY environment variable not found"))?;

        let mut config = Self::new(&url_str, anon_key)?;
        if let Ok(geocoder) = std::env::var("HERBARIUM_GEOCODER_URL") {
            config.options = config.options.with_geocoder_url(&geocoder);
        }
        Ok(config)
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Base URL without the trailing slash `Url` adds to bare hosts
    pub fn base_url(&self) -> String {
        self.url.as_str().trim_end_matches('/').to_string()
    }
}

/// Realtime connection tuning
#[derive(Debug, Clone)]
pub struct RealtimeOptions {
    pub heartbeat_interval: Duration,
    pub reconnect_interval: Duration,
    pub reconnect_backoff_factor: f64,
    pub max_reconnect_interval: Duration,
    /// `None` retries forever
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for RealtimeOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            reconnect_interval: Duration::from_secs(1),
            reconnect_backoff_factor: 1.5,
            max_reconnect_interval: Duration::from_secs(30),
            max_reconnect_attempts: None,
        }
    }
}

/// Configuration options for the herbarium client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// The database schema
    pub db_schema: String,

    /// Active specimen collection
    pub specimens_collection: String,

    /// Collection holding specimens removed from circulation
    pub archive_collection: String,

    /// User profile collection
    pub users_collection: String,

    /// Social feed collection
    pub posts_collection: String,

    /// Storage bucket for specimen images
    pub image_bucket: String,

    /// Largest accepted image upload in bytes
    pub max_upload_bytes: u64,

    /// How long a role guard waits for session data before redirecting
    pub guard_timeout: Duration,

    /// Reverse geocoding endpoint
    pub geocoder_url: String,

    pub realtime: RealtimeOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            db_schema: "public".to_string(),
            specimens_collection: "specimens".to_string(),
            archive_collection: "archived_specimens".to_string(),
            users_collection: "users".to_string(),
            posts_collection: "posts".to_string(),
            image_bucket: "specimen-images".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            guard_timeout: Duration::from_secs(10),
            geocoder_url: "https://nominatim.openstreetmap.org".to_string(),
            realtime: RealtimeOptions::default(),
        }
    }
}

impl ClientOptions {
    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the database schema
    pub fn with_db_schema(mut self, value: &str) -> Self {
        self.db_schema = value.to_string();
        self
    }

    pub fn with_specimens_collection(mut self, value: &str) -> Self {
        self.specimens_collection = value.to_string();
        self
    }

    pub fn with_archive_collection(mut self, value: &str) -> Self {
        self.archive_collection = value.to_string();
        self
    }

    pub fn with_users_collection(mut self, value: &str) -> Self {
        self.users_collection = value.to_string();
        self
    }

    pub fn with_posts_collection(mut self, value: &str) -> Self {
        self.posts_collection = value.to_string();
        self
    }

    /// Set the image bucket
    pub fn with_image_bucket(mut self, value: &str) -> Self {
        self.image_bucket = value.to_string();
        self
    }

    /// Set the upload limit in bytes
    pub fn with_max_upload_bytes(mut self, value: u64) -> Self {
        self.max_upload_bytes = value;
        self
    }

    /// Set the role guard timeout
    pub fn with_guard_timeout(mut self, value: Duration) -> Self {
        self.guard_timeout = value;
        self
    }

    /// Set the reverse geocoding endpoint
    pub fn with_geocoder_url(mut self, value: &str) -> Self {
        self.geocoder_url = value.trim_end_matches('/').to_string();
        self
    }

    pub fn with_realtime(mut self, value: RealtimeOptions) -> Self {
        self.realtime = value;
        self
    }
}
