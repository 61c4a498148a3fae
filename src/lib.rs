//! Herbarium catalog client
//!
//! Specimen records, role-gated sessions, reports and the researcher feed
//! for a university herbarium, backed by a managed database with auth,
//! object storage and realtime change feeds.

pub mod auth;
pub mod config;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod geocode;
pub mod guard;
pub mod realtime;
pub mod report;
pub mod specimen;
pub mod storage;
pub mod store;
pub mod users;

use reqwest::Client;
use std::sync::Arc;

use crate::auth::{AuthClient, SessionState};
use crate::config::HerbariumConfig;
use crate::feed::Feed;
use crate::fetch::AccessToken;
use crate::geocode::Geocoder;
use crate::guard::RoleGuard;
use crate::realtime::RealtimeListener;
use crate::specimen::SpecimenAccess;
use crate::storage::ImageUploader;
use crate::store::RestStore;
use crate::users::{Role, UserDirectory};

pub use crate::config::ClientOptions;

/// The main entry point, wiring every service to one backend project
pub struct Herbarium {
    config: HerbariumConfig,

    /// HTTP client shared by all services
    http_client: Client,

    store: Arc<RestStore>,

    auth: AuthClient<RestStore>,

    users: UserDirectory<RestStore>,

    specimens: SpecimenAccess<RestStore>,

    feed: Feed<RestStore>,

    session: SessionState,

    /// Signed-in user's token, read by every service at request time
    access_token: AccessToken,
}

impl Herbarium {
    /// Create a client for the configured project
    ///
    /// # Example
    ///
    /// ```no_run
    /// use herbarium::config::HerbariumConfig;
    /// use herbarium::Herbarium;
    ///
    /// # async fn run() -> herbarium::error::Result<()> {
    /// let config = HerbariumConfig::new("https://your-project.example.co", "your-anon-key".to_string())?;
    /// let herbarium = Herbarium::new(config);
    /// let specimens = herbarium.specimens().get_all_specimens().await;
    /// println!("{} specimens", specimens.value.len());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: HerbariumConfig) -> Self {
        let url = config.base_url();
        let key = config.anon_key.clone();
        let options = &config.options;
        let http_client = Client::new();
        let access_token = AccessToken::new();

        let store = Arc::new(
            RestStore::new(&url, &key, http_client.clone())
                .with_schema(&options.db_schema)
                .with_request_timeout(options.request_timeout)
                .with_access_token(access_token.clone()),
        );
        let users =
            UserDirectory::new(Arc::clone(&store)).with_collection(&options.users_collection);
        let specimens = SpecimenAccess::new(Arc::clone(&store))
            .with_collections(&options.specimens_collection, &options.archive_collection);
        let feed = Feed::new(Arc::clone(&store)).with_collection(&options.posts_collection);

        let session = SessionState::new();
        let token_cell = access_token.clone();
        let auth = AuthClient::new(&url, &key, http_client.clone(), users.clone(), session.clone())
            .with_request_timeout(options.request_timeout)
            .with_token_listener(move |token| token_cell.set(token));

        Self {
            config,
            http_client,
            store,
            auth,
            users,
            specimens,
            feed,
            session,
            access_token,
        }
    }

    /// Build from `HERBARIUM_URL` and `HERBARIUM_ANON_KEY`
    pub fn from_env() -> error::Result<Self> {
        Ok(Self::new(HerbariumConfig::from_env()?))
    }

    pub fn config(&self) -> &HerbariumConfig {
        &self.config
    }

    /// Sign up, sign in and sign out
    pub fn auth(&self) -> &AuthClient<RestStore> {
        &self.auth
    }

    pub fn users(&self) -> &UserDirectory<RestStore> {
        &self.users
    }

    pub fn specimens(&self) -> &SpecimenAccess<RestStore> {
        &self.specimens
    }

    pub fn feed(&self) -> &Feed<RestStore> {
        &self.feed
    }

    /// Session phase shared with route guards
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Guard for a page subtree open to `roles`
    pub fn guard(&self, roles: &[Role]) -> RoleGuard {
        RoleGuard::new(roles).with_timeout(self.config.options.guard_timeout)
    }

    pub fn uploader(&self) -> ImageUploader {
        ImageUploader::new(
            &self.config.base_url(),
            &self.config.anon_key,
            self.http_client.clone(),
            &self.config.options.image_bucket,
            self.config.options.max_upload_bytes,
        )
        .with_request_timeout(self.config.options.request_timeout)
        .with_access_token(self.access_token.clone())
    }

    pub fn geocoder(&self) -> Geocoder {
        Geocoder::new(&self.config.options.geocoder_url, self.http_client.clone())
            .with_request_timeout(self.config.options.request_timeout)
    }

    /// Listener that feeds remote changes on the catalog collections into
    /// open subscriptions. Call [`RealtimeListener::start`] to connect.
    pub fn realtime(&self) -> RealtimeListener {
        let options = &self.config.options;
        RealtimeListener::new(
            &self.config.base_url(),
            &self.config.anon_key,
            self.store.change_publisher(),
        )
        .with_options(options.realtime.clone())
        .with_schema(&options.db_schema)
        .with_access_token(self.access_token.clone())
        .listen_to(&[
            options.specimens_collection.as_str(),
            options.users_collection.as_str(),
            options.posts_collection.as_str(),
        ])
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::auth::{SessionPhase, SessionUser};
    pub use crate::config::{ClientOptions, HerbariumConfig};
    pub use crate::error::{Error, Result};
    pub use crate::guard::{GuardState, RoleGuard, Route};
    pub use crate::report::{export_csv, ReportFilter, ReportKind, ReportViews};
    pub use crate::specimen::{ConservationStatus, Fetched, NewSpecimen, Specimen, SpecimenPatch};
    pub use crate::users::{AccountStatus, Role, UserProfile};
    pub use crate::Herbarium;
}
