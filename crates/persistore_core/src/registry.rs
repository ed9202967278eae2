//! Shared adapters.
//!
//! Every store bound through the same [`StorageRegistry`] shares one adapter
//! per backend, so platform subscriptions are reference-counted across
//! stores instead of being attached once per binding.

use persistore_storage::{
    create_cookie_storage_with, create_indexed_storage_with, create_local_storage, create_session_storage, Adapter,
    CookieOptions, CookieStorage, IndexedDbConfig, IndexedStorage, Platform, WebStorage,
};
use std::cell::OnceCell;
use std::rc::Rc;

/// Lazily created adapters over one [`Platform`].
#[derive(Debug)]
pub struct StorageRegistry {
    platform: Platform,
    cookie_options: CookieOptions,
    indexed_db_config: IndexedDbConfig,
    listen_external_changes: bool,
    cookie: OnceCell<Rc<Adapter<CookieStorage>>>,
    local: OnceCell<Rc<Adapter<WebStorage>>>,
    session: OnceCell<Rc<Adapter<WebStorage>>>,
    indexed: OnceCell<Rc<Adapter<IndexedStorage>>>,
}

impl StorageRegistry {
    /// Creates a registry with default adapter settings. Local and session
    /// storage do not follow external changes.
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            cookie_options: CookieOptions::default(),
            indexed_db_config: IndexedDbConfig::default(),
            listen_external_changes: false,
            cookie: OnceCell::new(),
            local: OnceCell::new(),
            session: OnceCell::new(),
            indexed: OnceCell::new(),
        }
    }

    /// Sets the options of the shared cookie adapter.
    #[must_use]
    pub fn with_cookie_options(mut self, options: CookieOptions) -> Self {
        self.cookie_options = options;
        self
    }

    /// Sets where the shared IndexedDB adapter keeps values.
    #[must_use]
    pub fn with_indexed_db_config(mut self, config: IndexedDbConfig) -> Self {
        self.indexed_db_config = config;
        self
    }

    /// Makes the shared local and session adapters follow changes made by
    /// other pages.
    #[must_use]
    pub fn with_external_changes(mut self, listen: bool) -> Self {
        self.listen_external_changes = listen;
        self
    }

    /// The platform adapters are created from.
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// The shared cookie adapter.
    pub fn cookie(&self) -> Rc<Adapter<CookieStorage>> {
        Rc::clone(self.cookie.get_or_init(|| {
            Rc::new(create_cookie_storage_with(&self.platform, self.cookie_options.clone()))
        }))
    }

    /// The shared `localStorage` adapter.
    pub fn local(&self) -> Rc<Adapter<WebStorage>> {
        Rc::clone(
            self.local
                .get_or_init(|| Rc::new(create_local_storage(&self.platform, self.listen_external_changes))),
        )
    }

    /// The shared `sessionStorage` adapter.
    pub fn session(&self) -> Rc<Adapter<WebStorage>> {
        Rc::clone(
            self.session
                .get_or_init(|| Rc::new(create_session_storage(&self.platform, self.listen_external_changes))),
        )
    }

    /// The shared IndexedDB adapter.
    pub fn indexed(&self) -> Rc<Adapter<IndexedStorage>> {
        Rc::clone(self.indexed.get_or_init(|| {
            Rc::new(create_indexed_storage_with(&self.platform, self.indexed_db_config.clone()))
        }))
    }
}
