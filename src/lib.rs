pub mod account;
pub mod api;
pub mod assistant;
pub mod chat;
pub mod config;
pub mod emotion;
pub mod error;
pub mod notify;
pub mod storage;

use std::sync::Arc;
use tracing::info;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use account::Account;
pub use api::ApiClient;
pub use assistant::Conversation;
pub use chat::ChatSession;
pub use notify::{NotificationCenter, Notifier};
pub use storage::{LocalStore, Sealer};

/// Services shared by every front end of the client.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub store: Arc<LocalStore>,
    pub api: ApiClient,
    pub notifications: Arc<NotificationCenter>,
}

impl AppState {
    pub fn new(config: Settings) -> Result<Self> {
        let sealer = config
            .storage
            .passphrase
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(Sealer::from_passphrase);
        let store = Arc::new(LocalStore::open(&config.storage.path, sealer)?);
        let api = ApiClient::new(&config.api, store.clone())?;
        info!(api = %api.base_url(), store = %config.storage.path.display(), "client state ready");

        Ok(Self {
            config: Arc::new(config),
            store,
            api,
            notifications: Arc::new(NotificationCenter::default()),
        })
    }

    pub fn account(&self) -> Account {
        Account::new(self.api.clone())
    }

    pub fn chat_session(&self) -> ChatSession {
        ChatSession::new(
            self.config.chat.clone(),
            Arc::new(self.api.clone()),
            self.store.clone(),
            self.notifications.clone(),
        )
    }

    pub fn conversation(&self) -> Conversation {
        Conversation::new(self.api.clone())
    }
}
