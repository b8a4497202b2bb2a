//! Forum client core: persisted session store, forum REST client and an
//! auto-reconnecting chat channel. Front-ends (the `forum-chat` binary, or any
//! other renderer) only call into these types.

pub mod auth;
pub mod channel;
pub mod config;
pub mod error;
pub mod forum;
pub mod history;
pub mod messages;
pub mod session;
pub mod storage;
pub mod view;

pub use auth::AuthClient;
pub use channel::{ConnectionState, MessageHandler, RealtimeChannel};
pub use config::{default_config_path, ApiSection, ChatSection, Config, ConfigError, StorageSection};
pub use error::{ApiError, AuthError, ChannelError, NetworkError, RegistrationError, StorageError};
pub use forum::{Category, Comment, ForumClient, Post};
pub use history::ChatHistory;
pub use messages::{ChatMessage, HistoryEntry, RegistrationResult};
pub use session::{Role, Session, SessionStore};
pub use storage::{FileStorage, MemoryStorage, SessionStorage};
pub use view::{can_delete, is_visible, visible_sections, Section};
