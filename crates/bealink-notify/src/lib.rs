//! bealink-notify: Bark push notifications for the Bealink agent.
//!
//! - `SettingsStore`: persisted `PushSettings` (`bealink_config.json`)
//! - `Dispatcher`: event gates, rate limit, payload templates, retrying
//!   delivery on a spawned task
//! - `crypto`: AES-128-CBC + PKCS#7 for Bark's encrypted push
//! - `PushTransport`: the HTTP seam, `ReqwestTransport` in production
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bealink_notify::{Dispatcher, NotifyOverrides, ReqwestTransport, SettingsStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), bealink_notify::NotifyError> {
//!     let settings = Arc::new(SettingsStore::load("bealink_config.json"));
//!     let dispatcher = Dispatcher::new(settings, Arc::new(ReqwestTransport::new()?));
//!     dispatcher.notify("test", NotifyOverrides::default());
//!     Ok(())
//! }
//! ```

pub mod crypto;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod limiter;
pub mod payload;
pub mod settings;
pub mod transport;

pub use crypto::{CipherKeys, KeyMaterial};
pub use dispatcher::{DeliveryOutcome, Dispatcher, PreparedNotification};
pub use error::{NotifyError, Result};
pub use events::{EventKind, SYSTEM_READY_EVENT, TEST_EVENT};
pub use payload::{EncryptedEnvelope, NotificationPayload, NotifyOverrides};
pub use settings::{PushSettings, PushTarget, SettingsStore};
pub use transport::{PushTransport, ReqwestTransport, TransportResponse};
