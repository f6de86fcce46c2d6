//! Push Dispatcher: turns a notification payload into one multicast message
//! and sends it to the push provider.
//!
//! - `message`: multicast model with web push, Android and APNs sub-payloads
//! - `dispatcher`: `PushProvider` seam and the `Dispatcher` handle
//! - `fcm`: reqwest client for FCM HTTP v1
//! - `auth`: service account bearer tokens for that client

pub mod auth;
pub mod dispatcher;
pub mod error;
pub mod fcm;
pub mod message;

pub use auth::{AccessTokenSource, ServiceAccountKey};
pub use dispatcher::{Dispatcher, PushProvider};
pub use error::DispatchError;
pub use fcm::{FcmClient, FcmConfig};
pub use message::MulticastMessage;
