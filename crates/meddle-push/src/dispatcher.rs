use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use meddle_types::NotificationPayload;

use crate::error::DispatchError;
use crate::message::MulticastMessage;

/// A push provider that delivers one multicast message per call.
///
/// Success means every device in the message was accepted; nothing is
/// retried.
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn send_multicast(&self, message: &MulticastMessage) -> Result<(), DispatchError>;
}

/// Builds multicast messages and hands them to a provider.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    provider: Arc<dyn PushProvider>,

    /// Icon shown by web and Android clients
    icon_url: Option<String>,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn PushProvider>, icon_url: Option<String>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner { provider, icon_url }),
        }
    }

    /// Send `payload` to every token in one call. Returns the message that
    /// was accepted. At most one attempt is made; nothing is retried.
    pub async fn send(
        &self,
        tokens: Vec<String>,
        payload: &NotificationPayload,
    ) -> Result<MulticastMessage, DispatchError> {
        if tokens.is_empty() {
            return Err(DispatchError::EmptyTokens);
        }

        let message = MulticastMessage::build(tokens, payload, self.inner.icon_url.as_deref());
        self.inner.provider.send_multicast(&message).await?;

        debug!(
            tokens = message.tokens.len(),
            title = %message.notification.title,
            "Multicast accepted"
        );
        Ok(message)
    }
}
