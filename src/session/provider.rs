use async_trait::async_trait;
use tokio::sync::{watch, RwLock};

/// Snapshot published by a provider.
///
/// `epoch` increases on every sign-in, so two sign-ins in a row are
/// distinguishable even when the sign-out between them was never observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderState {
    pub signed_in: bool,
    pub epoch: u64,
}

/// Sign-in state and token access of the external identity provider.
///
/// Popup flows, redirects and MFA all happen on the provider's side; this
/// crate only ever sees "signed in or not" and a fresh token on demand.
#[async_trait]
pub trait ProviderSession: Send + Sync {
    fn is_signed_in(&self) -> bool;

    /// Receiver that changes on every sign-in and sign-out.
    fn watch(&self) -> watch::Receiver<ProviderState>;

    /// A fresh provider token, or `None` when the provider has none to give.
    async fn get_token(&self) -> anyhow::Result<Option<String>>;
}

/// Provider fed by the host application, which performs the provider's own
/// sign-in and hands over the resulting token.
pub struct HandoffProvider {
    state: watch::Sender<ProviderState>,
    token: RwLock<Option<String>>,
}

impl HandoffProvider {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ProviderState::default());
        Self {
            state,
            token: RwLock::new(None),
        }
    }

    /// Record a completed provider sign-in.
    pub async fn sign_in(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
        self.state.send_modify(|s| {
            s.signed_in = true;
            s.epoch += 1;
        });
    }

    pub async fn sign_out(&self) {
        *self.token.write().await = None;
        self.state.send_modify(|s| s.signed_in = false);
    }

    /// Replace the token without changing sign-in state (the provider
    /// rotated it).
    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }
}

impl Default for HandoffProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderSession for HandoffProvider {
    fn is_signed_in(&self) -> bool {
        self.state.borrow().signed_in
    }

    fn watch(&self) -> watch::Receiver<ProviderState> {
        self.state.subscribe()
    }

    async fn get_token(&self) -> anyhow::Result<Option<String>> {
        Ok(self.token.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_in_publishes_state_and_token() {
        let provider = HandoffProvider::new();
        let mut rx = provider.watch();
        assert!(!provider.is_signed_in());

        provider.sign_in("pt-123").await;
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ProviderState { signed_in: true, epoch: 1 });
        assert_eq!(provider.get_token().await.unwrap().as_deref(), Some("pt-123"));
    }

    #[tokio::test]
    async fn test_sign_out_drops_token() {
        let provider = HandoffProvider::new();
        provider.sign_in("pt-123").await;
        provider.sign_out().await;
        assert!(!provider.is_signed_in());
        assert!(provider.get_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_each_sign_in_gets_a_new_epoch() {
        let provider = HandoffProvider::new();
        let rx = provider.watch();

        provider.sign_in("pt-1").await;
        provider.sign_out().await;
        provider.sign_in("pt-2").await;

        // The sign-out in between is coalesced away; the epoch is not.
        assert_eq!(*rx.borrow(), ProviderState { signed_in: true, epoch: 2 });
        assert_eq!(provider.get_token().await.unwrap().as_deref(), Some("pt-2"));
    }
}
