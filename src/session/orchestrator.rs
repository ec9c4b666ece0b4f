//! Session Orchestrator — turns a provider sign-in into a backend session.
//!
//! Flow per sign-in transition (strictly sequential):
//! 1. observe signed-out → signed-in
//! 2. ask the provider for a fresh token (none → silently stop)
//! 3. exchange it with the backend
//! 4. persist the credential pair and publish the session
//!
//! Every observed transition bumps a generation counter. An exchange started
//! by a sign-in only lands if its generation is still current when it
//! resolves, so a sign-out that arrives mid-flight wins.
//!
//! Direct calls to [`SessionOrchestrator::authenticate`] carry no generation:
//! overlapping calls are last-write-wins. All credential writes, logout
//! included, are serialized by one lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::provider::ProviderSession;
use crate::backend::SessionBackend;
use crate::errors::ClientError;
use crate::models::session::BackendSession;
use crate::store::CredentialStore;

/// What presentation code reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub session: Option<BackendSession>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    SignedIn { generation: u64 },
    SignedOut,
    Unchanged,
}

pub struct SessionOrchestrator {
    backend: Arc<dyn SessionBackend>,
    store: Arc<dyn CredentialStore>,
    state: watch::Sender<SessionState>,
    generation: AtomicU64,
    signed_in: AtomicBool,
    /// Held by every credential write and by logout.
    apply_lock: Mutex<()>,
}

impl SessionOrchestrator {
    pub fn new(backend: Arc<dyn SessionBackend>, store: Arc<dyn CredentialStore>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            backend,
            store,
            state,
            generation: AtomicU64::new(0),
            signed_in: AtomicBool::new(false),
            apply_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Exchange a provider token and persist the result, unconditionally.
    pub async fn authenticate(&self, provider_token: &str) -> Result<BackendSession, ClientError> {
        self.set_loading();
        match self.backend.exchange(provider_token).await {
            Ok(session) => {
                self.commit(&session, None).await?;
                Ok(session)
            }
            Err(e) => {
                self.fail(&e, None);
                Err(e)
            }
        }
    }

    /// Record the provider's current sign-in state and report whether it
    /// is a transition. Signing out clears the in-memory session and error;
    /// the credential store is left alone.
    pub fn begin_transition(&self, signed_in: bool) -> Transition {
        let was_signed_in = self.signed_in.swap(signed_in, Ordering::SeqCst);
        match (was_signed_in, signed_in) {
            (false, true) => {
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::debug!(generation, "provider signed in");
                Transition::SignedIn { generation }
            }
            (true, false) => {
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                self.state.send_modify(|s| {
                    s.session = None;
                    s.error = None;
                    s.loading = false;
                });
                tracing::debug!(generation, "provider signed out");
                Transition::SignedOut
            }
            _ => Transition::Unchanged,
        }
    }

    /// Steps 2 to 4 for a sign-in that [`begin_transition`] reported.
    ///
    /// Returns the session only if it was applied.
    ///
    /// [`begin_transition`]: SessionOrchestrator::begin_transition
    pub async fn complete_sign_in(
        &self,
        generation: u64,
        provider: &dyn ProviderSession,
    ) -> Option<BackendSession> {
        let token = match provider.get_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!(generation, "provider returned no token; skipping exchange");
                return None;
            }
            Err(e) => {
                tracing::debug!(generation, error = %e, "provider token unavailable; skipping exchange");
                return None;
            }
        };

        if !self.is_current(generation) {
            tracing::debug!(generation, "sign-in superseded before exchange");
            return None;
        }

        self.set_loading();
        match self.backend.exchange(&token).await {
            Ok(session) => {
                let applied = self.commit(&session, Some(generation)).await;
                matches!(applied, Ok(true)).then_some(session)
            }
            Err(e) => {
                self.fail(&e, Some(generation));
                None
            }
        }
    }

    /// Feed one observation of the provider's state through the orchestrator.
    pub async fn observe_transition(
        &self,
        signed_in: bool,
        provider: &dyn ProviderSession,
    ) -> Option<BackendSession> {
        match self.begin_transition(signed_in) {
            Transition::SignedIn { generation } => self.complete_sign_in(generation, provider).await,
            Transition::SignedOut | Transition::Unchanged => None,
        }
    }

    /// Follow the provider's sign-in state until the provider is dropped.
    ///
    /// Each sign-in exchange runs on its own task so that a sign-out is seen
    /// while the exchange is still in flight. A new sign-in epoch observed
    /// while already signed in counts as a sign-out followed by a sign-in.
    pub fn run(self: Arc<Self>, provider: Arc<dyn ProviderSession>) -> JoinHandle<()> {
        let mut rx = provider.watch();
        // Only the receiver is kept; holding the provider would keep its
        // sender alive and this loop would never end.
        let provider: Weak<dyn ProviderSession> = Arc::downgrade(&provider);

        tokio::spawn(async move {
            let mut seen_epoch: Option<u64> = None;
            loop {
                let observed = *rx.borrow_and_update();
                if observed.signed_in {
                    if seen_epoch.is_some_and(|epoch| epoch != observed.epoch) {
                        self.begin_transition(false);
                    }
                    seen_epoch = Some(observed.epoch);
                }

                if let Transition::SignedIn { generation } = self.begin_transition(observed.signed_in) {
                    let orchestrator = Arc::clone(&self);
                    let provider = provider.clone();
                    tokio::spawn(async move {
                        let Some(provider) = provider.upgrade() else {
                            tracing::debug!(generation, "provider dropped before exchange");
                            return;
                        };
                        orchestrator
                            .complete_sign_in(generation, provider.as_ref())
                            .await;
                    });
                }

                if rx.changed().await.is_err() {
                    tracing::debug!("provider dropped; session observer stopping");
                    break;
                }
            }
        })
    }

    /// Forget the session: clear stored credentials and in-memory state, and
    /// invalidate any exchange still in flight.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let _guard = self.apply_lock.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.store.clear().await?;
        self.state.send_replace(SessionState::default());
        tracing::info!("logged out; backend credentials cleared");
        Ok(())
    }

    /// Trade the stored refresh token for a new access token.
    ///
    /// The new token is only written if the refresh token it was obtained
    /// with is still the stored one: a logout or a new sign-in while the
    /// refresh was in flight wins.
    pub async fn refresh_session(&self) -> Result<String, ClientError> {
        let refresh_token = self
            .store
            .refresh_token()
            .await?
            .ok_or(ClientError::MissingCredential)?;

        let refreshed = match self.backend.refresh(&refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                self.fail(&e, None);
                return Err(e);
            }
        };

        let _guard = self.apply_lock.lock().await;
        match self.store.refresh_token().await? {
            Some(current) if current == refresh_token => {}
            Some(_) => {
                tracing::info!("credentials replaced during refresh; discarding refreshed token");
                return self
                    .store
                    .get()
                    .await?
                    .ok_or(ClientError::MissingCredential);
            }
            None => {
                tracing::info!("logged out during refresh; discarding refreshed token");
                return Err(ClientError::MissingCredential);
            }
        }

        self.store.set(&refreshed.access_token, &refresh_token).await?;
        self.state.send_modify(|s| {
            if let Some(session) = s.session.as_mut() {
                session.access_token = refreshed.access_token.clone();
            }
            s.error = None;
        });
        tracing::info!("access token refreshed");
        Ok(refreshed.access_token)
    }

    fn set_loading(&self) {
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });
    }

    /// Persist and publish a session. With a generation, nothing is kept
    /// unless it is still current once the write has finished; `Ok(false)`
    /// means the result was dropped.
    ///
    /// Writes are serialized with logout and refresh by `apply_lock`. A
    /// provider sign-out cannot take that lock, so one that lands during the
    /// write is handled by restoring the previous credentials.
    async fn commit(
        &self,
        session: &BackendSession,
        generation: Option<u64>,
    ) -> Result<bool, ClientError> {
        let _guard = self.apply_lock.lock().await;
        if generation.is_some_and(|g| !self.is_current(g)) {
            tracing::info!(?generation, "discarding exchange result from a superseded sign-in");
            return Ok(false);
        }

        let previous = match generation {
            Some(_) => Some((self.store.get().await?, self.store.refresh_token().await?)),
            None => None,
        };

        if let Err(e) = self
            .store
            .set(&session.access_token, &session.refresh_token)
            .await
        {
            let err = ClientError::Store(e);
            self.fail(&err, generation);
            return Err(err);
        }

        if let (Some(generation), Some(previous)) = (generation, previous) {
            if !self.is_current(generation) {
                tracing::info!(generation, "sign-in superseded during write; restoring previous credentials");
                match previous {
                    (Some(access), Some(refresh)) => self.store.set(&access, &refresh).await?,
                    _ => self.store.clear().await?,
                }
                return Ok(false);
            }
        }

        self.state.send_if_modified(|s| {
            if generation.is_some_and(|g| !self.is_current(g)) {
                return false;
            }
            s.session = Some(session.clone());
            s.loading = false;
            s.error = None;
            true
        });
        Ok(true)
    }

    fn fail(&self, error: &ClientError, generation: Option<u64>) {
        let message = error.user_message();
        self.state.send_if_modified(|s| {
            if generation.is_some_and(|g| !self.is_current(g)) {
                return false;
            }
            s.loading = false;
            s.error = Some(message.clone());
            true
        });
    }
}
