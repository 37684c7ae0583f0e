//! Session state and the 401 refresh flow.
//!
//! The manager owns the access token and is the only place that mutates
//! it. Every protected request goes through [`SessionManager::dispatch`],
//! which attaches the current token and, on a 401, funnels all concurrent
//! callers through one shared refresh before replaying each original
//! request exactly once.
//!
//! State machine:
//!
//! ```text
//! Anonymous --login success--> Authenticated
//! Authenticated --401, refresh success--> Authenticated (token rotated)
//! Authenticated --401, refresh in flight--> Refreshing --resolved--> Authenticated | Anonymous
//! Authenticated | Refreshing --refresh failure--> Anonymous
//! ```
//!
//! Transitions are published on a watch channel; UI code subscribes via
//! [`SessionManager::subscribe`] instead of polling the token store.

pub mod store;

use std::sync::Arc;

use reqwest::{Response, StatusCode};
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, info, warn};
use url::Url;

use evently_types::{LoginRequest, LoginResponse, RegisterRequest};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::request::RequestDescriptor;
use crate::session::store::TokenStore;

/// Where the session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No token held; protected affordances should be hidden.
    Anonymous,
    /// A token is held and attached to outgoing requests.
    Authenticated,
    /// A refresh is in flight; 401 callers are parked on its outcome.
    Refreshing,
}

/// Token plus a write counter.
///
/// The epoch advances on every token write (login, rotation, teardown), so
/// a 401 caller that waited on the refresh gate can tell whether another
/// caller already resolved the refresh while it was parked.
#[derive(Debug, Default)]
struct TokenSlot {
    token: Option<String>,
    epoch: u64,
}

/// Owns the access token and recovers from its expiry.
#[derive(Debug)]
pub struct SessionManager {
    http: reqwest::Client,
    base: Url,
    slot: RwLock<TokenSlot>,
    /// Serializes refreshes; held across the refresh network call only.
    refresh_gate: Mutex<()>,
    state_tx: watch::Sender<SessionState>,
    store: Arc<dyn TokenStore>,
}

impl SessionManager {
    /// Build a manager, restoring any token the store persisted earlier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unparseable base URL and
    /// [`Error::Transport`] when the HTTP client cannot be constructed.
    pub async fn new(config: &ClientConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|error| Error::Config(format!("bad base URL {}: {error}", config.base_url)))?;
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            // The long-lived refresh credential is an HTTP-only cookie.
            .cookie_store(true);
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        let http = builder.build()?;

        let token = store.load().await;
        let state = if token.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Anonymous
        };
        let (state_tx, _) = watch::channel(state);
        Ok(Self {
            http,
            base,
            slot: RwLock::new(TokenSlot { token, epoch: 0 }),
            refresh_gate: Mutex::new(()),
            state_tx,
            store,
        })
    }

    /// Current state. `Refreshing` is only observable through
    /// [`subscribe`](Self::subscribe) while a refresh is in flight.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Watch session transitions instead of polling storage.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Whether a token is currently held.
    pub async fn is_authenticated(&self) -> bool {
        self.slot.read().await.token.is_some()
    }

    /// Establish a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MutationFailed`] when the server rejects the
    /// credentials or the call cannot be completed.
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let outcome: Result<LoginResponse> = async {
            let response = self
                .http
                .post(self.endpoint("/auth/login")?)
                .json(&LoginRequest {
                    email: email.to_owned(),
                    password: password.to_owned(),
                })
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(Error::from_response(response).await);
            }
            Ok(response.json().await?)
        }
        .await;
        let response = outcome.map_err(Error::into_mutation_failed)?;
        info!("login succeeded");
        self.install_token(response.access_token).await;
        Ok(())
    }

    /// Create an account. A plain mutating call; the session is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MutationFailed`] when the server rejects the
    /// registration.
    pub async fn register(&self, email: &str, password: &str) -> Result<()> {
        let outcome: Result<()> = async {
            let response = self
                .http
                .post(self.endpoint("/auth/register")?)
                .json(&RegisterRequest {
                    email: email.to_owned(),
                    password: password.to_owned(),
                })
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(Error::from_response(response).await);
            }
            Ok(())
        }
        .await;
        outcome.map_err(Error::into_mutation_failed)
    }

    /// Drop the session. Client-side only; the server keeps its cookie.
    pub async fn logout(&self) {
        info!("logging out");
        self.clear_session().await;
    }

    /// Send a request with the current bearer token, transparently running
    /// the 401 refresh flow.
    ///
    /// Callers get the response back for any status except 401. Auth
    /// recovery is invisible unless it fails, in which case the session is
    /// cleared and [`Error::AuthExpired`] is returned. A request is
    /// replayed at most once; a replay that still comes back 401 never
    /// triggers a second refresh.
    ///
    /// # Errors
    ///
    /// [`Error::AuthExpired`] when recovery failed, [`Error::Transport`]
    /// when the request could not be sent.
    pub async fn dispatch(&self, request: &RequestDescriptor) -> Result<Response> {
        let (token, epoch) = {
            let slot = self.slot.read().await;
            (slot.token.clone(), slot.epoch)
        };
        let response = self.send(request, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(path = %request.path, "request unauthorized, entering refresh flow");
        let token = self.refresh_or_wait(epoch).await?;

        let response = self.send(request, Some(&token)).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(path = %request.path, "replay still unauthorized, ending session");
            self.clear_session().await;
            return Err(Error::AuthExpired);
        }
        Ok(response)
    }

    /// Either perform the refresh or wait for the one already in flight.
    ///
    /// The gate serializes refreshes. After acquiring it, the epoch decides
    /// whether this caller still has work to do: an advanced epoch means a
    /// sibling already rotated the token (replay with it) or tore the
    /// session down (fail without another network call).
    async fn refresh_or_wait(&self, observed_epoch: u64) -> Result<String> {
        let _gate = self.refresh_gate.lock().await;
        {
            let slot = self.slot.read().await;
            if slot.epoch != observed_epoch {
                return slot.token.clone().ok_or(Error::AuthExpired);
            }
        }

        self.state_tx.send_replace(SessionState::Refreshing);
        match self.refresh().await {
            Ok(token) => {
                info!("access token rotated");
                self.install_token(token.clone()).await;
                Ok(token)
            }
            Err(error) => {
                warn!(%error, "token refresh failed, session ended");
                self.clear_session().await;
                Err(Error::AuthExpired)
            }
        }
    }

    /// Exchange the long-lived cookie credential for a new access token.
    async fn refresh(&self) -> Result<String> {
        let response = self.http.post(self.endpoint("/auth/refresh")?).send().await?;
        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }
        let response: LoginResponse = response.json().await?;
        Ok(response.access_token)
    }

    async fn send(&self, request: &RequestDescriptor, token: Option<&str>) -> Result<Response> {
        let url = self.endpoint(&request.path)?;
        let builder = request.build(&self.http, url, token)?;
        Ok(builder.send().await?)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|error| Error::Config(format!("bad request path {path}: {error}")))
    }

    /// Store a token and broadcast the transition. The slot write is a
    /// single critical section: no caller can observe "decided to refresh"
    /// without the token already stored.
    async fn install_token(&self, token: String) {
        {
            let mut slot = self.slot.write().await;
            slot.token = Some(token.clone());
            slot.epoch += 1;
        }
        self.store.save(&token).await;
        self.state_tx.send_replace(SessionState::Authenticated);
    }

    async fn clear_session(&self) {
        {
            let mut slot = self.slot.write().await;
            slot.token = None;
            slot.epoch += 1;
        }
        self.store.clear().await;
        self.state_tx.send_replace(SessionState::Anonymous);
    }
}
