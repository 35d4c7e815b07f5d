//! Process-wide bootstrap status.
//!
//! One [`SessionManager`] owns the current attempt. Starting a new attempt
//! cancels the previous one, and a result is only published if it belongs
//! to the attempt that is still current.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use securevault_fhe::{ChainProvider, FheSession};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{BootstrapContext, acquire_session};
use crate::error::BootstrapError;

#[derive(Clone, Default)]
pub enum BootstrapStatus {
    #[default]
    Idle,
    Loading,
    Ready(Arc<dyn FheSession>),
    Error(BootstrapError),
}

impl BootstrapStatus {
    pub fn label(&self) -> &'static str {
        match self {
            BootstrapStatus::Idle => "FHEVM Not Initialized",
            BootstrapStatus::Loading => "Initializing FHEVM",
            BootstrapStatus::Ready(_) => "FHEVM Ready",
            BootstrapStatus::Error(_) => "FHEVM Error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BootstrapStatus::Ready(_) | BootstrapStatus::Error(_))
    }

    pub fn session(&self) -> Option<Arc<dyn FheSession>> {
        match self {
            BootstrapStatus::Ready(session) => Some(session.clone()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&BootstrapError> {
        match self {
            BootstrapStatus::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Debug for BootstrapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapStatus::Idle => f.write_str("Idle"),
            BootstrapStatus::Loading => f.write_str("Loading"),
            BootstrapStatus::Ready(session) => f
                .debug_struct("Ready")
                .field("chain_id", &session.chain_id())
                .finish_non_exhaustive(),
            BootstrapStatus::Error(e) => f.debug_tuple("Error").field(e).finish(),
        }
    }
}

struct Attempt {
    generation: u64,
    cancel: CancellationToken,
    /// Chain the caller asked for, when known
    target_chain: Option<u64>,
}

struct ManagerInner {
    context: BootstrapContext,
    status: watch::Sender<BootstrapStatus>,
    attempt: Mutex<Attempt>,
    last_step: Mutex<String>,
}

impl ManagerInner {
    fn attempt(&self) -> MutexGuard<'_, Attempt> {
        self.attempt.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Owns the bootstrap status and restarts bootstrap on demand.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    pub fn new(context: BootstrapContext) -> Self {
        let (status, _) = watch::channel(BootstrapStatus::Idle);
        Self {
            inner: Arc::new(ManagerInner {
                context,
                status,
                attempt: Mutex::new(Attempt {
                    generation: 0,
                    cancel: CancellationToken::new(),
                    target_chain: None,
                }),
                last_step: Mutex::new(String::new()),
            }),
        }
    }

    pub fn status(&self) -> BootstrapStatus {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BootstrapStatus> {
        self.inner.status.subscribe()
    }

    /// Most recent step reported by the running or last attempt.
    pub fn last_step(&self) -> String {
        self.inner
            .last_step
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn session(&self) -> Option<Arc<dyn FheSession>> {
        self.status().session()
    }

    /// Cancel any running attempt and start a new one.
    pub fn start(&self, provider: Arc<dyn ChainProvider>) -> JoinHandle<()> {
        self.start_attempt(provider, None)
    }

    fn start_attempt(
        &self,
        provider: Arc<dyn ChainProvider>,
        target_chain: Option<u64>,
    ) -> JoinHandle<()> {
        let (generation, cancel) = {
            let mut attempt = self.inner.attempt();
            attempt.cancel.cancel();
            attempt.generation += 1;
            attempt.cancel = CancellationToken::new();
            attempt.target_chain = target_chain;
            self.inner.status.send_replace(BootstrapStatus::Loading);
            (attempt.generation, attempt.cancel.clone())
        };
        self.inner
            .last_step
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        debug!("Starting bootstrap attempt {generation}");

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let step_sink = inner.clone();
            let on_status = move |step: &str| {
                // a superseded attempt must not overwrite the live step
                if step_sink.attempt().generation == generation {
                    *step_sink
                        .last_step
                        .lock()
                        .unwrap_or_else(|e| e.into_inner()) = step.to_string();
                }
            };
            let result = acquire_session(&inner.context, provider, &cancel, &on_status).await;

            let attempt = inner.attempt();
            if attempt.generation != generation {
                debug!("Discarding result of superseded bootstrap attempt {generation}");
                return;
            }
            let next = match result {
                Ok(session) => {
                    info!("FHEVM ready on chain {}", session.chain_id());
                    BootstrapStatus::Ready(session)
                }
                Err(e) => {
                    warn!("FHEVM bootstrap failed: {e}");
                    BootstrapStatus::Error(e)
                }
            };
            inner.status.send_replace(next);
            drop(attempt);
        })
    }

    /// Cancel the running attempt. It ends in `Error(Cancelled)`.
    pub fn cancel(&self) {
        self.inner.attempt().cancel.cancel();
    }

    /// Restart unless a session for `chain_id` is ready or on its way.
    ///
    /// Returns true when a new attempt was started.
    pub fn ensure_chain(&self, chain_id: u64, provider: Arc<dyn ChainProvider>) -> bool {
        let current = self.status();
        let keep = match &current {
            BootstrapStatus::Ready(session) => session.chain_id() == chain_id,
            BootstrapStatus::Loading => self.inner.attempt().target_chain == Some(chain_id),
            BootstrapStatus::Idle | BootstrapStatus::Error(_) => false,
        };
        if keep {
            return false;
        }
        if current.session().is_some() {
            info!("Chain changed to {chain_id}, discarding FHEVM session");
        }
        self.start_attempt(provider, Some(chain_id));
        true
    }

    /// Wait for the current attempt to finish.
    pub async fn wait_ready(&self) -> Result<Arc<dyn FheSession>, BootstrapError> {
        let mut rx = self.subscribe();
        let status = rx
            .wait_for(|s| s.is_terminal())
            .await
            .map_err(|_| BootstrapError::Cancelled)?
            .clone();
        match status {
            BootstrapStatus::Ready(session) => Ok(session),
            BootstrapStatus::Error(e) => Err(e),
            BootstrapStatus::Idle | BootstrapStatus::Loading => Err(BootstrapError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(BootstrapStatus::Idle.label(), "FHEVM Not Initialized");
        assert_eq!(BootstrapStatus::Loading.label(), "Initializing FHEVM");
        assert_eq!(
            BootstrapStatus::Error(BootstrapError::Cancelled).label(),
            "FHEVM Error"
        );
        assert!(!BootstrapStatus::Loading.is_terminal());
        assert!(BootstrapStatus::Error(BootstrapError::Cancelled).is_terminal());
        assert_eq!(
            BootstrapStatus::Error(BootstrapError::Cancelled).error(),
            Some(&BootstrapError::Cancelled)
        );
    }
}
