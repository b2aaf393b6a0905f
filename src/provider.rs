//! HSM key provider
//!
//! Owns the module session and its lifecycle, hands out key handles and
//! performs delegated signing with a bounded wait. Shared by every credential
//! and connection; cloning is cheap.
//!
//! Module calls run on one long-lived worker thread per provider, fed through
//! a bounded queue. A module that stops answering therefore holds at most one
//! thread; once the queue is full further signatures fail immediately.

use std::fmt;
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use rustls::SignatureScheme;
use tracing::{debug, info, warn};

use crate::error::{MtlsError, MtlsResult, ProviderError, SigningError};
use crate::model::{KeyAlias, KeyHandle, Pin};
use crate::ports::HsmModule;

/// Default upper bound for a single signing operation
pub const DEFAULT_SIGN_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default number of signatures that may wait for the worker
pub const DEFAULT_SIGN_QUEUE_DEPTH: usize = 8;

/// Lifecycle of the module session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Uninitialized,
    Ready,
    /// Terminal; a closed provider cannot be initialised again
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    /// How long a handshake waits for the module to sign
    pub sign_timeout: Duration,
    /// Requests allowed to queue behind the one the module is working on
    pub sign_queue_depth: usize,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            sign_timeout: DEFAULT_SIGN_TIMEOUT,
            sign_queue_depth: DEFAULT_SIGN_QUEUE_DEPTH,
        }
    }
}

struct SignJob {
    alias: KeyAlias,
    scheme: SignatureScheme,
    message: Vec<u8>,
    /// The caller has given up after this instant
    deadline: Instant,
    reply: SyncSender<MtlsResult<Vec<u8>>>,
}

struct Inner {
    module: Arc<dyn HsmModule>,
    settings: ProviderSettings,
    state: RwLock<ProviderState>,
    worker: Mutex<Option<SyncSender<SignJob>>>,
}

/// Front door to the security module
///
/// `initialize` must succeed before keys can be resolved. Keys never leave
/// the module: the provider only returns handles and signatures.
#[derive(Clone)]
pub struct HsmKeyProvider {
    inner: Arc<Inner>,
}

impl HsmKeyProvider {
    pub fn new(module: Arc<dyn HsmModule>) -> Self {
        Self::with_settings(module, ProviderSettings::default())
    }

    pub fn with_settings(module: Arc<dyn HsmModule>, settings: ProviderSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                module,
                settings,
                state: RwLock::new(ProviderState::Uninitialized),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.inner.settings
    }

    pub fn state(&self) -> ProviderState {
        self.inner
            .state
            .read()
            .map(|state| *state)
            .unwrap_or(ProviderState::Closed)
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ProviderState::Ready
    }

    /// Register the module and log in
    ///
    /// Calling it again once ready is a no-op. Fails with `NotReady` after
    /// `shutdown`.
    pub fn initialize(&self, pin: Option<&Pin>) -> MtlsResult<()> {
        let mut state = self
            .inner
            .state
            .write()
            .map_err(|_| ProviderError::NotReady)?;

        match *state {
            ProviderState::Ready => {
                debug!("HSM provider already initialised");
                Ok(())
            }
            ProviderState::Closed => Err(ProviderError::NotReady.into()),
            ProviderState::Uninitialized => {
                self.inner.module.register()?;
                self.inner.module.authenticate(pin)?;
                *state = ProviderState::Ready;
                info!("HSM provider ready");
                Ok(())
            }
        }
    }

    /// Look up a key by alias
    pub fn resolve_key(&self, alias: &KeyAlias) -> MtlsResult<Arc<KeyHandle>> {
        self.ensure_ready()?;

        let descriptor = self.inner.module.find_key(alias)?;
        info!("Resolved {} key '{}'", descriptor.algorithm, alias);
        Ok(Arc::new(KeyHandle::new(alias.clone(), descriptor)))
    }

    /// Sign `message` with the key behind `handle`
    ///
    /// The request is handed to the signing worker; if the module has not
    /// answered within the configured timeout the operation fails with
    /// [`SigningError::Timeout`] and the late result is discarded. Requests
    /// still queued when their caller has given up are skipped. Fails with
    /// [`SigningError::Failed`] straight away when the queue is full. Never
    /// retried.
    pub fn sign(
        &self,
        handle: &KeyHandle,
        scheme: SignatureScheme,
        message: &[u8],
    ) -> Result<Vec<u8>, SigningError> {
        let alias = handle.alias().clone();
        if !self.is_ready() {
            return Err(SigningError::Failed {
                alias: alias.to_string(),
                reason: ProviderError::NotReady.to_string(),
            });
        }

        let timeout = self.inner.settings.sign_timeout;
        let started = Instant::now();
        let (reply, rx) = mpsc::sync_channel(1);
        self.submit(SignJob {
            alias: alias.clone(),
            scheme,
            message: message.to_vec(),
            deadline: started + timeout,
            reply,
        })?;

        match rx.recv_timeout(timeout) {
            Ok(Ok(signature)) => {
                debug!(
                    "Key '{}' signed with {:?} in {:?}",
                    alias,
                    scheme,
                    started.elapsed()
                );
                Ok(signature)
            }
            Ok(Err(MtlsError::Signing(err))) => {
                warn!("Signing with '{}' failed: {}", alias, err);
                Err(err)
            }
            Ok(Err(other)) => {
                warn!("Signing with '{}' failed: {}", alias, other);
                Err(SigningError::Failed {
                    alias: alias.to_string(),
                    reason: other.to_string(),
                })
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Signing with '{}' timed out after {:?}", alias, timeout);
                Err(SigningError::Timeout {
                    alias: alias.to_string(),
                    timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(SigningError::Failed {
                alias: alias.to_string(),
                reason: "signing worker exited without a result".to_string(),
            }),
        }
    }

    /// Queue a job for the worker, starting it on first use
    fn submit(&self, job: SignJob) -> Result<(), SigningError> {
        let alias = job.alias.to_string();
        let failed = |reason: String| SigningError::Failed {
            alias: alias.clone(),
            reason,
        };

        let mut worker = self
            .inner
            .worker
            .lock()
            .map_err(|_| failed("signing worker lock poisoned".to_string()))?;

        let sender = match &mut *worker {
            Some(sender) => sender,
            idle => idle.insert(
                spawn_worker(
                    Arc::clone(&self.inner.module),
                    self.inner.settings.sign_queue_depth,
                )
                .map_err(|e| failed(format!("cannot start signing worker: {}", e)))?,
            ),
        };

        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("Signing queue full, rejecting request for '{}'", alias);
                Err(failed("signing queue is full".to_string()))
            }
            Err(TrySendError::Disconnected(_)) => {
                // Started again on the next request
                *worker = None;
                Err(failed("signing worker stopped".to_string()))
            }
        }
    }

    /// Close the module session
    ///
    /// Every handle obtained from this provider becomes unusable. Later calls
    /// are no-ops.
    pub fn shutdown(&self) -> MtlsResult<()> {
        let mut state = self
            .inner
            .state
            .write()
            .map_err(|_| ProviderError::NotReady)?;

        let previous = std::mem::replace(&mut *state, ProviderState::Closed);
        // Dropping the sender lets the worker exit once its queue is drained
        if let Ok(mut worker) = self.inner.worker.lock() {
            worker.take();
        }
        if previous == ProviderState::Ready {
            self.inner.module.close()?;
            info!("HSM provider shut down");
        }
        Ok(())
    }

    fn ensure_ready(&self) -> MtlsResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(ProviderError::NotReady.into())
        }
    }
}

fn spawn_worker(module: Arc<dyn HsmModule>, depth: usize) -> io::Result<SyncSender<SignJob>> {
    let (tx, rx) = mpsc::sync_channel::<SignJob>(depth.max(1));

    thread::Builder::new()
        .name("hsm-signer".to_string())
        .spawn(move || {
            for job in rx {
                if Instant::now() >= job.deadline {
                    debug!("Skipping expired signing request for '{}'", job.alias);
                    continue;
                }
                let result = module.sign(&job.alias, job.scheme, &job.message);
                // The receiver is gone when the caller already timed out
                let _ = job.reply.send(result);
            }
            debug!("HSM signing worker stopped");
        })?;

    Ok(tx)
}

impl fmt::Debug for HsmKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HsmKeyProvider")
            .field("state", &self.state())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}
