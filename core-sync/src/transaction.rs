//! Scoped repository transaction.
//!
//! [`ScopedTransaction::begin`] opens the repository and starts a
//! transaction; [`commit`](ScopedTransaction::commit) or
//! [`rollback`](ScopedTransaction::rollback) end it and close the repository
//! again. A guard dropped while still active rolls back on the current tokio
//! runtime.
//!
//! Both repositories allow one open transaction at a time.
//! [`ScopedTransaction::begin_exclusive`] waits on a shared writer lock
//! first and holds it until the transaction has ended.

use core_library::MediaRepository;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, warn};

use crate::error::{Result, SyncError};

pub struct ScopedTransaction {
    repository: Arc<dyn MediaRepository>,
    active: bool,
    writer: Option<OwnedMutexGuard<()>>,
}

impl ScopedTransaction {
    /// Opens the repository and begins a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RepositoryUnavailable`] when the repository cannot
    /// be opened or refuses to start a transaction.
    pub async fn begin(repository: Arc<dyn MediaRepository>) -> Result<Self> {
        Self::start(repository, None).await
    }

    /// Waits for `writer`, then begins a transaction that keeps the lock
    /// until commit, rollback or drop.
    pub async fn begin_exclusive(
        repository: Arc<dyn MediaRepository>,
        writer: Arc<Mutex<()>>,
    ) -> Result<Self> {
        let guard = writer.lock_owned().await;
        Self::start(repository, Some(guard)).await
    }

    async fn start(
        repository: Arc<dyn MediaRepository>,
        writer: Option<OwnedMutexGuard<()>>,
    ) -> Result<Self> {
        repository
            .open()
            .await
            .map_err(|e| SyncError::RepositoryUnavailable(format!("open failed: {}", e)))?;

        if let Err(e) = repository.begin_transaction().await {
            if let Err(close_err) = repository.close().await {
                warn!(error = %close_err, "Failed to close repository after begin failure");
            }
            return Err(SyncError::RepositoryUnavailable(format!(
                "begin transaction failed: {}",
                e
            )));
        }

        debug!("Transaction started");
        Ok(Self {
            repository,
            active: true,
            writer,
        })
    }

    pub fn repository(&self) -> &Arc<dyn MediaRepository> {
        &self.repository
    }

    /// Commits the transaction.
    ///
    /// A failed commit is rolled back before the error is returned.
    pub async fn commit(mut self) -> Result<()> {
        self.active = false;
        let result = self.repository.commit().await;

        if let Err(e) = &result {
            error!(error = %e, "Commit failed, rolling back");
            if let Err(rollback_err) = self.repository.rollback().await {
                warn!(error = %rollback_err, "Rollback after failed commit failed");
            }
        }
        self.close().await;

        result.map_err(|e| SyncError::Transaction(format!("commit failed: {}", e)))?;
        debug!("Transaction committed");
        Ok(())
    }

    /// Rolls the transaction back.
    pub async fn rollback(mut self) -> Result<()> {
        self.active = false;
        let result = self.repository.rollback().await;
        self.close().await;

        result.map_err(|e| SyncError::Transaction(format!("rollback failed: {}", e)))?;
        debug!("Transaction rolled back");
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.repository.close().await {
            warn!(error = %e, "Failed to close repository");
        }
    }
}

impl Drop for ScopedTransaction {
    fn drop(&mut self) {
        if !self.active {
            return;
        }

        warn!("Transaction dropped while active, rolling back");
        let repository = Arc::clone(&self.repository);
        // released only once the rollback has run
        let writer = self.writer.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = repository.rollback().await {
                        error!(error = %e, "Deferred rollback failed");
                    }
                    if let Err(e) = repository.close().await {
                        warn!(error = %e, "Failed to close repository");
                    }
                    drop(writer);
                });
            }
            Err(_) => error!("No runtime available to roll back dropped transaction"),
        }
    }
}
