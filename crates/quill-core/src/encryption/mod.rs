//! Encryption integration points.
//!
//! The synchronizer never looks inside ciphertext. It asks an
//! [`EncryptionService`] to seal items on the way out and stores pulled items
//! as they are; a [`DecryptionWorker`] opens them later, once the user has
//! unlocked the master key.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::{ItemRepository, SqliteItemRepository};
use crate::error::Result;
use crate::models::ItemId;
use crate::services::DatabaseService;
use crate::util::compact_text;

#[cfg(test)]
pub(crate) mod testing;

/// Opaque string encryption provided by the application.
pub trait EncryptionService: Send + Sync {
    /// Whether outgoing items must be encrypted.
    fn is_enabled(&self) -> bool;

    fn encrypt_string(&self, plain_text: &str) -> Result<String>;

    /// Fails when the needed master key is not loaded or the data is corrupt.
    fn decrypt_string(&self, cipher_text: &str) -> Result<String>;
}

/// Outcome of a decryption pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionReport {
    pub decrypted: usize,
    pub failed: usize,
}

/// Decrypts items that were pulled while still encrypted.
pub struct DecryptionWorker {
    db: DatabaseService,
    service: Arc<dyn EncryptionService>,
    batch_size: usize,
}

impl DecryptionWorker {
    pub fn new(db: DatabaseService, service: Arc<dyn EncryptionService>) -> Self {
        Self {
            db,
            service,
            batch_size: 50,
        }
    }

    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Decrypt every stored encrypted item the service can open.
    ///
    /// Decrypted items keep their `updated_time`, so they are not pushed
    /// again. Items that fail stay encrypted for a later run.
    pub async fn run(&self) -> Result<DecryptionReport> {
        let mut report = DecryptionReport::default();
        let mut failed: HashSet<ItemId> = HashSet::new();
        let batch_size = self.batch_size.max(1);

        loop {
            let batch = self
                .db
                .with_connection(|conn| {
                    SqliteItemRepository::new(conn).encrypted_items(batch_size + failed.len())
                })
                .await?;
            let pending: Vec<_> = batch
                .into_iter()
                .filter(|item| !failed.contains(&item.id()))
                .collect();
            if pending.is_empty() {
                break;
            }

            for item in pending {
                match item.decrypted(self.service.as_ref()) {
                    Ok(mut plain) => {
                        plain.set_updated_time(item.updated_time());
                        self.db.save_item(&plain).await?;
                        tracing::debug!("Decrypted {} {}", item.item_type(), item.id());
                        report.decrypted += 1;
                    }
                    Err(error) => {
                        tracing::warn!(
                            "Could not decrypt {} {}: {}",
                            item.item_type(),
                            item.id(),
                            compact_text(&error.to_string())
                        );
                        failed.insert(item.id());
                        report.failed += 1;
                    }
                }
            }
        }

        if report.decrypted > 0 || report.failed > 0 {
            tracing::info!(
                decrypted = report.decrypted,
                failed = report.failed,
                "Decryption pass finished"
            );
        }
        Ok(report)
    }
}
