use crate::domain::payout::{Payout, PayoutId, PayoutStatus};
use crate::domain::ports::{PayoutStore, WebhookLogStore};
use crate::domain::webhook::{WebhookLog, WebhookLogId};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for payouts, keyed by big-endian payout id.
pub const CF_PAYOUTS: &str = "payouts";
/// Column Family for webhook delivery logs, keyed by big-endian log id.
pub const CF_WEBHOOK_LOGS: &str = "webhook_logs";

/// A persistent store for payouts and webhook logs using RocksDB.
///
/// Writes that read before they write (id assignment and the payout version
/// check) are serialised through one async mutex so they stay atomic across
/// tasks sharing a clone.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path`, creating the column
    /// families if they are missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_payouts = ColumnFamilyDescriptor::new(CF_PAYOUTS, Options::default());
        let cf_logs = ColumnFamilyDescriptor::new(CF_WEBHOOK_LOGS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_payouts, cf_logs])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, id: u64) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf_name: &str, id: u64, value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(cf, id.to_be_bytes(), serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    /// The highest id in use, read from the last key.
    fn last_id(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf(cf_name)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _value) = item?;
                let bytes: [u8; 8] = key.as_ref().try_into().map_err(|_| {
                    PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                        "malformed key in {cf_name}"
                    ))))
                })?;
                Ok(u64::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }
}

#[async_trait]
impl PayoutStore for RocksDBStore {
    async fn insert(&self, mut payout: Payout) -> Result<Payout> {
        let _guard = self.write_lock.lock().await;
        if payout.id == 0 {
            payout.id = self.last_id(CF_PAYOUTS)? + 1;
        } else if self.read::<Payout>(CF_PAYOUTS, payout.id)?.is_some() {
            return Err(PaymentError::Conflict {
                entity: "payout",
                id: payout.id,
            });
        }
        self.write(CF_PAYOUTS, payout.id, &payout)?;
        Ok(payout)
    }

    async fn get(&self, id: PayoutId) -> Result<Option<Payout>> {
        self.read(CF_PAYOUTS, id)
    }

    async fn update(&self, mut payout: Payout) -> Result<Payout> {
        let _guard = self.write_lock.lock().await;
        let stored: Payout = self
            .read(CF_PAYOUTS, payout.id)?
            .ok_or(PaymentError::NotFound {
                entity: "payout",
                id: payout.id,
            })?;
        if stored.version != payout.version {
            return Err(PaymentError::Conflict {
                entity: "payout",
                id: payout.id,
            });
        }
        payout.version += 1;
        self.write(CF_PAYOUTS, payout.id, &payout)?;
        Ok(payout)
    }

    async fn by_status(&self, status: PayoutStatus) -> Result<Vec<Payout>> {
        Ok(self
            .scan::<Payout>(CF_PAYOUTS)?
            .into_iter()
            .filter(|p| p.status == status)
            .collect())
    }

    async fn all(&self) -> Result<Vec<Payout>> {
        self.scan(CF_PAYOUTS)
    }
}

#[async_trait]
impl WebhookLogStore for RocksDBStore {
    async fn create(&self, mut log: WebhookLog) -> Result<WebhookLog> {
        let _guard = self.write_lock.lock().await;
        log.id = self.last_id(CF_WEBHOOK_LOGS)? + 1;
        self.write(CF_WEBHOOK_LOGS, log.id, &log)?;
        Ok(log)
    }

    async fn get(&self, id: WebhookLogId) -> Result<Option<WebhookLog>> {
        self.read(CF_WEBHOOK_LOGS, id)
    }

    async fn update(&self, log: WebhookLog) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.read::<WebhookLog>(CF_WEBHOOK_LOGS, log.id)?.is_none() {
            return Err(PaymentError::NotFound {
                entity: "webhook log",
                id: log.id,
            });
        }
        self.write(CF_WEBHOOK_LOGS, log.id, &log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::DomainEventKind;
    use crate::domain::money::Amount;
    use crate::domain::webhook::{DeliveryStatus, HttpMethod};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        assert!(store.db.cf_handle(CF_PAYOUTS).is_some());
        assert!(store.db.cf_handle(CF_WEBHOOK_LOGS).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_payout_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let amount = Amount::new(dec!(25.50)).unwrap();

        let first = PayoutStore::insert(&store, Payout::new(0, 3, amount))
            .await
            .unwrap();
        let second = PayoutStore::insert(&store, Payout::new(0, 4, amount))
            .await
            .unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        let mut changed = first.clone();
        changed.notes = Some("checked".to_string());
        let saved = PayoutStore::update(&store, changed).await.unwrap();
        assert_eq!(saved.version, 1);
        assert!(PayoutStore::update(&store, first).await.is_err());

        let retrieved = PayoutStore::get(&store, 1).await.unwrap().unwrap();
        assert_eq!(retrieved, saved);
        assert_eq!(
            store.by_status(PayoutStatus::Pending).await.unwrap().len(),
            2
        );
        assert!(PayoutStore::get(&store, 9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rocksdb_webhook_log_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let log = WebhookLogStore::create(
            &store,
            WebhookLog {
                id: 0,
                webhook_id: 1,
                event: DomainEventKind::PayoutProcessed,
                endpoint: "https://hooks.example.com/1".to_string(),
                method: HttpMethod::Post,
                request_body: serde_json::json!({ "id": 1 }),
                request_headers: BTreeMap::new(),
                response_status: None,
                response_body: None,
                response_headers: BTreeMap::new(),
                status: DeliveryStatus::Pending,
                attempts: 0,
                created_at: Utc::now(),
                completed_at: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(log.id, 1);

        let mut done = log.clone();
        done.status = DeliveryStatus::Succeeded;
        done.response_status = Some(200);
        WebhookLogStore::update(&store, done.clone()).await.unwrap();

        let retrieved = WebhookLogStore::get(&store, 1).await.unwrap().unwrap();
        assert_eq!(retrieved, done);
    }
}
