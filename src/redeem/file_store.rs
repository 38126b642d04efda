//! JSON-file backed code store

use async_trait::async_trait;
use chrono::Utc;
use fs4::fs_std::FileExt;
use log::{debug, warn};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::store::{CodeRecord, CodeStore, Redemption, newest_first};
use crate::error::StoreError;

type Records = HashMap<String, CodeRecord>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Shared,
    Exclusive,
}

/// Code store persisted as a JSON array of records
///
/// The file on disk is the only copy. Every operation takes an advisory lock
/// on a `<path>.lock` sidecar and reads the file under it, so any number of
/// handles, in this process or others, agree on who redeemed a code first.
/// Mutations rewrite the file through a temporary sibling before the lock
/// is released; a failed write leaves the previous file in place.
#[derive(Debug)]
pub struct JsonFileCodeStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileCodeStore {
    /// Open the store at `path`; a missing file starts an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let store = Self {
            lock_path: sibling(&path, ".lock"),
            path,
        };

        let count = store.locked(Access::Shared, |records| Ok((records.len(), false))).await?;
        debug!("JsonFileCodeStore: {} holds {} records", store.path.display(), count);
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register existing ids as fresh records. Returns how many were new.
    pub async fn import<I, S>(&self, ids: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        self.locked(Access::Exclusive, move |records| {
            let mut added = 0;
            for id in ids {
                if !records.contains_key(&id) {
                    records.insert(id.clone(), CodeRecord::new(id));
                    added += 1;
                }
            }
            Ok((added, added > 0))
        })
        .await
    }

    /// Run `op` against the records read from disk while holding the lock.
    /// When `op` reports a change the records are written back before the
    /// lock is dropped.
    async fn locked<T, F>(&self, access: Access, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Records) -> Result<(T, bool), StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        tokio::task::spawn_blocking(move || {
            let lock = acquire(&lock_path, access)?;
            let mut records = load(&path)?;
            let (value, changed) = op(&mut records)?;
            if changed {
                persist(&path, &records)?;
            }
            // closing the descriptor releases the lock
            drop(lock);
            Ok(value)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn acquire(lock_path: &Path, access: Access) -> Result<File, StoreError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)?;
    match access {
        Access::Shared => FileExt::lock_shared(&file)?,
        Access::Exclusive => FileExt::lock_exclusive(&file)?,
    }
    Ok(file)
}

fn load(path: &Path) -> Result<Records, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(HashMap::new()),
        Ok(bytes) => {
            let list: Vec<CodeRecord> = serde_json::from_slice(&bytes)?;
            Ok(list.into_iter().map(|r| (r.id.clone(), r)).collect())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("JsonFileCodeStore: {} does not exist yet, starting empty", path.display());
            Ok(HashMap::new())
        }
        Err(e) => Err(e.into()),
    }
}

fn persist(path: &Path, records: &Records) -> Result<(), StoreError> {
    let list = newest_first(records.values().cloned().collect());
    let json = serde_json::to_vec_pretty(&list)?;

    let tmp = sibling(path, ".tmp");
    std::fs::write(&tmp, json)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        if let Err(cleanup) = std::fs::remove_file(&tmp) {
            debug!("JsonFileCodeStore: could not remove {}: {}", tmp.display(), cleanup);
        }
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl CodeStore for JsonFileCodeStore {
    async fn find_code(&self, id: &str) -> Result<Option<CodeRecord>, StoreError> {
        let id = id.to_string();
        self.locked(Access::Shared, move |records| Ok((records.remove(&id), false)))
            .await
    }

    async fn redeem_if_unredeemed(&self, id: &str) -> Result<Redemption, StoreError> {
        let key = id.to_string();
        let result = self
            .locked(Access::Exclusive, move |records| {
                let Some(record) = records.get_mut(&key) else {
                    return Ok((Redemption::NotFound, false));
                };
                let result = record.redeem_at(Utc::now());
                let changed = matches!(result, Redemption::Redeemed { .. });
                Ok((result, changed))
            })
            .await;

        if let Err(e) = &result {
            warn!("JsonFileCodeStore: failed to redeem {}: {}", id, e);
        }
        result
    }

    async fn list_codes(&self) -> Result<Vec<CodeRecord>, StoreError> {
        self.locked(Access::Shared, |records| {
            let list = newest_first(records.drain().map(|(_, r)| r).collect());
            Ok((list, false))
        })
        .await
    }
}
