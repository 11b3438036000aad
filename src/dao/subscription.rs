use std::{
    collections::HashSet,
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::{fs, io::AsyncWriteExt, sync::Mutex};
use tracing::{info, warn};

use crate::{
    error::Error,
    model::{insert_unique, remove_endpoints, Subscription, Subscriptions},
};

use super::StoreLock;

/// Subscriptions persisted as one JSON document.
///
/// The file is the only source of truth: every read goes to disk and every
/// write is a read-modify-write under the in-process mutex plus the
/// [`StoreLock`] file, finished by an atomic rename.
#[derive(Debug)]
pub struct SubscriptionStore {
    path: PathBuf,
    writer: Mutex<()>,
    lock_timeout: Duration,
}

impl SubscriptionStore {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        SubscriptionStore {
            path: path.into(),
            writer: Mutex::new(()),
            lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current mapping for readers. A missing file is an empty store; an
    /// unparsable one is logged, copied aside and treated as empty. Other read
    /// errors are logged and read as empty without touching the file.
    pub async fn load(&self) -> Subscriptions {
        match read_snapshot(&self.path).await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                warn!("{}, continuing with an empty store", e);
                if matches!(e, Error::StoreCorrupt(_)) {
                    self.keep_corrupt_copy().await;
                }
                Subscriptions::new()
            },
        }
    }

    /// Replaces the persisted mapping.
    pub async fn save(&self, subscriptions: &Subscriptions) -> Result<(), Error> {
        let _writer = self.writer.lock().await;
        let _lock = StoreLock::acquire(&self.path, self.lock_timeout).await?;
        write_atomic(&self.path, subscriptions).await
    }

    /// Applies `mutate` to a fresh copy of the persisted mapping and saves it
    /// if anything changed. This is the only write path used by the service.
    ///
    /// Only a missing or unparsable file starts from an empty mapping; a file
    /// that cannot be read fails the call and is left as it is.
    pub async fn mutate_atomically<F, R>(&self, mutate: F) -> Result<R, Error>
    where
        F: FnOnce(&mut Subscriptions) -> R,
    {
        let _writer = self.writer.lock().await;
        let _lock = StoreLock::acquire(&self.path, self.lock_timeout).await?;

        let before = match read_snapshot(&self.path).await {
            Ok(subscriptions) => subscriptions,
            Err(Error::StoreCorrupt(reason)) => {
                warn!("{}, rewriting from an empty store", reason);
                self.keep_corrupt_copy().await;
                Subscriptions::new()
            },
            Err(e) => return Err(e),
        };
        let mut subscriptions = before.clone();
        let result = mutate(&mut subscriptions);

        if subscriptions != before {
            write_atomic(&self.path, &subscriptions).await?;
        }

        Ok(result)
    }

    /// Returns `true` when the subscription was added, `false` when the
    /// endpoint was already registered for `user`.
    pub async fn subscribe(
        &self,
        user: &str,
        subscription: Subscription,
    ) -> Result<bool, Error> {
        let added = self
            .mutate_atomically(|subscriptions| {
                insert_unique(subscriptions, user, subscription)
            })
            .await?;

        if added {
            info!("Subscription added for {}", user);
        }

        Ok(added)
    }

    /// Returns `true` when a subscription was removed.
    pub async fn unsubscribe(
        &self,
        user: &str,
        endpoint: &str,
    ) -> Result<bool, Error> {
        let endpoints = HashSet::from([endpoint.to_owned()]);
        let removed = self
            .mutate_atomically(|subscriptions| {
                remove_endpoints(subscriptions, user, &endpoints)
            })
            .await?;

        if removed > 0 {
            info!("Subscription removed for {}", user);
        }

        Ok(removed > 0)
    }

    /// Removes all `endpoints` of `user` in a single write.
    pub async fn prune_many(
        &self,
        user: &str,
        endpoints: &HashSet<String>,
    ) -> Result<usize, Error> {
        if endpoints.is_empty() {
            return Ok(0);
        }

        self.mutate_atomically(|subscriptions| {
            remove_endpoints(subscriptions, user, endpoints)
        })
        .await
    }

    pub async fn get(&self, user: &str) -> Vec<Subscription> {
        self.load().await.remove(user).unwrap_or_default()
    }

    pub async fn users(&self) -> Vec<String> {
        self.load().await.into_keys().collect()
    }

    pub async fn contains(&self, user: &str, endpoint: &str) -> bool {
        self.get(user)
            .await
            .iter()
            .any(|item| item.endpoint == endpoint)
    }

    async fn keep_corrupt_copy(&self) {
        let backup = with_suffix(&self.path, ".corrupt");
        match fs::copy(&self.path, &backup).await {
            Ok(_) => warn!("Corrupt store copied to {}", backup.display()),
            Err(e) => warn!("Failed to copy corrupt store: {}", e),
        }
    }
}

async fn read_snapshot(path: &Path) -> Result<Subscriptions, Error> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(Subscriptions::new())
        },
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&bytes).map_err(|e| {
        Error::StoreCorrupt(format!("cannot parse {}: {}", path.display(), e))
    })
}

/// Writes next to the target and renames over it, so readers see either the
/// old or the new document, never a partial one.
async fn write_atomic(
    path: &Path,
    subscriptions: &Subscriptions,
) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_vec_pretty(subscriptions)?;
    let tmp_path = with_suffix(path, &format!(".tmp-{}", std::process::id()));

    let mut file = fs::File::create(&tmp_path).await?;
    file.write_all(&json).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }

    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
