use std::{
    ffi::OsString,
    fs::File,
    io::{ErrorKind, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use fs2::FileExt;
use tokio::{fs::OpenOptions, time};
use tracing::warn;

use crate::error::Error;

const RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Exclusive advisory lock on the `.lock` sidecar of the store file, held
/// across processes for a whole read-modify-write cycle.
///
/// The lock belongs to the open file handle, so the OS releases it when the
/// holder exits or crashes. The sidecar file itself is never removed.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
}

pub fn lock_path(store_path: &Path) -> PathBuf {
    let mut name = OsString::from(store_path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

impl StoreLock {
    pub async fn acquire(
        store_path: &Path,
        timeout: Duration,
    ) -> Result<StoreLock, Error> {
        let path = lock_path(store_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?
            .into_std()
            .await;

        let started = Instant::now();

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    let mut lock = StoreLock { file };
                    lock.write_owner();
                    return Ok(lock);
                },
                Err(e) if is_contended(&e) => {
                    if started.elapsed() >= timeout {
                        return Err(Error::StoreLocked(format!(
                            "{} held for more than {:?}",
                            path.display(),
                            timeout
                        )));
                    }

                    time::sleep(RETRY_INTERVAL).await;
                },
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Records the holder's pid for whoever inspects a stuck lock.
    fn write_owner(&mut self) {
        let pid = format!("{}\n", std::process::id());
        let written = self
            .file
            .set_len(0)
            .and_then(|_| self.file.seek(SeekFrom::Start(0)))
            .and_then(|_| self.file.write_all(pid.as_bytes()));

        if let Err(e) = written {
            warn!("Failed to record store lock owner: {}", e);
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release store lock: {}", e);
        }
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::SystemTime,
    };

    #[tokio::test]
    async fn test_lock_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("subs.json");

        let first = StoreLock::acquire(&store, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(lock_path(&store).exists());

        let second =
            StoreLock::acquire(&store, Duration::from_millis(100)).await;
        assert!(matches!(second, Err(Error::StoreLocked(_))));

        drop(first);

        let third = StoreLock::acquire(&store, Duration::from_millis(100)).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("subs.json");

        let first = StoreLock::acquire(&store, Duration::from_secs(1))
            .await
            .unwrap();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                StoreLock::acquire(&store, Duration::from_secs(5)).await
            })
        };

        time::sleep(Duration::from_millis(100)).await;
        drop(first);

        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_leftover_lock_file_admits_one_holder_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("subs.json");

        // Left behind by a writer that died two minutes ago.
        let leftover = File::create(lock_path(&store)).unwrap();
        leftover
            .set_modified(SystemTime::now() - Duration::from_secs(120))
            .unwrap();
        drop(leftover);

        let holders = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let holders = holders.clone();
                let overlaps = overlaps.clone();
                tokio::spawn(async move {
                    for _ in 0..10 {
                        let lock = StoreLock::acquire(&store, Duration::from_secs(10))
                            .await
                            .unwrap();
                        if holders.fetch_add(1, Ordering::SeqCst) > 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        time::sleep(Duration::from_millis(5)).await;
                        holders.fetch_sub(1, Ordering::SeqCst);
                        drop(lock);
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lock_path_appends_suffix() {
        assert_eq!(
            lock_path(Path::new("/data/push_subscriptions.json")),
            PathBuf::from("/data/push_subscriptions.json.lock")
        );
    }
}
