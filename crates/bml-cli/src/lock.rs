use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Advisory per-collection lock held for the duration of a mutating command.
pub struct CollectionLock {
    file: File,
    path: PathBuf,
}

impl CollectionLock {
    pub fn acquire(locks_dir: &Path, collection: &str) -> Result<Self> {
        fs::create_dir_all(locks_dir)
            .with_context(|| format!("Failed to create {}", locks_dir.display()))?;
        let path = locks_dir.join(format!("{}.lock", lock_file_stem(collection)));
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            bail!(
                "Collection '{collection}' is busy: another bml command holds {}",
                path.display()
            );
        }

        let metadata = format!(
            "collection={collection}\nowner_pid={}\nacquired_at={}\n",
            std::process::id(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        file.set_len(0)?;
        file.write_all(metadata.as_bytes())?;
        file.flush()?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CollectionLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn lock_file_stem(collection: &str) -> String {
    collection
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_holder_is_refused_until_release() {
        let dir = tempdir().expect("tempdir");
        let first = CollectionLock::acquire(dir.path(), "owner/repo").expect("first lock");
        assert!(first.path().ends_with("owner_repo.lock"));
        let contents = fs::read_to_string(first.path()).expect("read lock");
        assert!(contents.contains("collection=owner/repo"));

        let err = match CollectionLock::acquire(dir.path(), "owner/repo") {
            Ok(_) => panic!("lock should be busy"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("busy"));

        drop(first);
        CollectionLock::acquire(dir.path(), "owner/repo").expect("lock after release");
    }

    #[test]
    fn collections_lock_independently() {
        let dir = tempdir().expect("tempdir");
        let _a = CollectionLock::acquire(dir.path(), "a").expect("lock a");
        let _b = CollectionLock::acquire(dir.path(), "b").expect("lock b");
    }
}
