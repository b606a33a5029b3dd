//! Front-matter change detection
//!
//! The host reports metadata changes for every edit of a file, including
//! edits that leave the front-matter untouched. Hashing the raw front-matter
//! block filters those out.

use crate::host::Host;
use parking_lot::Mutex;
use std::collections::HashMap;

/// 31-based rolling hash over the first UTF-16 code unit of each character,
/// wrapping in signed 32 bits
pub fn rolling_hash(text: &str) -> i32 {
    text.chars().fold(0i32, |hash, c| {
        let mut units = [0u16; 2];
        let unit = c.encode_utf16(&mut units)[0];
        hash.wrapping_mul(31).wrapping_add(i32::from(unit))
    })
}

/// Last seen front-matter hash per file path
///
/// Entries are created lazily and never removed; a path without an entry
/// hashes as 0.
#[derive(Debug, Default)]
pub struct FrontmatterHashes {
    hashes: Mutex<HashMap<String, i32>>,
}

impl FrontmatterHashes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current front-matter hash of every file the host indexes
    pub fn prime(&self, host: &dyn Host) -> usize {
        let mut primed = 0;
        for path in host.files() {
            let Some(cache) = host.metadata(&path) else {
                continue;
            };
            if cache.frontmatter.is_none() {
                continue;
            }
            let Ok(text) = host.read(&path) else {
                continue;
            };
            let hash = rolling_hash(cache.frontmatter_text(&text));
            if hash != 0 {
                self.hashes.lock().insert(path, hash);
                primed += 1;
            }
        }
        tracing::debug!(files = primed, "Front-matter hashes primed");
        primed
    }

    /// Compare `block` against the stored hash for `path`
    ///
    /// Returns `true` (and stores the new hash) when it differs.
    pub fn observe(&self, path: &str, block: &str) -> bool {
        let hash = rolling_hash(block);
        let mut hashes = self.hashes.lock();
        let previous = hashes.get(path).copied().unwrap_or(0);
        if previous == hash {
            return false;
        }
        hashes.insert(path.to_string(), hash);
        true
    }

    pub fn get(&self, path: &str) -> Option<i32> {
        self.hashes.lock().get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.hashes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.lock().is_empty()
    }
}
