//! Known-name dictionaries
//!
//! Archives that store only name hashes can still be listed with real names
//! when a list of candidate names is available. A [`NameDictionary`] maps each
//! candidate's hash back to the name; the first name wins on collision.
//!
//! Dictionaries are built once per archive family and shared read-only through
//! a [`KnownNames`] cell.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use tracing::{debug, warn};

use crate::error::CryptoResult;
use crate::hash::KeyedHash;

/// Hash-to-name lookup table
#[derive(Debug, Clone, Default)]
pub struct NameDictionary {
    names: HashMap<u32, String>,
    collisions: usize,
}

impl NameDictionary {
    /// Hash every name with `hasher` and `seed`
    pub fn build<H, I, S>(hasher: &H, seed: u32, names: I) -> Self
    where
        H: KeyedHash + ?Sized,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut dictionary = Self::default();
        for name in names {
            dictionary.insert(hasher, seed, name.into());
        }
        debug!(
            names = dictionary.len(),
            collisions = dictionary.collisions,
            "built name dictionary"
        );
        dictionary
    }

    /// Read newline separated names; blank lines and `#` comments are skipped
    pub fn from_reader<H, R>(hasher: &H, seed: u32, reader: R) -> CryptoResult<Self>
    where
        H: KeyedHash + ?Sized,
        R: BufRead,
    {
        let mut names = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let name = line.trim();
            if name.is_empty() || name.starts_with('#') {
                continue;
            }
            names.push(name.to_string());
        }
        Ok(Self::build(hasher, seed, names))
    }

    /// Load a name list from disk
    pub fn load<H, P>(hasher: &H, seed: u32, path: P) -> CryptoResult<Self>
    where
        H: KeyedHash + ?Sized,
        P: AsRef<Path>,
    {
        let file = File::open(path.as_ref())?;
        Self::from_reader(hasher, seed, BufReader::new(file))
    }

    fn insert<H: KeyedHash + ?Sized>(&mut self, hasher: &H, seed: u32, name: String) {
        let hash = hasher.hash_name(seed, &name);
        match self.names.entry(hash) {
            Entry::Vacant(slot) => {
                slot.insert(name);
            }
            Entry::Occupied(existing) => {
                if *existing.get() != name {
                    warn!(
                        hash,
                        kept = %existing.get(),
                        dropped = %name,
                        "name hash collision"
                    );
                    self.collisions += 1;
                }
            }
        }
    }

    /// Look up the name for a stored hash
    pub fn resolve(&self, hash: u32) -> Option<&str> {
        self.names.get(&hash).map(String::as_str)
    }

    /// Number of distinct hashes
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no names were loaded
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Number of names dropped because their hash was already taken
    pub const fn collisions(&self) -> usize {
        self.collisions
    }
}

/// Lazily initialized, process-wide dictionary for one archive family
#[derive(Debug, Default)]
pub struct KnownNames {
    cell: OnceLock<NameDictionary>,
}

impl KnownNames {
    /// Create an empty cell, usable in a `static`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// The dictionary, if it was initialized
    pub fn get(&self) -> Option<&NameDictionary> {
        self.cell.get()
    }

    /// Initialize with `init` on first use
    pub fn get_or_init(&self, init: impl FnOnce() -> NameDictionary) -> &NameDictionary {
        self.cell.get_or_init(init)
    }

    /// Initialize with a fallible loader on first use
    ///
    /// A failed load leaves the cell empty so a later call can retry. If two
    /// threads race, the first stored dictionary wins.
    pub fn get_or_load(
        &self,
        load: impl FnOnce() -> CryptoResult<NameDictionary>,
    ) -> CryptoResult<&NameDictionary> {
        if let Some(dictionary) = self.cell.get() {
            return Ok(dictionary);
        }
        let dictionary = load()?;
        Ok(self.cell.get_or_init(|| dictionary))
    }
}

/// Shared NekoPack name list
pub static NEKOPACK_NAMES: KnownNames = KnownNames::new();

/// Shared WARC name list
pub static WARC_NAMES: KnownNames = KnownNames::new();
