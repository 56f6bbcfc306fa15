//! DetectorRegistry - per-key bar stores backed by a `HoleStore`
//!
//! Detectors are loaded lazily on first use and cached. The key map has its
//! own lock, held only for lookup and insertion. Everything else runs under
//! the lock of the single detector being touched, so unrelated conversations
//! never contend.

use crate::bar::Bar;
use crate::detector::Detector;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tessera_model::DetectorKey;

/// Error type for hole persistence.
///
/// Decoupled from the storage backend. Implementors map their errors into
/// `Internal`.
#[derive(Debug, thiserror::Error)]
pub enum HoleStoreError {
    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

/// Persistence seam for serialized bar lists, one blob per detector key.
pub trait HoleStore: Send + Sync {
    /// Returns the stored blob, or an empty vec when nothing was saved yet.
    fn load_holes(&self, key: &DetectorKey) -> Result<Vec<u8>, HoleStoreError>;
    fn save_holes(&self, key: &DetectorKey, bars: &[u8]) -> Result<(), HoleStoreError>;
}

pub struct DetectorRegistry {
    store: Arc<dyn HoleStore>,
    detectors: Mutex<HashMap<DetectorKey, Arc<Mutex<Detector>>>>,
}

impl DetectorRegistry {
    pub fn new(store: Arc<dyn HoleStore>) -> Self {
        Self {
            store,
            detectors: Mutex::new(HashMap::new()),
        }
    }

    // ==================== Mutation ====================

    /// Mark `[min, max]` as cached. No-op when `min > max`.
    pub fn insert_fill(&self, key: &DetectorKey, min: i64, max: i64) -> Result<(), HoleStoreError> {
        if min > max {
            return Ok(());
        }
        self.update(key, |d| d.insert_bar(Bar::filled(min, max)))
    }

    pub fn set_upper_filled(&self, key: &DetectorKey, pt: i64) -> Result<bool, HoleStoreError> {
        self.update(key, |d| d.set_upper_filled(pt))
    }

    pub fn set_lower_filled(&self, key: &DetectorKey) -> Result<(), HoleStoreError> {
        self.update(key, |d| d.set_lower_filled())
    }

    // ==================== Queries ====================

    pub fn is_range_filled(&self, key: &DetectorKey, min: i64, max: i64) -> Result<bool, HoleStoreError> {
        self.read(key, |d| d.is_range_filled(min, max))
    }

    pub fn is_point_hole(&self, key: &DetectorKey, pt: i64) -> Result<bool, HoleStoreError> {
        self.read(key, |d| d.is_point_hole(pt))
    }

    pub fn upper_filled(&self, key: &DetectorKey, pt: i64) -> Result<Option<Bar>, HoleStoreError> {
        self.read(key, |d| d.upper_filled(pt))
    }

    pub fn lower_filled(&self, key: &DetectorKey, pt: i64) -> Result<Option<Bar>, HoleStoreError> {
        self.read(key, |d| d.lower_filled(pt))
    }

    /// Diagnostic dump, e.g. `[H: 0 - 9][F: 10 - 13]`.
    pub fn print(&self, key: &DetectorKey) -> Result<String, HoleStoreError> {
        self.read(key, |d| d.to_string())
    }

    /// Copy of the current bars for `key`.
    pub fn snapshot(&self, key: &DetectorKey) -> Result<Detector, HoleStoreError> {
        self.read(key, Detector::clone)
    }

    /// Drop the cached detector. The next access reloads it from the store.
    pub fn release(&self, key: &DetectorKey) {
        if let Ok(mut detectors) = self.detectors.lock() {
            detectors.remove(key);
        }
    }

    // ==================== Internals ====================

    fn read<T>(&self, key: &DetectorKey, f: impl FnOnce(&Detector) -> T) -> Result<T, HoleStoreError> {
        let handle = self.load(key)?;
        let Ok(detector) = handle.lock() else {
            return Err(HoleStoreError::LockPoisoned);
        };
        Ok(f(&detector))
    }

    /// Run `f` on the detector and persist it before releasing its lock, so
    /// writes for one key reach the store in the order they were applied.
    fn update<T>(&self, key: &DetectorKey, f: impl FnOnce(&mut Detector) -> T) -> Result<T, HoleStoreError> {
        let handle = self.load(key)?;
        let Ok(mut detector) = handle.lock() else {
            return Err(HoleStoreError::LockPoisoned);
        };
        let out = f(&mut detector);
        self.store.save_holes(key, &detector.to_json()?)?;
        Ok(out)
    }

    fn load(&self, key: &DetectorKey) -> Result<Arc<Mutex<Detector>>, HoleStoreError> {
        {
            let Ok(detectors) = self.detectors.lock() else {
                return Err(HoleStoreError::LockPoisoned);
            };
            if let Some(handle) = detectors.get(key) {
                return Ok(handle.clone());
            }
        }

        // Read outside the map lock; a concurrent loader of the same key may
        // win the insert below, in which case its copy is kept.
        let detector = self.read_from_store(key)?;

        let Ok(mut detectors) = self.detectors.lock() else {
            return Err(HoleStoreError::LockPoisoned);
        };
        let handle = detectors
            .entry(*key)
            .or_insert_with(|| Arc::new(Mutex::new(detector)));
        Ok(handle.clone())
    }

    fn read_from_store(&self, key: &DetectorKey) -> Result<Detector, HoleStoreError> {
        let blob = self.store.load_holes(key)?;
        let detector = match Detector::from_json(&blob) {
            Ok(d) if d.is_valid() => return Ok(d),
            Ok(d) => {
                tracing::error!(key = %key, bars = %d, "Hole detector invalid, resetting");
                Detector::new()
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Hole detector unreadable, resetting");
                Detector::new()
            }
        };
        self.store.save_holes(key, &detector.to_json()?)?;
        Ok(detector)
    }
}
