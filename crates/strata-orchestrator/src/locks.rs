//! Per-(stage, unit) apply locks
//!
//! Concurrent applies of the same unit for the same stage are refused
//! rather than queued; different units or stages proceed independently.

use crate::error::{ProvisionError, ProvisionResult};
use dashmap::DashMap;
use std::sync::Arc;
use strata_store::Stage;
use strata_units::UnitKind;

/// Held apply slots
#[derive(Debug, Default, Clone)]
pub struct ApplyLocks {
    held: Arc<DashMap<(Stage, UnitKind), ()>>,
}

impl ApplyLocks {
    /// No slots held
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the slot for `unit` in `stage`
    ///
    /// # Errors
    /// [`ProvisionError::ApplyInProgress`] if the slot is already held.
    pub fn acquire(&self, stage: &Stage, unit: UnitKind) -> ProvisionResult<ApplyGuard> {
        let key = (stage.clone(), unit);
        match self.held.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ProvisionError::ApplyInProgress {
                unit,
                stage: stage.clone(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Ok(ApplyGuard {
                    held: Arc::clone(&self.held),
                    key,
                })
            }
        }
    }

    /// Whether the slot is currently held
    #[must_use]
    pub fn is_held(&self, stage: &Stage, unit: UnitKind) -> bool {
        self.held.contains_key(&(stage.clone(), unit))
    }
}

/// Releases its slot on drop
#[derive(Debug)]
pub struct ApplyGuard {
    held: Arc<DashMap<(Stage, UnitKind), ()>>,
    key: (Stage, UnitKind),
}

impl Drop for ApplyGuard {
    fn drop(&mut self) {
        self.held.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let locks = ApplyLocks::new();
        let dev = Stage::new("dev").unwrap();

        let guard = locks.acquire(&dev, UnitKind::Cluster).unwrap();
        assert!(matches!(
            locks.acquire(&dev, UnitKind::Cluster),
            Err(ProvisionError::ApplyInProgress { .. })
        ));
        assert!(locks.acquire(&dev, UnitKind::Service).is_ok());
        assert!(locks
            .acquire(&Stage::new("prod").unwrap(), UnitKind::Cluster)
            .is_ok());

        drop(guard);
        assert!(!locks.is_held(&dev, UnitKind::Cluster));
        assert!(locks.acquire(&dev, UnitKind::Cluster).is_ok());
    }
}
