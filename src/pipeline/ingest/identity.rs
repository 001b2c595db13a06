use uuid::Uuid;

use crate::db::RecordFilter;
use crate::store::LabRecordStore;

/// Outcome of identity resolution. "Not found" is a normal result, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Existing(Uuid),
    NotFound,
}

impl Resolution {
    pub fn existing(&self) -> Option<Uuid> {
        match self {
            Self::Existing(id) => Some(*id),
            Self::NotFound => None,
        }
    }
}

/// Find the stored record for a delivery.
///
/// Non-empty request ids are matched first (all supplied ids must match); the content
/// hash is the fallback. Store failures are logged and read as "not found".
pub fn resolve_identity(
    store: &dyn LabRecordStore,
    origin_id: &str,
    secondary_id: &str,
    content_hash: &str,
) -> Resolution {
    fn non_empty(s: &str) -> Option<&str> {
        (!s.is_empty()).then_some(s)
    }

    let by_ids = RecordFilter {
        origin_id: non_empty(origin_id),
        secondary_id: non_empty(secondary_id),
        hash: None,
    };
    if !by_ids.is_empty() {
        if let Some(id) = lookup(store, &by_ids) {
            return Resolution::Existing(id);
        }
    }

    let by_hash = RecordFilter {
        hash: non_empty(content_hash),
        ..Default::default()
    };
    if !by_hash.is_empty() {
        if let Some(id) = lookup(store, &by_hash) {
            return Resolution::Existing(id);
        }
    }

    Resolution::NotFound
}

fn lookup(store: &dyn LabRecordStore, filter: &RecordFilter<'_>) -> Option<Uuid> {
    match store.find_one(filter) {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(error = %e, "Identity lookup failed; treating as not found");
            None
        }
    }
}
