//! Shared calibration note
//!
//! A keyed document of instrument parameters mutated by many concurrent
//! task workers. Writes are partial merges scoped to a top-level key or
//! to one qubit's sub-document, never full overwrites, so workers on
//! disjoint parameters or qubits compose without coordination. First
//! writers race through an optimistic insert-or-merge loop with bounded
//! retries.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use qcal_core::{QcalError, QcalResult, Qid};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Note Key and Document
// ============================================================================

/// Identity of one calibration note document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteKey {
    /// Project the note belongs to
    pub project: String,
    /// Chip id
    pub chip: String,
    /// Execution id, or "master" for the cross-execution baseline
    pub execution: String,
    /// Task name that produced the note
    pub task: String,
}

/// Execution field value marking the cross-execution baseline note
pub const MASTER_EXECUTION: &str = "master";

impl NoteKey {
    /// Key for one execution's note
    pub fn new(
        project: impl Into<String>,
        chip: impl Into<String>,
        execution: impl Into<String>,
        task: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            chip: chip.into(),
            execution: execution.into(),
            task: task.into(),
        }
    }

    /// Key for the chip's master note
    pub fn master(project: impl Into<String>, chip: impl Into<String>, task: impl Into<String>) -> Self {
        Self::new(project, chip, MASTER_EXECUTION, task)
    }

    /// True when this note is a cross-execution baseline
    pub fn is_master(&self) -> bool {
        self.execution == MASTER_EXECUTION
    }
}

impl std::fmt::Display for NoteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.project, self.chip, self.execution, self.task
        )
    }
}

/// One calibration note document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationNote {
    /// Document identity
    pub key: NoteKey,
    /// Instrument parameters, partitioned by top-level parameter key
    pub fields: Map<String, Value>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last merge timestamp
    pub updated_at: DateTime<Utc>,
}

impl CalibrationNote {
    /// Create a note with the given initial fields
    pub fn new(key: NoteKey, fields: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            key,
            fields,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// Note Store Interface
// ============================================================================

/// Document store for calibration notes
///
/// Implementations must enforce key uniqueness on insert so racing
/// first-writers observe `DuplicateKey` and fall through to a merge.
pub trait NoteStore: Send + Sync {
    /// Insert a new note; `DuplicateKey` if the key already exists
    fn try_insert(&self, note: CalibrationNote) -> QcalResult<()>;

    /// Merge `fields` into an existing note, overwriting per top-level key
    ///
    /// Keys absent from `fields` are left untouched, so writers on
    /// disjoint parameters never clobber each other.
    fn merge_fields(&self, key: &NoteKey, fields: &Map<String, Value>) -> QcalResult<()>;

    /// Merge `fields` under one qubit's sub-document
    ///
    /// For each top-level key, writes `fields[k]` at `note.fields[k][qid]`,
    /// preserving sibling qubits' entries under the same key.
    fn merge_qid_fields(
        &self,
        key: &NoteKey,
        qid: &Qid,
        fields: &Map<String, Value>,
    ) -> QcalResult<()>;

    /// Look up a note by key
    fn find(&self, key: &NoteKey) -> QcalResult<Option<CalibrationNote>>;

    /// Most recently updated master note for (project, chip)
    fn find_latest_master(&self, project: &str, chip: &str) -> QcalResult<Option<CalibrationNote>>;
}

// ============================================================================
// Optimistic Upsert
// ============================================================================

/// Bounded exponential backoff for optimistic writes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum total attempts before giving up
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound on the per-retry delay, in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 10,
            max_backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Insert-or-merge with bounded retries
///
/// Tries an insert first; a `DuplicateKey` race (or a concurrent delete
/// between observing the duplicate and merging) falls through to the
/// next attempt after a backoff. Two concurrent first-writers converge
/// to a single document carrying both field sets.
pub fn upsert_with_retry(
    store: &dyn NoteStore,
    key: &NoteKey,
    fields: &Map<String, Value>,
    policy: &RetryPolicy,
) -> QcalResult<()> {
    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            std::thread::sleep(policy.backoff(attempt - 1));
        }

        match store.try_insert(CalibrationNote::new(key.clone(), fields.clone())) {
            Ok(()) => return Ok(()),
            Err(QcalError::DuplicateKey(_)) => {
                debug!("note '{}' exists, merging instead", key);
            }
            Err(e) => return Err(e),
        }

        match store.merge_fields(key, fields) {
            Ok(()) => return Ok(()),
            // Concurrent delete between the failed insert and the merge
            Err(QcalError::TaskNotFound { .. }) | Err(QcalError::DuplicateKey(_)) => {
                warn!("note '{}' write conflict on attempt {}", key, attempt + 1);
            }
            Err(e) => return Err(e),
        }
    }

    Err(QcalError::RetryExhausted {
        key: key.to_string(),
        attempts: policy.max_attempts,
    })
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// `Mutex<HashMap>`-backed note store
///
/// Gives the document-store contract (unique keys, per-key partial
/// merges) without a database. Suitable for single-process runs and
/// tests.
#[derive(Debug, Default)]
pub struct InMemoryNoteStore {
    notes: Mutex<HashMap<NoteKey, CalibrationNote>>,
}

impl InMemoryNoteStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> QcalResult<std::sync::MutexGuard<'_, HashMap<NoteKey, CalibrationNote>>> {
        self.notes
            .lock()
            .map_err(|_| QcalError::InternalError("note store mutex poisoned".to_string()))
    }
}

impl NoteStore for InMemoryNoteStore {
    fn try_insert(&self, note: CalibrationNote) -> QcalResult<()> {
        let mut notes = self.lock()?;
        if notes.contains_key(&note.key) {
            return Err(QcalError::DuplicateKey(note.key.to_string()));
        }
        notes.insert(note.key.clone(), note);
        Ok(())
    }

    fn merge_fields(&self, key: &NoteKey, fields: &Map<String, Value>) -> QcalResult<()> {
        let mut notes = self.lock()?;
        let note = notes.get_mut(key).ok_or_else(|| QcalError::TaskNotFound {
            name: key.task.clone(),
            qid: key.to_string(),
        })?;
        for (k, v) in fields {
            note.fields.insert(k.clone(), v.clone());
        }
        note.updated_at = Utc::now();
        Ok(())
    }

    fn merge_qid_fields(
        &self,
        key: &NoteKey,
        qid: &Qid,
        fields: &Map<String, Value>,
    ) -> QcalResult<()> {
        let mut notes = self.lock()?;
        let note = notes.get_mut(key).ok_or_else(|| QcalError::TaskNotFound {
            name: key.task.clone(),
            qid: qid.clone(),
        })?;
        for (k, v) in fields {
            let slot = note
                .fields
                .entry(k.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            match slot {
                Value::Object(sub) => {
                    sub.insert(qid.clone(), v.clone());
                }
                _ => {
                    return Err(QcalError::InvalidParameterValue(format!(
                        "note field '{}' is not a per-qubit sub-document",
                        k
                    )))
                }
            }
        }
        note.updated_at = Utc::now();
        Ok(())
    }

    fn find(&self, key: &NoteKey) -> QcalResult<Option<CalibrationNote>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn find_latest_master(&self, project: &str, chip: &str) -> QcalResult<Option<CalibrationNote>> {
        let notes = self.lock()?;
        Ok(notes
            .values()
            .filter(|n| n.key.is_master() && n.key.project == project && n.key.chip == chip)
            .max_by_key(|n| n.updated_at)
            .cloned())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn key() -> NoteKey {
        NoteKey::new("qcal", "square_64", "exec-1", "check_noise")
    }

    fn fields(entries: &[(&str, Value)]) -> Map<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_insert_then_duplicate() {
        let store = InMemoryNoteStore::new();
        store
            .try_insert(CalibrationNote::new(key(), Map::new()))
            .unwrap();

        let err = store
            .try_insert(CalibrationNote::new(key(), Map::new()))
            .unwrap_err();
        assert!(matches!(err, QcalError::DuplicateKey(_)));
    }

    #[test]
    fn test_merge_fields_is_additive_per_key() {
        let store = InMemoryNoteStore::new();
        store
            .try_insert(CalibrationNote::new(
                key(),
                fields(&[("lo_frequency", json!(9.5)), ("attenuation", json!(20))]),
            ))
            .unwrap();

        store
            .merge_fields(&key(), &fields(&[("lo_frequency", json!(9.7))]))
            .unwrap();

        let note = store.find(&key()).unwrap().unwrap();
        assert_eq!(note.fields["lo_frequency"], json!(9.7));
        // Untouched key survives the merge
        assert_eq!(note.fields["attenuation"], json!(20));
    }

    #[test]
    fn test_merge_qid_fields_preserves_siblings() {
        let store = InMemoryNoteStore::new();
        store
            .try_insert(CalibrationNote::new(key(), Map::new()))
            .unwrap();

        store
            .merge_qid_fields(&key(), &"0".to_string(), &fields(&[("readout_amp", json!(0.1))]))
            .unwrap();
        store
            .merge_qid_fields(&key(), &"1".to_string(), &fields(&[("readout_amp", json!(0.2))]))
            .unwrap();

        let note = store.find(&key()).unwrap().unwrap();
        assert_eq!(note.fields["readout_amp"]["0"], json!(0.1));
        assert_eq!(note.fields["readout_amp"]["1"], json!(0.2));
    }

    #[test]
    fn test_merge_qid_fields_rejects_scalar_slot() {
        let store = InMemoryNoteStore::new();
        store
            .try_insert(CalibrationNote::new(
                key(),
                fields(&[("readout_amp", json!(0.1))]),
            ))
            .unwrap();

        let err = store
            .merge_qid_fields(&key(), &"0".to_string(), &fields(&[("readout_amp", json!(0.2))]))
            .unwrap_err();
        assert!(matches!(err, QcalError::InvalidParameterValue(_)));
    }

    #[test]
    fn test_upsert_inserts_when_absent() {
        let store = InMemoryNoteStore::new();
        upsert_with_retry(
            &store,
            &key(),
            &fields(&[("lo_frequency", json!(9.5))]),
            &RetryPolicy::default(),
        )
        .unwrap();

        let note = store.find(&key()).unwrap().unwrap();
        assert_eq!(note.fields["lo_frequency"], json!(9.5));
    }

    #[test]
    fn test_concurrent_first_writers_converge() {
        let store = Arc::new(InMemoryNoteStore::new());

        std::thread::scope(|scope| {
            let a = Arc::clone(&store);
            let b = Arc::clone(&store);
            scope.spawn(move || {
                upsert_with_retry(
                    a.as_ref(),
                    &key(),
                    &fields(&[("lo_frequency", json!(9.5))]),
                    &RetryPolicy::default(),
                )
                .unwrap();
            });
            scope.spawn(move || {
                upsert_with_retry(
                    b.as_ref(),
                    &key(),
                    &fields(&[("attenuation", json!(20))]),
                    &RetryPolicy::default(),
                )
                .unwrap();
            });
        });

        // Exactly one document, both field sets present
        let note = store.find(&key()).unwrap().unwrap();
        assert_eq!(note.fields["lo_frequency"], json!(9.5));
        assert_eq!(note.fields["attenuation"], json!(20));
    }

    #[test]
    fn test_find_latest_master() {
        let store = InMemoryNoteStore::new();
        let older = NoteKey::master("qcal", "square_64", "check_noise");
        let newer = NoteKey::master("qcal", "square_64", "check_rabi");

        store
            .try_insert(CalibrationNote::new(older, Map::new()))
            .unwrap();
        std::thread::sleep(Duration::from_millis(2));
        store
            .try_insert(CalibrationNote::new(newer.clone(), Map::new()))
            .unwrap();
        // Execution-scoped note never shadows the master lookup
        store
            .try_insert(CalibrationNote::new(key(), Map::new()))
            .unwrap();

        let found = store.find_latest_master("qcal", "square_64").unwrap().unwrap();
        assert_eq!(found.key, newer);
        assert!(store.find_latest_master("qcal", "other").unwrap().is_none());
    }
}
