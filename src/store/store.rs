//! In-memory result store shared by watchers and readers.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::models::*;

/// Samples per sealed chunk. Bounds the copy a reader makes under the lock.
const CHUNK_LEN: usize = 256;

/// Append-only series for one target.
///
/// Full chunks are frozen into shared `Arc<[Sample]>` slices; only the tail
/// is mutable. Readers take a handle to the frozen chunks plus a copy of the
/// short tail, then flatten outside the lock.
struct Series {
    url: Option<String>,
    started_at: DateTime<Utc>,
    elapsed_secs: f64,
    sealed: Arc<Vec<Arc<[Sample]>>>,
    tail: Vec<Sample>,
}

/// What a reader takes out of a [`Series`] while holding its lock.
struct SeriesView {
    url: Option<String>,
    started_at: DateTime<Utc>,
    elapsed_secs: f64,
    sealed: Arc<Vec<Arc<[Sample]>>>,
    tail: Vec<Sample>,
}

impl Series {
    fn new(url: Option<String>) -> Self {
        Self {
            url,
            started_at: Utc::now(),
            elapsed_secs: 0.0,
            sealed: Arc::new(Vec::new()),
            tail: Vec::with_capacity(CHUNK_LEN),
        }
    }

    fn push(&mut self, sample: Sample) {
        self.elapsed_secs = sample.elapsed_secs;
        self.tail.push(sample);

        if self.tail.len() == CHUNK_LEN {
            let chunk: Arc<[Sample]> = std::mem::replace(&mut self.tail, Vec::with_capacity(CHUNK_LEN)).into();
            Arc::make_mut(&mut self.sealed).push(chunk);
        }
    }

    fn view(&self) -> SeriesView {
        SeriesView {
            url: self.url.clone(),
            started_at: self.started_at,
            elapsed_secs: self.elapsed_secs,
            sealed: self.sealed.clone(),
            tail: self.tail.clone(),
        }
    }
}

impl Default for Series {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SeriesView {
    fn into_history(self) -> TargetHistory {
        let mut samples = Vec::with_capacity(self.sealed.len() * CHUNK_LEN + self.tail.len());
        for chunk in self.sealed.iter() {
            samples.extend_from_slice(chunk);
        }
        samples.extend_from_slice(&self.tail);

        TargetHistory {
            url: self.url,
            started_at: self.started_at,
            elapsed_secs: self.elapsed_secs,
            samples,
        }
    }
}

type Slot = Arc<RwLock<Series>>;

/// Thread-safe mapping from target identifier to its history.
///
/// Each target has its own lock, held by a reader only long enough to clone
/// a chunk handle and at most one partial chunk. The outer map lock is only
/// taken for writing when a target is first seen or reset.
#[derive(Default)]
pub struct Store {
    histories: RwLock<HashMap<String, Slot>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &str) -> Slot {
        if let Some(slot) = self.histories.read().get(id) {
            return slot.clone();
        }
        self.histories
            .write()
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    fn view(&self, id: &str) -> Option<SeriesView> {
        let slot = self.histories.read().get(id).cloned()?;
        let view = slot.read().view();
        Some(view)
    }

    /// Append a sample to a target's history.
    pub fn append(&self, id: &str, sample: Sample) {
        self.slot(id).write().push(sample);
    }

    /// Reset a target's history ahead of a fresh run.
    pub fn clear(&self, id: &str) {
        self.install(id, None);
    }

    /// Reset a target's history and remember the URL it watches.
    pub fn reset(&self, target: &Target) {
        self.install(&target.id, Some(target.url.clone()));
    }

    fn install(&self, id: &str, url: Option<String>) {
        let fresh = Arc::new(RwLock::new(Series::new(url)));
        self.histories.write().insert(id.to_string(), fresh);
    }

    /// Copy of a single target's history.
    pub fn history(&self, id: &str) -> Option<TargetHistory> {
        self.view(id).map(SeriesView::into_history)
    }

    pub fn target_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.histories.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Copy every history. Each copy is consistent on its own; different
    /// targets may be copied a few appends apart.
    pub fn snapshot(&self) -> Snapshot {
        let slots: Vec<(String, Slot)> = self
            .histories
            .read()
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect();

        let views: Vec<(String, SeriesView)> = slots
            .into_iter()
            .map(|(id, slot)| {
                let view = slot.read().view();
                (id, view)
            })
            .collect();

        let targets: BTreeMap<String, TargetHistory> = views
            .into_iter()
            .map(|(id, view)| (id, view.into_history()))
            .collect();

        Snapshot {
            taken_at: Utc::now(),
            targets,
        }
    }
}
