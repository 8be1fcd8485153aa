//! Resource cache
//!
//! Dictionaries are parsed and indexed on first use and then shared as
//! `Arc<LoadedDictionary>`. Each catalog entry owns a slot with its own lock,
//! so concurrent first lookups of one dictionary wait for a single load while
//! other dictionaries stay available.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::format::{self, FormatAdapter, MediaStore};
use crate::index::{EntryId, Index};
use crate::normalize::Normalizer;
use crate::types::{DictSummary, DictionaryResource, Entry, ParseMode, ParseOutput, Payload};

/// A parsed and indexed dictionary
pub struct LoadedDictionary {
    pub resource: DictionaryResource,
    pub entries: Vec<Entry>,
    pub index: Index,
    /// Malformed entries dropped by the adapter
    pub skipped: usize,
    pub mode: ParseMode,
    pub media: Option<MediaStore>,
    pub style: Option<String>,
    adapter: Box<dyn FormatAdapter>,
}

impl fmt::Debug for LoadedDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedDictionary")
            .field("id", &self.resource.id)
            .field("entries", &self.entries.len())
            .field("keys", &self.index.len())
            .field("skipped", &self.skipped)
            .field("mode", &self.mode)
            .field("media", &self.media.is_some())
            .finish()
    }
}

impl LoadedDictionary {
    /// Parse the resource's data file and build its index
    pub fn load(resource: &DictionaryResource, mode: ParseMode) -> Result<Self> {
        let started = Instant::now();
        let adapter = format::open(resource.format, &resource.path)?;
        let ParseOutput { entries, skipped } = adapter.parse(mode)?;

        let strip = resource
            .strip_punctuation
            .unwrap_or_else(|| adapter.strips_punctuation());
        let index = Index::build(&entries, Normalizer::new(strip));
        index.verify(entries.len()).map_err(Error::IndexCorrupted)?;

        let media = resource.media.as_ref().and_then(|path| match MediaStore::open(path) {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(id = %resource.id, path = %path.display(), error = %e, "media container unavailable");
                None
            }
        });
        let style = resource.style.as_ref().and_then(|path| match fs::read_to_string(path) {
            Ok(css) => Some(css),
            Err(e) => {
                warn!(id = %resource.id, path = %path.display(), error = %e, "stylesheet unavailable");
                None
            }
        });

        info!(
            id = %resource.id,
            entries = entries.len(),
            keys = index.len(),
            skipped,
            ?mode,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "loaded dictionary"
        );

        Ok(LoadedDictionary {
            resource: resource.clone(),
            entries,
            index,
            skipped,
            mode,
            media,
            style,
            adapter,
        })
    }

    /// Payload of entry `id`, decoded now if the parse was lazy
    pub fn payload(&self, id: EntryId) -> Result<Payload> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| Error::IndexCorrupted(format!("entry id {} out of range", id)))?;
        match &entry.payload {
            Some(payload) => Ok(payload.clone()),
            None => self.adapter.payload_for(&entry.locator),
        }
    }

    /// Title declared inside the data file, if any
    pub fn title(&self) -> Option<String> {
        self.adapter.title()
    }
}

enum SlotState {
    Unloaded,
    Loading,
    Ready(Arc<LoadedDictionary>),
    Failed { kind: ErrorKind, reason: String },
}

struct Slot {
    resource: DictionaryResource,
    state: Mutex<SlotState>,
    settled: Condvar,
    loads: AtomicUsize,
    last_used: AtomicU64,
}

impl Slot {
    fn new(resource: DictionaryResource) -> Self {
        Slot {
            resource,
            state: Mutex::new(SlotState::Unloaded),
            settled: Condvar::new(),
            loads: AtomicUsize::new(0),
            last_used: AtomicU64::new(0),
        }
    }

    fn is_failed(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Failed { .. })
    }
}

/// Puts a slot back to `Unloaded` if its loader unwinds
struct LoadingGuard<'a> {
    slot: &'a Slot,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.slot.state.lock() = SlotState::Unloaded;
            self.slot.settled.notify_all();
        }
    }
}

struct CatalogSlots {
    catalog: Catalog,
    slots: HashMap<String, Arc<Slot>>,
}

impl CatalogSlots {
    fn new(catalog: Catalog, previous: Option<&CatalogSlots>) -> Self {
        let slots = catalog
            .resources()
            .iter()
            .map(|resource| {
                let kept = previous
                    .and_then(|p| p.slots.get(&resource.id))
                    .filter(|slot| slot.resource == *resource && !slot.is_failed())
                    .cloned();
                let slot = kept.unwrap_or_else(|| Arc::new(Slot::new(resource.clone())));
                (resource.id.clone(), slot)
            })
            .collect();
        CatalogSlots { catalog, slots }
    }
}

/// Lazily loading, optionally bounded cache of parsed dictionaries
pub struct ResourceCache {
    slots: RwLock<Arc<CatalogSlots>>,
    lazy_threshold: u64,
    max_resident: Option<usize>,
    force_mode: Option<ParseMode>,
    clock: AtomicU64,
}

impl ResourceCache {
    pub fn new(catalog: Catalog, config: &EngineConfig) -> Self {
        ResourceCache {
            slots: RwLock::new(Arc::new(CatalogSlots::new(catalog, None))),
            lazy_threshold: config.lazy_threshold,
            max_resident: config.max_resident,
            force_mode: None,
            clock: AtomicU64::new(0),
        }
    }

    /// Parse every dictionary in `mode` regardless of file size
    pub fn with_mode(mut self, mode: ParseMode) -> Self {
        self.force_mode = Some(mode);
        self
    }

    fn current(&self) -> Arc<CatalogSlots> {
        self.slots.read().clone()
    }

    /// Installed dictionaries, ordered by name then id
    pub fn list_resources(&self) -> Vec<DictSummary> {
        self.current().catalog.summaries()
    }

    /// Number of parse+build runs performed for `id`
    pub fn load_count(&self, id: &str) -> usize {
        self.current()
            .slots
            .get(id)
            .map_or(0, |slot| slot.loads.load(Ordering::SeqCst))
    }

    /// Whether `id` is currently parsed and resident
    pub fn is_resident(&self, id: &str) -> bool {
        self.current()
            .slots
            .get(id)
            .is_some_and(|slot| matches!(*slot.state.lock(), SlotState::Ready(_)))
    }

    /// Replace the catalog. Unchanged dictionaries keep their loaded state and
    /// failed ones become eligible for another load.
    pub fn refresh(&self, catalog: Catalog) {
        let mut slots = self.slots.write();
        let next = CatalogSlots::new(catalog, Some(&slots));
        info!(dictionaries = next.catalog.len(), "catalog refreshed");
        *slots = Arc::new(next);
    }

    /// Loaded dictionary for `id`, loading it on first use
    pub fn resource_for(&self, id: &str) -> Result<Arc<LoadedDictionary>> {
        let slot = self
            .current()
            .slots
            .get(id)
            .cloned()
            .ok_or_else(|| Error::DictionaryNotFound(id.to_string()))?;
        slot.last_used
            .store(self.clock.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);

        let mut state = slot.state.lock();
        loop {
            match &*state {
                SlotState::Ready(dict) => return Ok(dict.clone()),
                SlotState::Failed { kind, reason } => {
                    return Err(Error::ResourceUnavailable {
                        id: id.to_string(),
                        kind: *kind,
                        reason: reason.clone(),
                    })
                }
                SlotState::Unloaded => break,
                SlotState::Loading => {}
            }
            slot.settled.wait(&mut state);
        }
        *state = SlotState::Loading;
        drop(state);

        let mut guard = LoadingGuard {
            slot: &slot,
            armed: true,
        };
        let mode = self.mode_for(&slot.resource);
        debug!(id, ?mode, "loading dictionary");
        let result = LoadedDictionary::load(&slot.resource, mode);
        slot.loads.fetch_add(1, Ordering::SeqCst);

        let mut state = slot.state.lock();
        let outcome = match result {
            Ok(dict) => {
                let dict = Arc::new(dict);
                *state = SlotState::Ready(dict.clone());
                Ok(dict)
            }
            Err(e) => {
                warn!(id, error = %e, "failed to load dictionary");
                let kind = e.kind();
                let reason = e.to_string();
                *state = SlotState::Failed {
                    kind,
                    reason: reason.clone(),
                };
                Err(Error::ResourceUnavailable {
                    id: id.to_string(),
                    kind,
                    reason,
                })
            }
        };
        guard.armed = false;
        drop(state);
        slot.settled.notify_all();

        if outcome.is_ok() {
            self.enforce_cap(id);
        }
        outcome
    }

    fn mode_for(&self, resource: &DictionaryResource) -> ParseMode {
        if let Some(mode) = self.force_mode {
            return mode;
        }
        match fs::metadata(&resource.path) {
            Ok(meta) if meta.len() > self.lazy_threshold => ParseMode::Lazy,
            _ => ParseMode::Eager,
        }
    }

    /// Evict least recently used dictionaries down to `max_resident`, keeping
    /// `keep` and any dictionary still referenced by a lookup
    fn enforce_cap(&self, keep: &str) {
        let Some(cap) = self.max_resident else {
            return;
        };
        let current = self.current();
        let mut resident: Vec<(u64, &String, &Arc<Slot>)> = current
            .slots
            .iter()
            .filter(|(_, slot)| matches!(*slot.state.lock(), SlotState::Ready(_)))
            .map(|(id, slot)| (slot.last_used.load(Ordering::SeqCst), id, slot))
            .collect();
        if resident.len() <= cap {
            return;
        }
        resident.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

        let mut count = resident.len();
        for (_, id, slot) in resident {
            if count <= cap {
                break;
            }
            if id == keep {
                continue;
            }
            let mut state = slot.state.lock();
            let idle = matches!(&*state, SlotState::Ready(dict) if Arc::strong_count(dict) == 1);
            if idle {
                *state = SlotState::Unloaded;
                count -= 1;
                info!(id = %id, "evicted dictionary");
            }
        }
        if count > cap {
            warn!(resident = count, cap, "resident dictionaries above cap, all in use");
        }
    }
}
