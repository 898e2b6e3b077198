// ── Reactive printer store ──
//
// Printer records plus the raw report document accumulated for each
// printer. Records are published through `watch` channels; raw
// documents are private to the session pipeline.

mod collection;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::watch;

use crate::model::Printer;
use crate::stream::PrinterStream;
use crate::telemetry::deep_merge;
use collection::EntityCollection;

/// Thread-safe store for printer records and accumulated reports.
pub struct PrinterStore {
    printers: EntityCollection<Printer>,
    reports: DashMap<String, Value>,
    last_update: watch::Sender<Option<DateTime<Utc>>>,
}

impl Default for PrinterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PrinterStore {
    pub fn new() -> Self {
        let (last_update, _) = watch::channel(None);
        Self {
            printers: EntityCollection::new(),
            reports: DashMap::new(),
            last_update,
        }
    }

    // ── Records ──────────────────────────────────────────────────────

    /// Insert or replace a record and return the stored handle.
    pub fn upsert(&self, printer: Printer) -> Arc<Printer> {
        let printer = Arc::new(printer);
        self.last_update.send_replace(Some(printer.last_update));
        self.printers.upsert(printer.id.clone(), Arc::clone(&printer));
        printer
    }

    /// Remove a record and its accumulated report.
    pub fn remove(&self, id: &str) -> Option<Arc<Printer>> {
        self.clear_report(id);
        self.printers.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Printer>> {
        self.printers.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.printers.contains(id)
    }

    /// All records, ordered by id.
    pub fn snapshot(&self) -> Arc<Vec<Arc<Printer>>> {
        self.printers.snapshot()
    }

    pub fn subscribe(&self) -> PrinterStream {
        PrinterStream::new(self.printers.subscribe())
    }

    pub fn len(&self) -> usize {
        self.printers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutation counter, bumped on every upsert or removal.
    pub fn version(&self) -> u64 {
        self.printers.version()
    }

    /// Timestamp of the most recent record written.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.borrow()
    }

    // ── Accumulated reports ──────────────────────────────────────────

    /// Merge an incoming report into the printer's accumulated document
    /// and return the result.
    pub fn merge_report(&self, id: &str, incoming: Value) -> Value {
        let mut entry = self
            .reports
            .entry(id.to_owned())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        let merged = deep_merge(entry.value_mut().take(), incoming);
        *entry.value_mut() = merged.clone();
        merged
    }

    /// Forget the accumulated document.
    pub fn clear_report(&self, id: &str) {
        self.reports.remove(id);
    }

    pub fn report(&self, id: &str) -> Option<Value> {
        self.reports.get(id).map(|r| r.value().clone())
    }
}
