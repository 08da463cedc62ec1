//! The document store: owns, persists and replicates Automerge documents.

use std::collections::HashMap;
use std::sync::Arc;

use automerge::sync::{self, SyncDoc};
use automerge::{Automerge, ChangeHash};

use super::frame::{decode_sync_frame, encode_sync_frame};
use super::storage::DocStorage;
use super::transport::Transport;
use super::types::DocumentId;
use crate::error::{PatchworkError, Result};

/// What one [`DocStore::process`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessStats {
    /// Frames taken from the transport.
    pub messages_received: usize,
    /// Frames handed to the transport.
    pub messages_sent: usize,
    /// Documents whose heads moved since the previous report, in id order.
    pub changed: Vec<DocumentId>,
}

struct DocEntry {
    doc: Automerge,
    sync_state: sync::State,
    /// Snapshot on disk is older than `doc`
    dirty: bool,
    /// Heads at the last change report
    reported_heads: Vec<ChangeHash>,
}

impl DocEntry {
    fn new(doc: Automerge) -> Self {
        let reported_heads = sorted_heads(&doc);
        Self {
            doc,
            sync_state: sync::State::new(),
            dirty: false,
            reported_heads,
        }
    }
}

/// Owns every document of a project.
///
/// The store is the only place documents are mutated. Local writes go through
/// [`DocStore::with_doc_mut`]; remote changes arrive in [`DocStore::process`].
/// Both are reported as changed ids by the next `process` (or
/// [`DocStore::take_changed`]).
pub struct DocStore {
    docs: HashMap<DocumentId, DocEntry>,
    storage: Arc<dyn DocStorage>,
    transport: Option<Box<dyn Transport>>,
    running: bool,
    was_connected: bool,
}

impl DocStore {
    /// Create a store persisting through `storage`, without replication.
    pub fn new(storage: Arc<dyn DocStorage>) -> Self {
        Self {
            docs: HashMap::new(),
            storage,
            transport: None,
            running: false,
            was_connected: false,
        }
    }

    /// Attach the transport used once the store is started.
    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    // ==================== Documents ====================

    /// Allocate a new, empty document.
    pub fn create_document(&mut self) -> DocumentId {
        let id = DocumentId::random();
        let mut entry = DocEntry::new(Automerge::new());
        entry.dirty = true;
        self.docs.insert(id.clone(), entry);
        log::debug!("Created document {}", id);
        id
    }

    /// Make `id` available locally.
    ///
    /// Loads the snapshot from storage when there is one; otherwise registers
    /// an empty placeholder that replication fills in.
    pub fn request_document(&mut self, id: &DocumentId) -> Result<()> {
        if self.docs.contains_key(id) {
            return Ok(());
        }
        let doc = match self.storage.load_doc(id.as_str())? {
            Some(bytes) => {
                log::debug!("Loaded document {} ({} bytes)", id, bytes.len());
                Automerge::load(&bytes)?
            }
            None => {
                log::debug!("Requesting document {} from peers", id);
                Automerge::new()
            }
        };
        self.docs.insert(id.clone(), DocEntry::new(doc));
        Ok(())
    }

    /// Fork `source` into a new document sharing its history.
    pub fn fork_document(&mut self, source: &DocumentId) -> Result<DocumentId> {
        let forked = self.entry(source)?.doc.fork();
        let id = DocumentId::random();
        let mut entry = DocEntry::new(forked);
        entry.dirty = true;
        self.docs.insert(id.clone(), entry);
        log::debug!("Forked document {} into {}", source, id);
        Ok(id)
    }

    /// Merge the history of `source` into `target`.
    ///
    /// Returns the hashes of the changes `target` did not have yet.
    pub fn merge_documents(
        &mut self,
        target: &DocumentId,
        source: &DocumentId,
    ) -> Result<Vec<ChangeHash>> {
        if target == source {
            return Ok(Vec::new());
        }
        // Take the source out so both documents can be borrowed mutably
        let mut source_entry = self
            .docs
            .remove(source)
            .ok_or_else(|| PatchworkError::DocumentNotFound(source.to_string()))?;
        let merged = match self.docs.get_mut(target) {
            Some(target_entry) => {
                let result = target_entry.doc.merge(&mut source_entry.doc);
                if matches!(&result, Ok(hashes) if !hashes.is_empty()) {
                    target_entry.dirty = true;
                }
                result.map_err(PatchworkError::from)
            }
            None => Err(PatchworkError::DocumentNotFound(target.to_string())),
        };
        self.docs.insert(source.clone(), source_entry);
        merged
    }

    /// Read a document.
    pub fn with_doc<R>(&self, id: &DocumentId, f: impl FnOnce(&Automerge) -> R) -> Result<R> {
        Ok(f(&self.entry(id)?.doc))
    }

    /// Mutate a document. The closure's error is returned unchanged.
    pub fn with_doc_mut<R>(
        &mut self,
        id: &DocumentId,
        f: impl FnOnce(&mut Automerge) -> Result<R>,
    ) -> Result<R> {
        let entry = self
            .docs
            .get_mut(id)
            .ok_or_else(|| PatchworkError::DocumentNotFound(id.to_string()))?;
        let before = entry.doc.get_heads();
        let result = f(&mut entry.doc);
        if entry.doc.get_heads() != before {
            entry.dirty = true;
        }
        result
    }

    /// Whether `id` is known locally (loaded or placeholder).
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.docs.contains_key(id)
    }

    /// Whether `id` is known locally and has at least one change.
    pub fn has_content(&self, id: &DocumentId) -> bool {
        self.docs
            .get(id)
            .is_some_and(|entry| !entry.doc.get_heads().is_empty())
    }

    /// Ids of all local documents, sorted.
    pub fn document_ids(&self) -> Vec<DocumentId> {
        let mut ids: Vec<DocumentId> = self.docs.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn entry(&self, id: &DocumentId) -> Result<&DocEntry> {
        self.docs
            .get(id)
            .ok_or_else(|| PatchworkError::DocumentNotFound(id.to_string()))
    }

    // ==================== Lifecycle ====================

    /// Start replicating. Connection failures are logged; the store keeps
    /// working locally.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        if let Some(transport) = self.transport.as_mut() {
            if let Err(e) = transport.connect() {
                log::warn!("Sync transport failed to connect: {}", e);
            }
        }
        log::info!("Document store started");
    }

    /// Stop replicating and flush every dirty document.
    pub fn stop(&mut self) {
        if !self.running {
            self.flush_logged();
            return;
        }
        self.running = false;
        self.was_connected = false;
        if let Some(transport) = self.transport.as_mut() {
            if let Err(e) = transport.disconnect() {
                log::warn!("Sync transport failed to disconnect: {}", e);
            }
        }
        self.flush_logged();
        log::info!("Document store stopped");
    }

    /// Whether [`DocStore::start`] has been called without a matching stop.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether the transport currently reports a live connection.
    pub fn is_connected(&self) -> bool {
        self.running
            && self
                .transport
                .as_ref()
                .is_some_and(|transport| transport.is_connected())
    }

    // ==================== Process ====================

    /// Pump replication once. Never blocks and never fails.
    ///
    /// Applies at most `budget` incoming frames, offers every document's next
    /// sync message to the peer, flushes dirty documents and reports the
    /// documents whose heads moved since the previous report.
    pub fn process(&mut self, budget: usize) -> ProcessStats {
        let mut stats = ProcessStats::default();

        let connected = self.is_connected();
        if connected && !self.was_connected {
            log::info!("Sync peer connected; restarting sync sessions");
            for entry in self.docs.values_mut() {
                entry.sync_state = sync::State::new();
            }
        }
        self.was_connected = connected;

        if connected {
            stats.messages_received = self.receive_frames(budget);
            stats.messages_sent = self.send_frames();
        }

        self.flush_logged();
        stats.changed = self.take_changed();
        stats
    }

    /// Report documents whose heads moved since the previous report.
    pub fn take_changed(&mut self) -> Vec<DocumentId> {
        let mut changed = Vec::new();
        for (id, entry) in self.docs.iter_mut() {
            let heads = sorted_heads(&entry.doc);
            if heads != entry.reported_heads {
                entry.reported_heads = heads;
                changed.push(id.clone());
            }
        }
        changed.sort();
        changed
    }

    /// Heads of `id` at the last change report.
    pub fn reported_heads(&self, id: &DocumentId) -> Result<Vec<ChangeHash>> {
        Ok(self.entry(id)?.reported_heads.clone())
    }

    fn receive_frames(&mut self, budget: usize) -> usize {
        let Some(transport) = self.transport.as_ref() else {
            return 0;
        };
        let frames = match transport.receive(budget) {
            Ok(frames) => frames,
            Err(e) => {
                log::warn!("Sync receive failed: {}", e);
                return 0;
            }
        };

        let count = frames.len();
        for frame in frames {
            if let Err(e) = self.apply_frame(&frame) {
                log::warn!("Dropping sync frame: {}", e);
            }
        }
        count
    }

    fn apply_frame(&mut self, frame: &[u8]) -> Result<()> {
        let (id, payload) = decode_sync_frame(frame)?;
        let message = sync::Message::decode(payload)
            .map_err(|e| PatchworkError::Transport(format!("bad sync message: {}", e)))?;

        // Peers may announce documents we have not asked for yet
        self.request_document(&id)?;
        let entry = self
            .docs
            .get_mut(&id)
            .ok_or_else(|| PatchworkError::DocumentNotFound(id.to_string()))?;

        let before = entry.doc.get_heads();
        entry.doc.receive_sync_message(&mut entry.sync_state, message)?;
        if entry.doc.get_heads() != before {
            entry.dirty = true;
            log::debug!("Applied remote changes to {}", id);
        }
        Ok(())
    }

    fn send_frames(&mut self) -> usize {
        let Some(transport) = self.transport.as_ref() else {
            return 0;
        };

        let mut sent = 0;
        for (id, entry) in self.docs.iter_mut() {
            let Some(message) = entry.doc.generate_sync_message(&mut entry.sync_state) else {
                continue;
            };
            let frame = encode_sync_frame(id, &message.encode());
            match transport.send(frame) {
                Ok(()) => sent += 1,
                Err(e) => {
                    log::warn!("Sync send for {} failed: {}", id, e);
                    // The peer never saw it; start this session over
                    entry.sync_state = sync::State::new();
                }
            }
        }
        sent
    }

    // ==================== Persistence ====================

    /// Write every dirty document to storage.
    pub fn flush(&mut self) -> Result<()> {
        for (id, entry) in self.docs.iter_mut() {
            if !entry.dirty || entry.doc.get_heads().is_empty() {
                continue;
            }
            self.storage.save_doc(id.as_str(), &entry.doc.save())?;
            entry.dirty = false;
        }
        Ok(())
    }

    fn flush_logged(&mut self) {
        if let Err(e) = self.flush() {
            log::warn!("Failed to persist documents: {}", e);
        }
    }
}

impl Drop for DocStore {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sorted_heads(doc: &Automerge) -> Vec<ChangeHash> {
    let mut heads = doc.get_heads();
    heads.sort();
    heads
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory_storage::MemoryStorage;
    use crate::store::transport::MemoryTransport;
    use automerge::transaction::Transactable;
    use automerge::{ROOT, ReadDoc};

    fn put(store: &mut DocStore, id: &DocumentId, key: &str, value: &str) {
        store
            .with_doc_mut(id, |doc| {
                let mut tx = doc.transaction();
                tx.put(ROOT, key, value)?;
                tx.commit();
                Ok(())
            })
            .unwrap();
    }

    fn get(store: &DocStore, id: &DocumentId, key: &str) -> Option<String> {
        store
            .with_doc(id, |doc| {
                doc.get(ROOT, key)
                    .ok()
                    .flatten()
                    .and_then(|(v, _)| v.to_str().map(str::to_string))
            })
            .unwrap()
    }

    fn pump(a: &mut DocStore, b: &mut DocStore) {
        for _ in 0..10 {
            a.process(64);
            b.process(64);
        }
    }

    #[test]
    fn test_local_changes_are_reported_once() {
        let mut store = DocStore::new(Arc::new(MemoryStorage::new()));
        let id = store.create_document();
        put(&mut store, &id, "k", "v");

        assert_eq!(store.process(64).changed, vec![id.clone()]);
        assert!(store.process(64).changed.is_empty());
    }

    #[test]
    fn test_flush_persists_and_reload_restores() {
        let storage = MemoryStorage::new();
        let mut store = DocStore::new(Arc::new(storage.clone()));
        let id = store.create_document();
        put(&mut store, &id, "title", "hello");
        store.flush().unwrap();
        assert!(storage.load_doc(id.as_str()).unwrap().is_some());

        let mut reopened = DocStore::new(Arc::new(storage));
        reopened.request_document(&id).unwrap();
        assert_eq!(get(&reopened, &id, "title").as_deref(), Some("hello"));
    }

    #[test]
    fn test_empty_placeholders_are_not_persisted() {
        let storage = MemoryStorage::new();
        let mut store = DocStore::new(Arc::new(storage.clone()));
        store.request_document(&DocumentId::random()).unwrap();
        store.flush().unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn test_fork_and_merge() {
        let mut store = DocStore::new(Arc::new(MemoryStorage::new()));
        let main = store.create_document();
        put(&mut store, &main, "a", "1");

        let fork = store.fork_document(&main).unwrap();
        put(&mut store, &fork, "b", "2");
        assert_eq!(get(&store, &main, "b"), None);

        let merged = store.merge_documents(&main, &fork).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(get(&store, &main, "b").as_deref(), Some("2"));
        assert!(store.merge_documents(&main, &main).unwrap().is_empty());
    }

    #[test]
    fn test_missing_document_is_an_error() {
        let mut store = DocStore::new(Arc::new(MemoryStorage::new()));
        let err = store.fork_document(&DocumentId::random()).err().unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_replication_fills_placeholder() {
        let (ta, tb) = MemoryTransport::pair();
        let mut a = DocStore::new(Arc::new(MemoryStorage::new())).with_transport(Box::new(ta));
        let mut b = DocStore::new(Arc::new(MemoryStorage::new())).with_transport(Box::new(tb));
        a.start();
        b.start();

        let id = a.create_document();
        put(&mut a, &id, "greeting", "hi");
        b.request_document(&id).unwrap();
        assert!(!b.has_content(&id));

        pump(&mut a, &mut b);
        assert_eq!(get(&b, &id, "greeting").as_deref(), Some("hi"));
    }

    #[test]
    fn test_partition_degrades_to_local_and_recovers() {
        let (ta, tb) = MemoryTransport::pair();
        let mut a = DocStore::new(Arc::new(MemoryStorage::new())).with_transport(Box::new(ta));
        let mut b = DocStore::new(Arc::new(MemoryStorage::new())).with_transport(Box::new(tb));
        a.start();
        b.start();

        let id = a.create_document();
        put(&mut a, &id, "k", "1");
        b.request_document(&id).unwrap();
        pump(&mut a, &mut b);
        assert_eq!(get(&b, &id, "k").as_deref(), Some("1"));

        a.stop();
        put(&mut a, &id, "k", "2");
        let stats = a.process(64);
        assert_eq!(stats.messages_sent, 0);
        pump(&mut a, &mut b);
        assert_eq!(get(&b, &id, "k").as_deref(), Some("1"));

        a.start();
        pump(&mut a, &mut b);
        assert_eq!(get(&b, &id, "k").as_deref(), Some("2"));
    }
}
