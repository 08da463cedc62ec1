//! An open collaborative project.
//!
//! A [`Project`] ties the document store to the file table, the branch
//! metadata and the change history. Every operation takes one lock, so a
//! reader never sees a half-finished checkout or merge. Notifications are
//! collected under the lock and delivered after it is released.
//!
//! ```ignore
//! use patchwork_core::config::ProjectConfig;
//! use patchwork_core::project::Project;
//!
//! let project = Project::open(ProjectConfig::default())?;
//! let feature = project.create_branch("feature")?;
//! project.checkout_branch(&feature)?;
//! project.save_file("a.txt", "hello")?;
//! project.process();
//! ```

mod branches;
mod doc_view;
mod files;
mod handle;
mod history;
mod probe;
mod state;

pub use branches::{BranchInfo, MAIN_BRANCH_NAME};
pub use files::FileContent;
pub use handle::ProjectHandle;
pub use history::ChangeInfo;
pub use probe::UnsavedWorkProbe;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use automerge::transaction::{CommitOptions, Transaction};
use automerge::{Automerge, ChangeHash};

use crate::config::ProjectConfig;
use crate::error::{PatchworkError, Result};
use crate::events::{CallbackRegistry, ProjectEvent, SubscriptionId};
use crate::store::{DocStorage, DocStore, DocumentId, MemoryStorage, ProcessStats, Transport};
use doc_view::DocView;

/// A project opened on this replica.
///
/// Opening performs create and start; dropping performs stop and a final
/// flush, whether or not the project ever became ready.
pub struct Project {
    inner: Mutex<ProjectInner>,
    events: CallbackRegistry,
    probe: RwLock<Option<Arc<dyn UnsavedWorkProbe>>>,
    process_budget: usize,
}

struct ProjectInner {
    store: DocStore,
    metadata_id: DocumentId,
    main_id: Option<DocumentId>,
    /// Cached from the metadata document
    branches: Vec<BranchInfo>,
    /// `None` while joining
    checked_out: Option<DocumentId>,
    /// Heads of the checked-out branch at the last notification
    view_heads: Vec<ChangeHash>,
    /// Heads of the metadata document when `branches` was read
    metadata_heads: Vec<ChangeHash>,
    /// Branch to check out once the project is ready
    wanted_branch: Option<String>,
    started_emitted: bool,
    stopped: bool,
}

impl Project {
    /// Open a project as described by `config`.
    ///
    /// Documents are kept under `storage_dir` when set and in memory
    /// otherwise. A configured `server` is dialed when the crate is built with
    /// the `native-sync` feature.
    pub fn open(config: ProjectConfig) -> Result<Self> {
        let storage: Arc<dyn DocStorage> = match &config.storage_dir {
            #[cfg(not(target_arch = "wasm32"))]
            Some(dir) => Arc::new(crate::store::FsStorage::open(
                crate::fs::RealFileSystem,
                dir.clone(),
            )?),
            #[cfg(target_arch = "wasm32")]
            Some(dir) => {
                log::warn!("No disk storage on this target; ignoring {}", dir.display());
                Arc::new(MemoryStorage::new())
            }
            None => Arc::new(MemoryStorage::new()),
        };
        let transport = transport_for(&config);
        Self::open_with(config, storage, transport)
    }

    /// Open a project over explicit storage and transport backends.
    pub fn open_with(
        config: ProjectConfig,
        storage: Arc<dyn DocStorage>,
        transport: Option<Box<dyn Transport>>,
    ) -> Result<Self> {
        let mut store = DocStore::new(storage);
        if let Some(transport) = transport {
            store = store.with_transport(transport);
        }

        let mut inner = match config.doc_id.as_deref().map(str::trim) {
            None | Some("") => ProjectInner::create(store)?,
            Some(id) => ProjectInner::join(store, id.parse()?)?,
        };
        inner.wanted_branch = config.checked_out_branch.clone();
        inner.try_become_ready()?;
        inner.store.start();

        Ok(Self {
            inner: Mutex::new(inner),
            events: CallbackRegistry::new(),
            probe: RwLock::new(None),
            process_budget: config.process_budget.max(1),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ProjectInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ==================== Lifecycle ====================

    /// Pump replication and deliver notifications. Never blocks, never fails.
    pub fn process(&self) -> ProcessStats {
        let (stats, events) = self.lock().process(self.process_budget);
        self.events.emit_all(&events);
        stats
    }

    /// Resume replication after [`Project::stop`].
    pub fn start(&self) {
        let mut inner = self.lock();
        inner.store.start();
        inner.stopped = false;
    }

    /// Halt replication and flush. Local reads and writes keep working.
    ///
    /// Stopping a stopped project is rejected and logged.
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.stopped {
            log::warn!("Project {} is already stopped", inner.metadata_id);
            return Err(PatchworkError::Configuration(
                "project is already stopped".to_string(),
            ));
        }
        inner.store.stop();
        inner.stopped = true;
        Ok(())
    }

    /// Persist every modified document now.
    pub fn flush(&self) -> Result<()> {
        self.lock().store.flush()
    }

    /// Whether a branch is checked out. Joining projects become ready once
    /// replication delivers the project documents.
    pub fn is_ready(&self) -> bool {
        self.lock().checked_out.is_some()
    }

    /// Whether the sync transport currently has a live peer.
    pub fn is_connected(&self) -> bool {
        self.lock().store.is_connected()
    }

    // ==================== Files ====================

    /// Write a file on the checked-out branch.
    pub fn save_file(&self, path: &str, content: impl Into<FileContent>) -> Result<()> {
        files::validate_path(path)?;
        let content = content.into();
        let mut inner = self.lock();
        let branch = inner.checked_out()?.clone();
        inner.store.with_doc_mut(&branch, |doc| {
            transact(doc, &format!("save {}", path), |tx| {
                files::write_file(tx, path, &content)
            })
        })?;
        log::debug!("Saved {} ({} bytes)", path, content.as_bytes().len());
        Ok(())
    }

    /// Write raw bytes. Text (`is_binary == false`) must be valid UTF-8 and
    /// is rejected before anything is written otherwise.
    pub fn save_file_bytes(&self, path: &str, bytes: &[u8], is_binary: bool) -> Result<()> {
        let content = FileContent::from_bytes(path, bytes.to_vec(), is_binary)?;
        self.save_file(path, content)
    }

    /// Write a dynamic value: a string is text, an array of bytes is binary.
    pub fn save_file_value(&self, path: &str, value: serde_json::Value) -> Result<()> {
        let content = FileContent::try_from(value)?;
        self.save_file(path, content)
    }

    /// Read a file from the checked-out branch.
    pub fn get_file(&self, path: &str) -> Result<FileContent> {
        let inner = self.lock();
        let branch = inner.checked_out()?;
        inner
            .store
            .with_doc(branch, |doc| files::read_file(&DocView::current(doc), path))??
            .ok_or_else(|| PatchworkError::FileNotFound(path.to_string()))
    }

    /// Read a file as it was at `heads` on the checked-out branch.
    pub fn get_file_at(&self, path: &str, heads: &[String]) -> Result<FileContent> {
        let inner = self.lock();
        let branch = inner.checked_out()?;
        inner
            .store
            .with_doc(branch, |doc| {
                let heads = history::parse_heads(doc, heads)?;
                files::read_file(&DocView::at(doc, &heads), path)
            })??
            .ok_or_else(|| PatchworkError::FileNotFound(path.to_string()))
    }

    /// Whether `path` is a live file on the checked-out branch.
    pub fn file_exists(&self, path: &str) -> Result<bool> {
        match self.get_file(path) {
            Ok(_) => Ok(true),
            Err(PatchworkError::FileNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete a file on the checked-out branch.
    pub fn delete_file(&self, path: &str) -> Result<()> {
        let mut inner = self.lock();
        let branch = inner.checked_out()?.clone();
        inner.store.with_doc_mut(&branch, |doc| {
            transact(doc, &format!("delete {}", path), |tx| {
                if files::delete_file(tx, path)? {
                    Ok(())
                } else {
                    Err(PatchworkError::FileNotFound(path.to_string()))
                }
            })
        })
    }

    /// Live paths on the checked-out branch, sorted.
    pub fn list_all_files(&self) -> Result<Vec<String>> {
        let inner = self.lock();
        let branch = inner.checked_out()?;
        inner
            .store
            .with_doc(branch, |doc| files::list_files(&DocView::current(doc)))?
    }

    // ==================== Branches ====================

    /// Project id: the id other replicas join with. Stable for the lifetime
    /// of the project.
    pub fn get_doc_id(&self) -> String {
        self.lock().metadata_id.to_string()
    }

    /// Document id of the checked-out branch.
    pub fn get_branch_doc_id(&self) -> Option<String> {
        self.get_checked_out_branch_id()
    }

    /// Id of the checked-out branch; `None` while joining.
    pub fn get_checked_out_branch_id(&self) -> Option<String> {
        self.lock().checked_out.as_ref().map(DocumentId::to_string)
    }

    /// Every known branch, main first.
    pub fn get_branches(&self) -> Vec<BranchInfo> {
        self.lock().branches.clone()
    }

    /// Fork the checked-out branch as `name`. Does not switch branches.
    pub fn create_branch(&self, name: &str) -> Result<String> {
        branches::validate_branch_name(name)?;
        let (branch_id, all) = {
            let mut inner = self.lock();
            let source = inner.checked_out()?.clone();
            let forked = inner.store.fork_document(&source)?;
            let info = BranchInfo {
                id: forked.to_string(),
                name: name.to_string(),
                forked_from: Some(source.to_string()),
                is_merged: false,
                created_at: history::now_millis(),
            };
            let metadata_id = inner.metadata_id.clone();
            inner.store.with_doc_mut(&metadata_id, |doc| {
                transact(doc, &format!("create branch {}", name), |tx| {
                    branches::register_branch(tx, &info)
                })
            })?;
            inner.refresh_branches()?;
            log::info!("Created branch '{}' ({}) from {}", name, forked, source);
            (info.id, inner.branches.clone())
        };
        self.events
            .emit(&ProjectEvent::BranchesChanged { branches: all });
        Ok(branch_id)
    }

    /// Check out a branch by id or by unique name.
    pub fn checkout_branch(&self, id_or_name: &str) -> Result<()> {
        if self.has_unsaved_work() {
            log::warn!(
                "Checking out '{}' while the editor has unsaved work",
                id_or_name
            );
        }

        let branch_id = {
            let mut inner = self.lock();
            let current = inner.checked_out()?.clone();
            let target: DocumentId = branches::resolve(&inner.branches, id_or_name)?.id.parse()?;
            if target == current {
                return Ok(());
            }
            if !inner.store.has_content(&target) {
                // Announced by a peer but not replicated yet
                inner.store.request_document(&target)?;
                return Err(PatchworkError::DocumentNotFound(target.to_string()));
            }
            inner.set_checked_out(target.clone())?;
            log::info!("Checked out branch {}", target);
            target.to_string()
        };
        self.events.emit(&ProjectEvent::checked_out(branch_id));
        Ok(())
    }

    /// Merge a branch (by id or unique name) into the checked-out branch.
    ///
    /// The merged file changes are reported by the next [`Project::process`].
    pub fn merge_branch(&self, id_or_name: &str) -> Result<()> {
        let branches_changed = {
            let mut inner = self.lock();
            let target = inner.checked_out()?.clone();
            let source_info = branches::resolve(&inner.branches, id_or_name)?.clone();
            let source: DocumentId = source_info.id.parse()?;
            if source == target {
                log::debug!("Merging {} into itself; nothing to do", source);
                return Ok(());
            }
            if !inner.store.has_content(&source) {
                return Err(PatchworkError::DocumentNotFound(source.to_string()));
            }

            let new_changes = inner.store.merge_documents(&target, &source)?;
            inner.store.with_doc_mut(&target, |doc| {
                transact(doc, &format!("merge {}", source_info.name), |tx| {
                    branches::record_merge(tx, &source_info.id)
                })
            })?;
            log::info!(
                "Merged branch '{}' into {} ({} new changes)",
                source_info.name,
                target,
                new_changes.len()
            );

            if inner.main_id.as_ref() == Some(&target) && !source_info.is_merged {
                let metadata_id = inner.metadata_id.clone();
                inner.store.with_doc_mut(&metadata_id, |doc| {
                    transact(doc, &format!("mark {} merged", source_info.name), |tx| {
                        branches::mark_merged(tx, &source_info.id)
                    })
                })?;
                inner.refresh_branches()?;
                Some(inner.branches.clone())
            } else {
                None
            }
        };
        if let Some(branches) = branches_changed {
            self.events.emit(&ProjectEvent::BranchesChanged { branches });
        }
        Ok(())
    }

    // ==================== History ====================

    /// Heads of the checked-out branch, sorted.
    pub fn get_heads(&self) -> Result<Vec<String>> {
        let inner = self.lock();
        let branch = inner.checked_out()?;
        inner.store.with_doc(branch, history::heads)
    }

    /// Change hashes of the checked-out branch, oldest first.
    pub fn get_changes(&self) -> Result<Vec<String>> {
        let inner = self.lock();
        let branch = inner.checked_out()?;
        inner.store.with_doc(branch, history::changes)
    }

    /// Change metadata of the checked-out branch, oldest first.
    pub fn get_change_log(&self) -> Result<Vec<ChangeInfo>> {
        let inner = self.lock();
        let branch = inner.checked_out()?;
        inner.store.with_doc(branch, history::change_log)
    }

    // ==================== Entity state ====================

    /// Integer property of an entity; `None` if unset or not an integer.
    pub fn get_state_int(&self, entity_id: &str, prop: &str) -> Result<Option<i64>> {
        let inner = self.lock();
        let branch = inner.checked_out()?;
        inner.store.with_doc(branch, |doc| {
            state::get_state_int(&DocView::current(doc), entity_id, prop)
        })?
    }

    /// Set an integer property of an entity.
    pub fn set_state_int(&self, entity_id: &str, prop: &str, value: i64) -> Result<()> {
        let mut inner = self.lock();
        let branch = inner.checked_out()?.clone();
        inner.store.with_doc_mut(&branch, |doc| {
            transact(doc, &format!("set {}.{}", entity_id, prop), |tx| {
                state::set_state_int(tx, entity_id, prop, value)
            })
        })
    }

    // ==================== Observers ====================

    /// Register an observer for project events.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ProjectEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(Arc::new(callback))
    }

    /// Remove an observer. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Install the probe consulted before checkouts.
    pub fn set_unsaved_work_probe<P: UnsavedWorkProbe + 'static>(&self, probe: P) {
        *self.probe.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(probe));
    }

    /// Whether the host reports unsaved work. `false` without a probe.
    pub fn has_unsaved_work(&self) -> bool {
        let probe = self
            .probe
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        probe.is_some_and(|probe| probe.has_unsaved_work())
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !inner.stopped {
            inner.store.stop();
            inner.stopped = true;
        }
    }
}

impl ProjectInner {
    fn new(store: DocStore, metadata_id: DocumentId) -> Self {
        Self {
            store,
            metadata_id,
            main_id: None,
            branches: Vec::new(),
            checked_out: None,
            view_heads: Vec::new(),
            metadata_heads: Vec::new(),
            wanted_branch: None,
            started_emitted: false,
            stopped: false,
        }
    }

    /// Allocate the metadata and main documents of a new project.
    fn create(mut store: DocStore) -> Result<Self> {
        let main_id = store.create_document();
        store.with_doc_mut(&main_id, |doc| {
            transact(doc, "create main branch", |tx| files::init_tables(tx))
        })?;

        let metadata_id = store.create_document();
        let created_at = history::now_millis();
        store.with_doc_mut(&metadata_id, |doc| {
            transact(doc, "create project", |tx| {
                branches::init_metadata(tx, main_id.as_str(), created_at)
            })
        })?;

        // Creation is not a change anyone needs to hear about
        store.take_changed();
        log::info!("Created project {}", metadata_id);
        Ok(Self::new(store, metadata_id))
    }

    /// Open an existing project from storage, or wait for peers to deliver it.
    fn join(mut store: DocStore, metadata_id: DocumentId) -> Result<Self> {
        store.request_document(&metadata_id)?;
        if !store.has_content(&metadata_id) {
            log::info!("Joining project {}; waiting for peers", metadata_id);
        }
        Ok(Self::new(store, metadata_id))
    }

    fn checked_out(&self) -> Result<&DocumentId> {
        self.checked_out.as_ref().ok_or(PatchworkError::NotReady)
    }

    fn heads_of(&self, id: &DocumentId) -> Result<Vec<ChangeHash>> {
        self.store.with_doc(id, |doc| {
            let mut heads = doc.get_heads();
            heads.sort();
            heads
        })
    }

    fn set_checked_out(&mut self, id: DocumentId) -> Result<()> {
        self.view_heads = self.heads_of(&id)?;
        self.checked_out = Some(id);
        Ok(())
    }

    /// Re-read branch metadata and make every branch document available.
    fn refresh_branches(&mut self) -> Result<()> {
        let branches = self.store.with_doc(&self.metadata_id, |doc| {
            branches::read_branches(&DocView::current(doc))
        })??;
        for branch in &branches {
            match branch.id.parse::<DocumentId>() {
                Ok(id) => self.store.request_document(&id)?,
                Err(e) => log::warn!("Ignoring branch '{}': {}", branch.name, e),
            }
        }
        self.branches = branches;
        self.metadata_heads = self.heads_of(&self.metadata_id)?;
        Ok(())
    }

    /// Check out main (or the wanted branch) once the project documents are
    /// available. Returns whether the project became ready.
    fn try_become_ready(&mut self) -> Result<bool> {
        if self.checked_out.is_some() || !self.store.has_content(&self.metadata_id) {
            return Ok(false);
        }

        let main_id = match self.main_id.clone() {
            Some(id) => id,
            None => {
                let main = self.store.with_doc(&self.metadata_id, |doc| {
                    branches::read_main_id(&DocView::current(doc))
                })??;
                let Some(main) = main else {
                    return Ok(false);
                };
                let id: DocumentId = main.parse()?;
                self.store.request_document(&id)?;
                self.main_id = Some(id.clone());
                id
            }
        };

        self.refresh_branches()?;
        if !self.store.has_content(&main_id) {
            return Ok(false);
        }
        self.set_checked_out(main_id)?;

        if let Some(wanted) = self.wanted_branch.take() {
            let target = branches::resolve(&self.branches, &wanted)
                .and_then(|branch| branch.id.parse::<DocumentId>());
            match target {
                Ok(id) if self.store.has_content(&id) => self.set_checked_out(id)?,
                Ok(id) => log::warn!("Branch {} is not available yet; staying on main", id),
                Err(e) => log::warn!("Cannot check out '{}': {}; staying on main", wanted, e),
            }
        }

        log::info!("Project {} is ready", self.metadata_id);
        Ok(true)
    }

    fn process(&mut self, budget: usize) -> (ProcessStats, Vec<ProjectEvent>) {
        let stats = self.store.process(budget);
        let mut events = Vec::new();
        if let Err(e) = self.collect_events(&mut events) {
            log::warn!("Failed to update project view: {}", e);
        }
        (stats, events)
    }

    fn collect_events(&mut self, events: &mut Vec<ProjectEvent>) -> Result<()> {
        self.try_become_ready()?;
        let Some(current) = self.checked_out.clone() else {
            return Ok(());
        };

        if !self.started_emitted {
            self.started_emitted = true;
            events.push(ProjectEvent::Started);
        }

        if self.heads_of(&self.metadata_id)? != self.metadata_heads {
            self.refresh_branches()?;
            events.push(ProjectEvent::BranchesChanged {
                branches: self.branches.clone(),
            });
        }

        let heads = self.heads_of(&current)?;
        if heads != self.view_heads {
            let paths = self.store.with_doc(&current, |doc| {
                files::changed_paths(doc, &self.view_heads, &heads)
            })??;
            self.view_heads = heads;
            events.extend(paths.into_iter().map(ProjectEvent::file_changed));
            events.push(ProjectEvent::FilesChanged);
        }
        Ok(())
    }
}

/// Run `f` in a transaction committed with `message`; roll back on error.
fn transact<R>(
    doc: &mut Automerge,
    message: &str,
    f: impl FnOnce(&mut Transaction<'_>) -> Result<R>,
) -> Result<R> {
    let mut tx = doc.transaction();
    match f(&mut tx) {
        Ok(value) => {
            tx.commit_with(
                CommitOptions::default()
                    .with_message(message.to_string())
                    .with_time(history::now_millis()),
            );
            Ok(value)
        }
        Err(e) => {
            tx.rollback();
            Err(e)
        }
    }
}

#[cfg(feature = "native-sync")]
fn transport_for(config: &ProjectConfig) -> Option<Box<dyn Transport>> {
    use crate::store::TcpTransport;

    let delay = std::time::Duration::from_millis(config.reconnect_delay_ms);
    match (&config.listen, &config.server) {
        (Some(addr), _) => Some(Box::new(TcpTransport::listen(addr.clone(), delay))),
        (None, Some(server)) => Some(Box::new(TcpTransport::dial(server.clone(), delay))),
        (None, None) => None,
    }
}

#[cfg(not(feature = "native-sync"))]
fn transport_for(config: &ProjectConfig) -> Option<Box<dyn Transport>> {
    if let Some(addr) = config.listen.as_ref().or(config.server.as_ref()) {
        log::warn!(
            "Sync address {} configured but networking is not compiled in; working offline",
            addr
        );
    }
    None
}
