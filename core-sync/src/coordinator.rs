//! # Sync Coordinator
//!
//! Drives one synchronisation run of an import against the local library.
//!
//! ## Workflow
//!
//! 1. Resolve the handler of every media type the import covers
//! 2. Open a scoped transaction and let each handler prepare its run state
//!    (hierarchy caches)
//! 3. Build the changeset: match incoming items to previously imported local
//!    items and classify each pair; unvisited local items become removals,
//!    except parents (shows, seasons, sets), which are left to the cleanup
//!    pass
//! 4. Apply additions and updates parents first, then removals children first
//! 5. Finish the handlers, enable the imported items and commit
//! 6. Clean up orphaned parents, one transaction per media type
//! 7. Stamp `last_synced` on the import
//!
//! Per-item failures are logged, counted and skipped. Structural failures
//! (repository unavailable, commit failure, missing handler, parent creation
//! without any way to write it) and cancellation roll the run back and leave
//! `last_synced` untouched.
//!
//! ## Concurrency
//!
//! Runs are serialised per import: a second run of the same import waits for
//! the first one. Runs of different imports share the repository, which holds
//! one transaction at a time, so their transactions take turns on a writer
//! lock owned by the coordinator. Cancellation is checked between items only.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let coordinator = SyncCoordinator::new(repository, registry, event_bus)
//!     .with_config(SyncConfig::default().with_progress_interval(50));
//!
//! if !coordinator.synchronise(&mut import, items).await {
//!     // diagnostics went to the log; the next run retries from last_synced
//! }
//! ```

use core_library::{ImportId, MediaImport, MediaItem, MediaRepository, MediaType};
use core_runtime::clock::{Clock, SystemClock};
use core_runtime::events::{CoreEvent, EventBus, ImportEvent, LibraryEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::changeset::ChangesetType;
use crate::context::SyncContext;
use crate::enrichment::DetailsLoader;
use crate::error::{Result, SyncError};
use crate::handlers::{CleanupStats, ImportHandler};
use crate::registry::HandlerRegistry;
use crate::transaction::ScopedTransaction;

/// Parents before their children.
const APPLY_ORDER: [MediaType; 6] = [
    MediaType::TvShow,
    MediaType::Season,
    MediaType::Episode,
    MediaType::MovieSet,
    MediaType::Movie,
    MediaType::MusicVideo,
];

/// Sync coordinator configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Run the cleanup pass after a successful run
    pub cleanup_enabled: bool,

    /// Enable the provenance links of the import once a run finishes
    pub enable_items_on_finish: bool,

    /// Emit a progress event every N applied items
    pub progress_interval: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cleanup_enabled: true,
            enable_items_on_finish: true,
            progress_interval: 1,
        }
    }
}

impl SyncConfig {
    pub fn with_cleanup(mut self, enabled: bool) -> Self {
        self.cleanup_enabled = enabled;
        self
    }

    pub fn with_enable_items_on_finish(mut self, enabled: bool) -> Self {
        self.enable_items_on_finish = enabled;
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn validate(&self) -> core_runtime::Result<()> {
        if self.progress_interval == 0 {
            return Err(core_runtime::Error::Config(
                "progress_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// An item together with its classification
#[derive(Debug, Clone, PartialEq)]
pub struct ChangesetItem {
    pub changeset: ChangesetType,
    pub item: MediaItem,
}

impl ChangesetItem {
    pub fn new(changeset: ChangesetType, item: MediaItem) -> Self {
        Self { changeset, item }
    }

    pub fn added(item: MediaItem) -> Self {
        Self::new(ChangesetType::Added, item)
    }

    pub fn changed(item: MediaItem) -> Self {
        Self::new(ChangesetType::Changed, item)
    }

    pub fn removed(item: MediaItem) -> Self {
        Self::new(ChangesetType::Removed, item)
    }

    pub fn unchanged(item: MediaItem) -> Self {
        Self::new(ChangesetType::None, item)
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub run_id: String,
    pub added: u64,
    pub updated: u64,
    pub removed: u64,
    pub unchanged: u64,
    /// Items skipped after a per-item failure
    pub failed: u64,
    pub cleanup: CleanupStats,
    pub duration_ms: u64,
}

impl SyncReport {
    fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            ..Self::default()
        }
    }

    /// True when no item had to be skipped.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    fn applied(&self) -> u64 {
        self.added + self.updated + self.removed
    }
}

/// What a run starts from
enum RunInput {
    /// Everything the source currently reports
    Full(Vec<MediaItem>),
    /// Deltas classified by the source
    Partial(Vec<ChangesetItem>),
}

impl RunInput {
    fn len(&self) -> usize {
        match self {
            RunInput::Full(items) => items.len(),
            RunInput::Partial(changes) => changes.len(),
        }
    }
}

/// Changeset of one media type, split by how it is applied
#[derive(Default)]
struct TypeChangeset {
    upserts: Vec<ChangesetItem>,
    removals: Vec<MediaItem>,
    unchanged: u64,
}

/// Mutable bookkeeping of a run
struct RunState {
    report: SyncReport,
    processed: u64,
    total: u64,
    pending_events: Vec<LibraryEvent>,
}

/// Sync coordinator for import runs
pub struct SyncCoordinator {
    config: SyncConfig,
    repository: Arc<dyn MediaRepository>,
    registry: Arc<HandlerRegistry>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    details_loader: Option<Arc<dyn DetailsLoader>>,
    /// One lock per import serialising its runs
    import_locks: Mutex<HashMap<ImportId, Arc<Mutex<()>>>>,
    /// Cancellation tokens of running imports
    active_runs: Mutex<HashMap<ImportId, CancellationToken>>,
    /// Held by every open transaction
    writer: Arc<Mutex<()>>,
    shutdown: CancellationToken,
}

impl SyncCoordinator {
    /// Create a new sync coordinator
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let registry = HandlerRegistry::with_defaults(repository.clone());
    /// let coordinator = SyncCoordinator::new(repository, registry, EventBus::new(100));
    /// ```
    pub fn new(
        repository: Arc<dyn MediaRepository>,
        registry: Arc<HandlerRegistry>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            config: SyncConfig::default(),
            repository,
            registry,
            event_bus,
            clock: Arc::new(SystemClock),
            details_loader: None,
            import_locks: Mutex::new(HashMap::new()),
            active_runs: Mutex::new(HashMap::new()),
            writer: Arc::new(Mutex::new(())),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_details_loader(mut self, loader: Arc<dyn DetailsLoader>) -> Self {
        self.details_loader = Some(loader);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Parent token of every run. Cancelling it cancels the runs in flight
    /// and every run started afterwards.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        info!("Cancelling all import runs");
        self.shutdown.cancel();
    }

    /// Cancels the running synchronisation of `import`, if any.
    pub async fn cancel_synchronisation(&self, import: &ImportId) -> bool {
        let active_runs = self.active_runs.lock().await;
        match active_runs.get(import) {
            Some(token) => {
                info!(import = %import, "Cancelling import run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self, import: &ImportId) -> bool {
        self.active_runs.lock().await.contains_key(import)
    }

    /// Synchronises `items`, the complete current content of the source,
    /// into the library.
    ///
    /// # Errors
    ///
    /// Returns the structural failure that rolled the run back, or
    /// [`SyncError::Cancelled`].
    #[instrument(skip(self, import, items), fields(import = %import, items = items.len()))]
    pub async fn try_synchronise(
        &self,
        import: &mut MediaImport,
        items: Vec<MediaItem>,
    ) -> Result<SyncReport> {
        self.run(import, RunInput::Full(items)).await
    }

    /// Like [`try_synchronise`](Self::try_synchronise), reporting success
    /// as a flag. Diagnostics go to the log.
    pub async fn synchronise(&self, import: &mut MediaImport, items: Vec<MediaItem>) -> bool {
        self.try_synchronise(import, items).await.is_ok()
    }

    /// Synchronises deltas classified by the source.
    ///
    /// Unknown items reported as changed or removed are dropped, known
    /// items reported as added are treated as changed.
    #[instrument(skip(self, import, changes), fields(import = %import, changes = changes.len()))]
    pub async fn try_synchronise_partial(
        &self,
        import: &mut MediaImport,
        changes: Vec<ChangesetItem>,
    ) -> Result<SyncReport> {
        self.run(import, RunInput::Partial(changes)).await
    }

    pub async fn synchronise_partial(
        &self,
        import: &mut MediaImport,
        changes: Vec<ChangesetItem>,
    ) -> bool {
        self.try_synchronise_partial(import, changes).await.is_ok()
    }

    /// Removes everything `import` brought into the library.
    ///
    /// Parents still holding children of other sources are only unlinked.
    ///
    /// # Returns
    ///
    /// Number of removed or unlinked items
    #[instrument(skip(self, import), fields(import = %import))]
    pub async fn remove_import(&self, import: &MediaImport) -> Result<u64> {
        let lock = self.import_lock(&import.id()).await;
        let _guard = lock.lock().await;

        let handlers = self.handlers_for(import)?;
        let tx = self.begin().await?;

        let mut removed = 0;
        for handler in handlers.iter().rev() {
            match handler.remove_imported_items(import).await {
                Ok(count) => removed += count,
                Err(e) => {
                    error!(media_type = %handler.media_type(), error = %e, "Failed to remove imported items");
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, "Rollback failed");
                    }
                    return Err(e);
                }
            }
        }
        tx.commit().await?;

        self.cleanup(import, &handlers).await?;
        info!(removed, "Removed import");
        Ok(removed)
    }

    /// Enables or disables every item imported by `import`.
    pub async fn set_imported_items_enabled(
        &self,
        import: &MediaImport,
        enable: bool,
    ) -> Result<()> {
        let lock = self.import_lock(&import.id()).await;
        let _guard = lock.lock().await;

        let handlers = self.handlers_for(import)?;
        let tx = self.begin().await?;
        for handler in &handlers {
            if let Err(e) = handler.set_imported_items_enabled(import, enable).await {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                return Err(e);
            }
        }
        tx.commit().await
    }

    async fn begin(&self) -> Result<ScopedTransaction> {
        ScopedTransaction::begin_exclusive(Arc::clone(&self.repository), Arc::clone(&self.writer))
            .await
    }

    async fn import_lock(&self, import: &ImportId) -> Arc<Mutex<()>> {
        let mut locks = self.import_locks.lock().await;
        Arc::clone(
            locks
                .entry(import.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Handlers of the media types covered by `import`, parents first.
    fn handlers_for(&self, import: &MediaImport) -> Result<Vec<Arc<dyn ImportHandler>>> {
        let mut handlers = Vec::new();
        for media_type in APPLY_ORDER.into_iter().filter(|t| import.contains(*t)) {
            let handler = self
                .registry
                .get_handler_for_type(media_type)
                .ok_or(SyncError::HandlerMissing(media_type))?;

            if let Some(missing) = handler
                .required_media_types()
                .iter()
                .find(|required| !import.contains(**required))
            {
                return Err(SyncError::IncompleteImport {
                    import: import.to_string(),
                    media_type,
                    missing: *missing,
                });
            }
            handlers.push(handler);
        }
        Ok(handlers)
    }

    async fn run(&self, import: &mut MediaImport, input: RunInput) -> Result<SyncReport> {
        let import_id = import.id();
        let lock = self.import_lock(&import_id).await;
        let _guard = lock.lock().await;

        let run_id = Uuid::new_v4().to_string();
        let token = self.shutdown.child_token();
        self.active_runs
            .lock()
            .await
            .insert(import_id.clone(), token.clone());

        let mut state = RunState {
            report: SyncReport::new(&run_id),
            processed: 0,
            total: input.len() as u64,
            pending_events: Vec::new(),
        };
        self.emit(CoreEvent::Import(ImportEvent::Started {
            run_id: run_id.clone(),
            source: import.source_id().to_string(),
            media_types: import.media_types.to_string(),
            total_items: state.total,
        }));

        let started = Instant::now();
        let result = self.run_locked(import, input, &run_id, &token, &mut state).await;
        self.active_runs.lock().await.remove(&import_id);

        match result {
            Ok(()) => {
                let mut report = state.report;
                report.duration_ms = started.elapsed().as_millis() as u64;
                import.last_synced = Some(self.clock.now());

                info!(
                    run_id = %run_id,
                    applied = report.applied(),
                    added = report.added,
                    updated = report.updated,
                    removed = report.removed,
                    unchanged = report.unchanged,
                    failed = report.failed,
                    "Import synchronised"
                );
                self.emit(CoreEvent::Import(ImportEvent::Completed {
                    run_id,
                    added: report.added,
                    updated: report.updated,
                    removed: report.removed,
                    unchanged: report.unchanged,
                    failed: report.failed,
                    duration_ms: report.duration_ms,
                }));
                Ok(report)
            }
            Err(SyncError::Cancelled(what)) => {
                warn!(run_id = %run_id, processed = state.processed, "Import run cancelled");
                self.emit(CoreEvent::Import(ImportEvent::Cancelled {
                    run_id,
                    items_processed: state.processed,
                }));
                Err(SyncError::Cancelled(what))
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Import run failed");
                self.emit(CoreEvent::Import(ImportEvent::Failed {
                    run_id,
                    message: e.to_string(),
                    items_processed: state.processed,
                }));
                Err(e)
            }
        }
    }

    async fn run_locked(
        &self,
        import: &MediaImport,
        input: RunInput,
        run_id: &str,
        token: &CancellationToken,
        state: &mut RunState,
    ) -> Result<()> {
        let handlers = self.handlers_for(import)?;
        let tx = self.begin().await?;
        let mut ctx = SyncContext::new(run_id);

        match self
            .apply(import, &handlers, input, &mut ctx, token, state)
            .await
        {
            Ok(()) => tx.commit().await?,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                return Err(e);
            }
        }

        for event in state.pending_events.drain(..) {
            self.event_bus.emit(CoreEvent::Library(event)).ok();
        }

        if self.config.cleanup_enabled {
            state.report.cleanup = self.cleanup(import, &handlers).await?;
        }
        Ok(())
    }

    async fn apply(
        &self,
        import: &MediaImport,
        handlers: &[Arc<dyn ImportHandler>],
        input: RunInput,
        ctx: &mut SyncContext,
        token: &CancellationToken,
        state: &mut RunState,
    ) -> Result<()> {
        for handler in handlers {
            handler.start_synchronisation(import, ctx).await?;
        }

        let mut changesets = match input {
            RunInput::Full(items) => self.full_changeset(import, handlers, items, state).await?,
            RunInput::Partial(changes) => {
                self.partial_changeset(import, handlers, changes, state).await?
            }
        };
        state.report.unchanged = changesets.values().map(|c| c.unchanged).sum();
        state.processed += state.report.unchanged;

        for handler in handlers {
            let upserts = changesets
                .get_mut(&handler.media_type())
                .map(|changeset| std::mem::take(&mut changeset.upserts))
                .unwrap_or_default();

            for mut entry in upserts {
                self.check_cancelled(import, token)?;
                let outcome = match entry.changeset {
                    ChangesetType::Added => {
                        handler.add_imported_item(import, &mut entry.item, ctx).await
                    }
                    _ => handler.update_imported_item(import, &mut entry.item, ctx).await,
                };
                self.settle(handler.as_ref(), import, entry.changeset, &entry.item, outcome, state)?;
            }
        }

        for handler in handlers.iter().rev() {
            let removals = changesets
                .get_mut(&handler.media_type())
                .map(|changeset| std::mem::take(&mut changeset.removals))
                .unwrap_or_default();

            for item in removals {
                self.check_cancelled(import, token)?;
                let outcome = handler.remove_imported_item(import, &item, ctx).await;
                self.settle(handler.as_ref(), import, ChangesetType::Removed, &item, outcome, state)?;
            }
        }

        for handler in handlers {
            handler.finish_synchronisation(import, ctx).await?;
            if self.config.enable_items_on_finish {
                handler.set_imported_items_enabled(import, true).await?;
            }
        }
        Ok(())
    }

    /// Books the outcome of one item. Only structural failures escape.
    fn settle(
        &self,
        handler: &dyn ImportHandler,
        import: &MediaImport,
        changeset: ChangesetType,
        item: &MediaItem,
        outcome: Result<()>,
        state: &mut RunState,
    ) -> Result<()> {
        state.processed += 1;
        let label = handler.item_label(item);

        match outcome {
            Ok(()) => {
                let media_type = item.media_type.to_string();
                let event = match changeset {
                    ChangesetType::Added => {
                        state.report.added += 1;
                        LibraryEvent::ItemAdded {
                            media_type,
                            item_id: item.id,
                            label,
                        }
                    }
                    ChangesetType::Removed => {
                        state.report.removed += 1;
                        LibraryEvent::ItemRemoved {
                            media_type,
                            item_id: item.id,
                            label,
                        }
                    }
                    _ => {
                        state.report.updated += 1;
                        LibraryEvent::ItemUpdated {
                            media_type,
                            item_id: item.id,
                            label,
                        }
                    }
                };
                state.pending_events.push(event);
            }
            Err(e) if e.is_structural() => {
                error!(
                    item = %label,
                    import = %import,
                    changeset = %changeset,
                    error = %e,
                    "Structural failure, aborting run"
                );
                return Err(e);
            }
            Err(e) => {
                state.report.failed += 1;
                warn!(
                    item = %label,
                    import = %import,
                    changeset = %changeset,
                    error = %e,
                    "Failed to apply item, skipping"
                );
            }
        }

        if state.processed % self.config.progress_interval.max(1) == 0
            || state.processed == state.total
        {
            let percent = if state.total == 0 {
                100
            } else {
                ((state.processed * 100) / state.total).min(100) as u8
            };
            self.emit(CoreEvent::Import(ImportEvent::Progress {
                run_id: state.report.run_id.clone(),
                items_processed: state.processed,
                total_items: state.total,
                percent,
                phase: "apply".to_string(),
            }));
        }
        Ok(())
    }

    fn check_cancelled(&self, import: &MediaImport, token: &CancellationToken) -> Result<()> {
        if token.is_cancelled() {
            return Err(SyncError::Cancelled(import.to_string()));
        }
        Ok(())
    }

    /// Changeset of a full run: everything the source reports is matched
    /// against the local items; local items nobody claimed are removed.
    async fn full_changeset(
        &self,
        import: &MediaImport,
        handlers: &[Arc<dyn ImportHandler>],
        items: Vec<MediaItem>,
        state: &mut RunState,
    ) -> Result<HashMap<MediaType, TypeChangeset>> {
        let mut incoming_by_type = self.group_by_type(import, items, state);
        let update_imported = import.settings.update_imported_items().unwrap_or(true);
        let mut changesets = HashMap::new();

        for handler in handlers {
            let media_type = handler.media_type();
            let mut remaining = handler.local_items(import).await?;
            let incoming = incoming_by_type.remove(&media_type).unwrap_or_default();
            let mut changeset = TypeChangeset::default();

            for mut item in incoming {
                let Some(index) = matched_index(handler.as_ref(), &item, &remaining) else {
                    changeset.upserts.push(ChangesetItem::added(item));
                    continue;
                };
                let mut local = remaining.remove(index);

                if !update_imported {
                    changeset.unchanged += 1;
                    continue;
                }
                match self.classify(handler.as_ref(), import, &mut local, &item).await {
                    ChangesetType::None => changeset.unchanged += 1,
                    classified => {
                        handler.prepare_imported_item(import, &mut item, &local);
                        changeset.upserts.push(ChangesetItem::new(classified, item));
                    }
                }
            }

            if media_type.is_folder() {
                // parents may stand for children the source still reports;
                // cleanup decides on them from their child counts
                if !remaining.is_empty() {
                    debug!(
                        media_type = %media_type,
                        parents = remaining.len(),
                        "Parents not reported by the source, leaving them to cleanup"
                    );
                }
            } else {
                changeset.removals = remaining;
            }
            debug!(
                media_type = %media_type,
                upserts = changeset.upserts.len(),
                removals = changeset.removals.len(),
                unchanged = changeset.unchanged,
                "Changeset computed"
            );
            changesets.insert(media_type, changeset);
        }

        state.total = changesets
            .values()
            .map(|c| (c.upserts.len() + c.removals.len()) as u64 + c.unchanged)
            .sum::<u64>()
            + state.report.failed;
        Ok(changesets)
    }

    /// Changeset of a partial run: the source already says what changed;
    /// its claims are checked against the local items.
    async fn partial_changeset(
        &self,
        import: &MediaImport,
        handlers: &[Arc<dyn ImportHandler>],
        changes: Vec<ChangesetItem>,
        state: &mut RunState,
    ) -> Result<HashMap<MediaType, TypeChangeset>> {
        let mut changes_by_type: HashMap<MediaType, Vec<ChangesetItem>> = HashMap::new();
        for change in changes {
            if import.contains(change.item.media_type) {
                changes_by_type
                    .entry(change.item.media_type)
                    .or_default()
                    .push(change);
            } else {
                warn!(
                    item = %change.item.title(),
                    media_type = %change.item.media_type,
                    "Item type not covered by import, skipping"
                );
                state.report.failed += 1;
            }
        }

        let update_imported = import.settings.update_imported_items().unwrap_or(true);
        let mut changesets = HashMap::new();

        for handler in handlers {
            let media_type = handler.media_type();
            let changes = changes_by_type.remove(&media_type).unwrap_or_default();
            let mut changeset = TypeChangeset::default();
            if changes.is_empty() {
                changesets.insert(media_type, changeset);
                continue;
            }
            let locals = handler.local_items(import).await?;

            for ChangesetItem { changeset: claimed, mut item } in changes {
                let Some(index) = matched_index(handler.as_ref(), &item, &locals) else {
                    match claimed {
                        ChangesetType::Changed | ChangesetType::Removed => warn!(
                            item = %handler.item_label(&item),
                            changeset = %claimed,
                            "No local item for reported change, dropping"
                        ),
                        ChangesetType::Added | ChangesetType::None => {
                            changeset.upserts.push(ChangesetItem::added(item))
                        }
                    }
                    continue;
                };
                let mut local = locals[index].clone();

                if claimed == ChangesetType::Removed {
                    changeset.removals.push(local);
                    continue;
                }
                if !update_imported {
                    changeset.unchanged += 1;
                    continue;
                }
                match self.classify(handler.as_ref(), import, &mut local, &item).await {
                    ChangesetType::None => changeset.unchanged += 1,
                    _ => {
                        handler.prepare_imported_item(import, &mut item, &local);
                        changeset.upserts.push(ChangesetItem::changed(item));
                    }
                }
            }
            changesets.insert(media_type, changeset);
        }

        state.total = changesets
            .values()
            .map(|c| (c.upserts.len() + c.removals.len()) as u64 + c.unchanged)
            .sum::<u64>()
            + state.report.failed;
        Ok(changesets)
    }

    fn group_by_type(
        &self,
        import: &MediaImport,
        items: Vec<MediaItem>,
        state: &mut RunState,
    ) -> HashMap<MediaType, Vec<MediaItem>> {
        let mut by_type: HashMap<MediaType, Vec<MediaItem>> = HashMap::new();
        for item in items {
            if import.contains(item.media_type) {
                by_type.entry(item.media_type).or_default().push(item);
            } else {
                warn!(
                    item = %item.title(),
                    media_type = %item.media_type,
                    "Item type not covered by import, skipping"
                );
                state.report.failed += 1;
            }
        }
        by_type
    }

    /// Completes `local` through the details loader and classifies the pair.
    async fn classify(
        &self,
        handler: &dyn ImportHandler,
        import: &MediaImport,
        local: &mut MediaItem,
        incoming: &MediaItem,
    ) -> ChangesetType {
        if let Some(loader) = &self.details_loader {
            if let Err(e) = loader.load_details(local).await {
                warn!(
                    item = %handler.item_label(local),
                    error = %e,
                    "Failed to load local details, comparing available fields"
                );
            }
        }
        handler.determine_changeset(import, local, incoming)
    }

    /// Cleanup pass, children first, one transaction per media type.
    async fn cleanup(
        &self,
        import: &MediaImport,
        handlers: &[Arc<dyn ImportHandler>],
    ) -> Result<CleanupStats> {
        let mut total = CleanupStats::default();

        for handler in handlers.iter().rev() {
            let tx = self.begin().await?;
            let result = async {
                let stats = handler.cleanup_imported_items(import).await?;
                if self.config.enable_items_on_finish {
                    handler.set_imported_items_enabled(import, true).await?;
                }
                Ok::<_, SyncError>(stats)
            }
            .await;

            match result {
                Ok(stats) => {
                    tx.commit().await?;
                    total.deleted += stats.deleted;
                    total.unlinked += stats.unlinked;
                    total.skipped += stats.skipped;
                }
                Err(e) => {
                    error!(media_type = %handler.media_type(), error = %e, "Cleanup failed");
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, "Rollback failed");
                    }
                    return Err(e);
                }
            }
        }
        Ok(total)
    }

    fn emit(&self, event: CoreEvent) {
        self.event_bus.emit(event).ok();
    }
}

fn matched_index(
    handler: &dyn ImportHandler,
    item: &MediaItem,
    locals: &[MediaItem],
) -> Option<usize> {
    let matched = handler.find_matching_local_item(item, locals)?;
    locals
        .iter()
        .position(|candidate| std::ptr::eq(candidate, matched))
}
