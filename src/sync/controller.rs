use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::pending::{PendingKind, PendingOperation};
use super::{MutationTicket, Settled, SyncEvent, SyncSettings, SyncState};
use crate::category::{
    build, derive_forest, filter_by, matches, root_ids, sort, validate, visible_rows, CategoryId,
    CategoryNode, CategoryPatch, CategoryRecord, ExpansionSet, NewCategory, SortKey, SortOrder,
    TreeRow,
};
use crate::error::{CategoryError, ValidationError};
use crate::store::{ListParams, RecordStore};
use crate::util::MAX_SEARCH_TERM_LENGTH;

/// Capacity of the background event channel.
const EVENT_CHANNEL_SIZE: usize = 64;

/// State of one category list view, kept in sync with a [`RecordStore`].
///
/// Single owner, no locks: store calls run on spawned tasks and report back
/// through a channel that [`pump`](Self::pump) drains. The flat record list is
/// only ever replaced wholesale.
///
/// Fetch results are matched against `fetch_generation`. Issuing a fetch
/// cancels the previous one and bumps the generation, so a late answer to an
/// older request can never overwrite a newer one, whatever order they
/// complete in.
pub struct SyncController {
    store: Arc<dyn RecordStore>,
    settings: SyncSettings,

    state: SyncState,
    /// Flat records wrapped in Arc for O(1) handout to readers.
    /// Mutations build a new Vec and wrap it in a new Arc.
    records: Arc<Vec<CategoryRecord>>,
    /// True once any fetch has succeeded.
    loaded: bool,
    last_error: Option<CategoryError>,
    mounted: bool,

    // Parameters
    search_term: String,
    pending_search: Option<String>,
    search_deadline: Option<Instant>,
    sort: SortKey,
    order: SortOrder,
    expansion: ExpansionSet,
    /// Ids the store matched for the committed term, when search is forwarded.
    /// `records` keeps the last unfiltered list so hits still find their ancestors.
    search_hits: Option<HashSet<CategoryId>>,

    // In-flight fetch
    fetch_generation: u64,
    fetch_cancel: Option<CancellationToken>,
    fetch_handle: Option<JoinHandle<()>>,
    /// Search term sent with the in-flight fetch, if any.
    fetch_search: Option<String>,

    // In-flight mutations, keyed by correlation id
    pending: BTreeMap<u64, PendingOperation>,
    next_correlation: u64,

    /// Forest derived from records + sort + search. Invalidated on any change.
    cached_forest: Option<Arc<Vec<CategoryNode>>>,

    event_tx: mpsc::Sender<SyncEvent>,
    event_rx: mpsc::Receiver<SyncEvent>,
}

impl SyncController {
    pub fn new(store: Arc<dyn RecordStore>, settings: SyncSettings) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        Self {
            store,
            sort: settings.sort,
            order: settings.order,
            settings,
            state: SyncState::Idle,
            records: Arc::new(Vec::new()),
            loaded: false,
            last_error: None,
            mounted: false,
            search_term: String::new(),
            pending_search: None,
            search_deadline: None,
            expansion: ExpansionSet::new(),
            search_hits: None,
            fetch_generation: 0,
            fetch_cancel: None,
            fetch_handle: None,
            fetch_search: None,
            pending: BTreeMap::new(),
            next_correlation: 0,
            cached_forest: None,
            event_tx,
            event_rx,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the subscription with an initial fetch. No-op when already mounted.
    pub fn mount(&mut self) {
        if self.mounted {
            return;
        }
        self.mounted = true;
        self.issue_fetch();
    }

    /// Stop the subscription. The running fetch is cancelled and every result
    /// still on its way, fetch or mutation, is ignored. Local records are kept.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        if let Some(token) = self.fetch_cancel.take() {
            token.cancel();
        }
        if let Some(handle) = self.fetch_handle.take() {
            handle.abort();
            tracing::debug!(generation = self.fetch_generation, "Aborted fetch task on unmount");
        }
        self.fetch_generation = self.fetch_generation.wrapping_add(1);
        self.pending.clear();
        self.pending_search = None;
        self.search_deadline = None;
        self.state = SyncState::Idle;
    }

    /// Re-fetch with the current parameters. Also used to retry after an error.
    pub fn refresh(&mut self) {
        self.mounted = true;
        self.issue_fetch();
    }

    // ========================================================================
    // Event Loop
    // ========================================================================

    /// Wait for one thing to happen and apply it: a background result arriving
    /// or the search debounce elapsing.
    pub async fn pump(&mut self) {
        let deadline = self.search_deadline;
        tokio::select! {
            Some(event) = self.event_rx.recv() => self.handle_event(event),
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                self.tick();
            }
            else => {}
        }
    }

    /// Pump until no fetch, debounce or mutation is outstanding.
    pub async fn settle(&mut self) {
        while self.is_busy() {
            self.pump().await;
        }
    }

    pub fn is_busy(&self) -> bool {
        self.fetch_handle.is_some() || self.search_deadline.is_some() || !self.pending.is_empty()
    }

    /// Apply a debounced search once its quiet period has passed.
    /// Returns true when a new term was committed.
    pub fn tick(&mut self) -> bool {
        match self.search_deadline {
            Some(deadline) if Instant::now() >= deadline => self.search_deadline = None,
            _ => return false,
        }
        let Some(term) = self.pending_search.take() else {
            return false;
        };
        if term.trim() == self.search_term.trim() {
            tracing::debug!(term = %term, "Search term unchanged after debounce");
            return false;
        }

        tracing::debug!(term = %term, "Committing debounced search");
        self.search_term = term;
        self.search_hits = None;
        self.invalidate_forest();
        if self.mounted {
            self.issue_fetch();
        }
        true
    }

    pub fn handle_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::FetchCompleted { generation, result } => {
                self.handle_fetch_completed(generation, result)
            }
            SyncEvent::MutationSettled {
                correlation,
                outcome,
            } => self.handle_mutation_settled(correlation, outcome),
        }
    }

    fn handle_fetch_completed(
        &mut self,
        generation: u64,
        result: Result<Vec<CategoryRecord>, CategoryError>,
    ) {
        if generation != self.fetch_generation {
            tracing::debug!(
                expected = self.fetch_generation,
                got = generation,
                "Ignoring stale fetch result (generation mismatch)"
            );
            return;
        }
        self.fetch_cancel = None;
        self.fetch_handle = None;

        match result {
            Ok(mut records) => {
                let fetched = records.len();
                match self.fetch_search.take() {
                    Some(term) => {
                        // Only the hits came back: refresh them in place and keep
                        // everything else, so ancestors and expansion survive.
                        let hits: HashSet<CategoryId> =
                            records.iter().map(|r| r.id.clone()).collect();
                        let mut merged = (*self.records).clone();
                        for hit in records {
                            match merged.iter_mut().find(|r| r.id == hit.id) {
                                Some(slot) => *slot = hit,
                                None => merged.push(hit),
                            }
                        }
                        for op in self.pending.values() {
                            op.apply_to(&mut merged);
                        }
                        tracing::debug!(
                            generation,
                            term = %term,
                            hits = hits.len(),
                            "Search hits received"
                        );
                        self.search_hits = Some(hits);
                        self.set_records(merged);
                    }
                    None => {
                        // The store may not reflect mutations still in flight
                        for op in self.pending.values() {
                            op.apply_to(&mut records);
                        }
                        self.expansion =
                            self.expansion.retain_present(records.iter().map(|r| &r.id));
                        self.search_hits = None;
                        self.set_records(records);
                    }
                }
                self.loaded = true;
                self.last_error = None;
                self.state = SyncState::Ready;
                tracing::debug!(
                    generation,
                    fetched,
                    pending = self.pending.len(),
                    "Categories loaded"
                );
            }
            Err(CategoryError::Cancelled) => {
                tracing::debug!(generation, "Fetch cancelled by store");
                self.state = self.resting_state();
            }
            Err(e) => {
                tracing::warn!(generation, error = %e, "Category fetch failed, keeping last records");
                self.last_error = Some(e);
                self.state = SyncState::Error;
            }
        }
    }

    fn handle_mutation_settled(&mut self, correlation: u64, outcome: Result<Settled, CategoryError>) {
        let Some(op) = self.pending.remove(&correlation) else {
            tracing::debug!(correlation, "Ignoring settlement for unknown operation");
            return;
        };

        match outcome {
            Ok(Settled::Created(record)) => {
                let mut records = (*self.records).clone();
                if let PendingKind::Create(provisional) = &op.kind {
                    if self.expansion.is_expanded(&provisional.id) {
                        self.expansion = self
                            .expansion
                            .without(&provisional.id)
                            .with(record.id.clone());
                    }
                    records.retain(|r| r.id != record.id || r.id == provisional.id);
                    match records.iter_mut().find(|r| r.id == provisional.id) {
                        Some(slot) => *slot = record,
                        None => records.push(record),
                    }
                }
                self.set_records(records);
                tracing::debug!(correlation, "Create confirmed");
            }
            Ok(Settled::Updated(record)) => {
                let mut records = (*self.records).clone();
                if let Some(slot) = records.iter_mut().find(|r| r.id == record.id) {
                    *slot = record;
                }
                // Later edits to the same record are still in flight
                for later in self.pending.values() {
                    later.apply_to(&mut records);
                }
                self.set_records(records);
                tracing::debug!(correlation, "Update confirmed");
            }
            Ok(Settled::Removed(ids)) => {
                tracing::debug!(correlation, count = ids.len(), "Delete confirmed");
            }
            Err(e) => {
                // No rollback: the follow-up refresh (or the caller) reconciles.
                tracing::warn!(correlation, error = %e, "Mutation failed, keeping optimistic state");
            }
        }

        if self.settings.refresh_after_mutation && self.mounted {
            self.issue_fetch();
        }
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Record a search edit. The fetch is issued once no further edit arrives
    /// within the debounce window.
    pub fn search(&mut self, term: &str) {
        if term.len() > MAX_SEARCH_TERM_LENGTH {
            tracing::warn!(
                len = term.len(),
                max = MAX_SEARCH_TERM_LENGTH,
                "Search term too long, ignoring"
            );
            return;
        }
        self.pending_search = Some(term.to_string());
        self.search_deadline = Some(Instant::now() + self.settings.search_debounce);
    }

    pub fn set_sort(&mut self, key: SortKey, order: SortOrder) {
        if (key, order) == (self.sort, self.order) {
            return;
        }
        self.sort = key;
        self.order = order;
        self.invalidate_forest();
        if self.mounted {
            self.issue_fetch();
        }
    }

    pub fn toggle_expand(&mut self, id: &CategoryId) {
        self.expansion = self.expansion.toggle(id);
    }

    /// Expand every root of the current forest.
    pub fn expand_all(&mut self) {
        let roots = root_ids(&self.forest());
        self.expansion = ExpansionSet::expand_all(roots);
    }

    pub fn collapse_all(&mut self) {
        self.expansion = ExpansionSet::collapse_all();
    }

    /// Whether every root of the current forest is expanded.
    pub fn all_expanded(&mut self) -> bool {
        let roots = root_ids(&self.forest());
        self.expansion.all_expanded(&roots)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Create a category. The provisional record appears immediately under a
    /// [`CategoryId::Provisional`] id and is swapped for the stored record
    /// once the store confirms.
    pub fn create(
        &mut self,
        draft: NewCategory,
    ) -> Result<MutationTicket<CategoryRecord>, CategoryError> {
        let name = validate::sanitize_name(&draft.name)?;
        validate::check_parent(&self.records, None, draft.parent_id.as_ref())?;
        let draft = NewCategory { name, ..draft };

        let correlation = self.next_correlation();
        let provisional = draft.to_provisional(CategoryId::Provisional(correlation), Utc::now());
        self.begin(correlation, PendingKind::Create(provisional));

        let store = Arc::clone(&self.store);
        Ok(self.spawn_mutation(
            correlation,
            async move { store.create(draft).await },
            |record: &CategoryRecord| Settled::Created(record.clone()),
        ))
    }

    pub fn update(
        &mut self,
        id: &CategoryId,
        mut patch: CategoryPatch,
    ) -> Result<MutationTicket<CategoryRecord>, CategoryError> {
        if self.record(id).is_none() {
            return Err(ValidationError::UnknownCategory(id.clone()).into());
        }
        if id.is_provisional() {
            return Err(ValidationError::Unsaved(id.clone()).into());
        }
        if let Some(name) = patch.name.take() {
            patch.name = Some(validate::sanitize_name(&name)?);
        }
        if let Some(parent) = &patch.parent_id {
            validate::check_parent(&self.records, Some(id), parent.as_ref())?;
        }

        let correlation = self.next_correlation();
        self.begin(
            correlation,
            PendingKind::Update {
                id: id.clone(),
                patch: patch.clone(),
            },
        );

        let store = Arc::clone(&self.store);
        let target = id.clone();
        Ok(self.spawn_mutation(
            correlation,
            async move { store.update(target, patch).await },
            |record: &CategoryRecord| Settled::Updated(record.clone()),
        ))
    }

    /// Delete one category. Refused locally while it still holds products.
    pub fn remove(&mut self, id: &CategoryId) -> Result<MutationTicket<()>, CategoryError> {
        let record = self
            .record(id)
            .ok_or_else(|| ValidationError::UnknownCategory(id.clone()))?;
        if let Err(e) = validate::check_deletable(record) {
            tracing::debug!(id = %id, error = %e, "Delete refused locally");
            return Err(e.into());
        }

        let correlation = self.next_correlation();
        self.begin(correlation, PendingKind::Remove(vec![id.clone()]));

        let store = Arc::clone(&self.store);
        let target = id.clone();
        let settled = vec![id.clone()];
        Ok(self.spawn_mutation(
            correlation,
            async move { store.remove(target).await },
            move |_: &()| Settled::Removed(settled),
        ))
    }

    /// Delete several categories. If any target holds products the whole batch
    /// is refused before a single delete is sent. The ticket reports the first
    /// failure among the individual deletes.
    pub fn remove_many(&mut self, ids: &[CategoryId]) -> Result<MutationTicket<()>, CategoryError> {
        let mut targets: Vec<CategoryId> = Vec::with_capacity(ids.len());
        match validate::check_bulk_deletable(&self.records, ids) {
            Ok(records) => {
                for record in records {
                    if !targets.contains(&record.id) {
                        targets.push(record.id.clone());
                    }
                }
            }
            Err(e) => {
                tracing::debug!(count = ids.len(), error = %e, "Bulk delete refused locally");
                return Err(e.into());
            }
        }

        let correlation = self.next_correlation();
        self.begin(correlation, PendingKind::Remove(targets.clone()));

        let store = Arc::clone(&self.store);
        let batch = targets.clone();
        Ok(self.spawn_mutation(
            correlation,
            async move {
                let removals = batch.into_iter().map(|id| store.remove(id));
                futures::future::join_all(removals)
                    .await
                    .into_iter()
                    .collect::<Result<Vec<()>, _>>()
                    .map(|_| ())
            },
            move |_: &()| Settled::Removed(targets),
        ))
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// The records after build, sort and search filtering. Cached until
    /// records or parameters change.
    pub fn forest(&mut self) -> Arc<Vec<CategoryNode>> {
        if let Some(cached) = &self.cached_forest {
            return Arc::clone(cached);
        }
        let forest = match &self.search_hits {
            // Local matches count too, so optimistic edits stay visible.
            Some(hits) => Arc::new(filter_by(
                sort(build(&self.records), self.sort, self.order),
                |record| hits.contains(&record.id) || matches(record, &self.search_term),
            )),
            None => Arc::new(derive_forest(
                &self.records,
                self.sort,
                self.order,
                &self.search_term,
            )),
        };
        self.cached_forest = Some(Arc::clone(&forest));
        forest
    }

    /// Display rows. While searching, every retained node is shown expanded.
    pub fn visible_rows(&mut self) -> Vec<TreeRow> {
        let forest = self.forest();
        visible_rows(&forest, &self.expansion, self.is_searching())
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == SyncState::Loading
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Error from the latest fetch, kept until a fetch succeeds.
    pub fn last_error(&self) -> Option<&CategoryError> {
        self.last_error.as_ref()
    }

    pub fn records(&self) -> Arc<Vec<CategoryRecord>> {
        Arc::clone(&self.records)
    }

    pub fn record(&self, id: &CategoryId) -> Option<&CategoryRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    /// The committed (debounced) search term.
    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn is_searching(&self) -> bool {
        !self.search_term.trim().is_empty()
    }

    pub fn sort(&self) -> (SortKey, SortOrder) {
        (self.sort, self.order)
    }

    pub fn expansion(&self) -> &ExpansionSet {
        &self.expansion
    }

    pub fn pending_operations(&self) -> impl Iterator<Item = &PendingOperation> {
        self.pending.values()
    }

    pub fn generation(&self) -> u64 {
        self.fetch_generation
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn issue_fetch(&mut self) {
        if let Some(token) = self.fetch_cancel.take() {
            token.cancel();
            tracing::debug!(generation = self.fetch_generation, "Cancelled superseded fetch");
        }

        self.fetch_generation = self.fetch_generation.wrapping_add(1);
        let generation = self.fetch_generation;
        let cancel = CancellationToken::new();
        self.fetch_cancel = Some(cancel.clone());
        self.state = SyncState::Loading;

        let params = self.list_params();
        self.fetch_search = params.search.clone();
        let store = Arc::clone(&self.store);
        let tx = self.event_tx.clone();

        tracing::debug!(generation, search = ?params.search, "Spawning category fetch");

        self.fetch_handle = Some(tokio::spawn(async move {
            let result = store.list(params, cancel).await;
            let event = SyncEvent::FetchCompleted { generation, result };
            if tx.send(event).await.is_err() {
                tracing::debug!(generation, "Fetch result dropped (controller gone)");
            }
        }));
    }

    fn list_params(&self) -> ListParams {
        let term = self.search_term.trim();
        ListParams {
            search: (self.settings.forward_search && !term.is_empty()).then(|| term.to_string()),
            sort: Some(self.sort),
            order: Some(self.order),
        }
    }

    /// State to fall back to when a request ends without news.
    fn resting_state(&self) -> SyncState {
        if self.last_error.is_some() {
            SyncState::Error
        } else if self.loaded {
            SyncState::Ready
        } else {
            SyncState::Idle
        }
    }

    fn next_correlation(&mut self) -> u64 {
        self.next_correlation = self.next_correlation.wrapping_add(1);
        self.next_correlation
    }

    /// Apply an operation optimistically and track it until the store answers.
    fn begin(&mut self, correlation: u64, kind: PendingKind) {
        let op = PendingOperation { correlation, kind };
        let mut records = (*self.records).clone();
        op.apply_to(&mut records);
        self.set_records(records);
        self.pending.insert(correlation, op);
    }

    fn spawn_mutation<T, F, S>(&self, correlation: u64, call: F, settle: S) -> MutationTicket<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, CategoryError>> + Send + 'static,
        S: FnOnce(&T) -> Settled + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let tx = self.event_tx.clone();

        tracing::debug!(correlation, "Spawning mutation");

        tokio::spawn(async move {
            let result = call.await;
            let outcome = match &result {
                Ok(value) => Ok(settle(value)),
                Err(e) => Err(e.clone()),
            };
            // The caller may have dropped the ticket
            let _ = reply_tx.send(result);
            let event = SyncEvent::MutationSettled {
                correlation,
                outcome,
            };
            if tx.send(event).await.is_err() {
                tracing::debug!(correlation, "Mutation settled after controller was dropped");
            }
        });

        MutationTicket {
            correlation,
            reply: reply_rx,
        }
    }

    fn set_records(&mut self, records: Vec<CategoryRecord>) {
        self.records = Arc::new(records);
        self.invalidate_forest();
    }

    fn invalidate_forest(&mut self) {
        self.cached_forest = None;
    }
}

/// Abort the in-flight fetch when the controller goes away.
impl Drop for SyncController {
    fn drop(&mut self) {
        if let Some(token) = self.fetch_cancel.take() {
            token.cancel();
        }
        if let Some(handle) = self.fetch_handle.take() {
            handle.abort();
            tracing::debug!("Aborted fetch task on controller drop");
        }
    }
}
