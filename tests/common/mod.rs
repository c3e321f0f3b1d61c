//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use stockroom::category::{CategoryId, CategoryPatch, CategoryRecord, NewCategory};
use stockroom::error::CategoryError;
use stockroom::store::{until_cancelled, ListParams, RecordStore};

type ListReply = Result<Vec<CategoryRecord>, CategoryError>;

/// In-memory store with scriptable timing and failures.
///
/// When lists are held, every `list` call parks until the test releases it by
/// call index with the reply of its choice. Held mutations park until released
/// and then behave normally.
#[derive(Default)]
pub struct ScriptedStore {
    records: Mutex<Vec<CategoryRecord>>,
    next_id: Mutex<i64>,

    hold_lists: Mutex<bool>,
    filter_lists: Mutex<bool>,
    ignore_cancel: Mutex<bool>,
    list_gates: Mutex<Vec<Option<oneshot::Sender<ListReply>>>>,
    list_calls: Mutex<Vec<ListParams>>,
    list_failures: Mutex<VecDeque<CategoryError>>,

    hold_mutations: Mutex<bool>,
    mutation_gates: Mutex<Vec<Option<oneshot::Sender<()>>>>,
    mutation_failures: Mutex<VecDeque<CategoryError>>,
    creates: Mutex<Vec<NewCategory>>,
    updates: Mutex<Vec<(CategoryId, CategoryPatch)>>,
    removes: Mutex<Vec<CategoryId>>,
}

impl ScriptedStore {
    pub fn with_records(records: Vec<CategoryRecord>) -> Self {
        let store = Self::default();
        *store.records.lock().unwrap() = records;
        *store.next_id.lock().unwrap() = 100;
        store
    }

    pub fn records(&self) -> Vec<CategoryRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn hold_lists(&self, hold: bool) {
        *self.hold_lists.lock().unwrap() = hold;
    }

    /// Answer searched lists with only the records whose name contains the
    /// term, as a server that filters on its side would.
    pub fn filter_lists(&self, filter: bool) {
        *self.filter_lists.lock().unwrap() = filter;
    }

    /// Keep running a held list even after its token fires, as a store that
    /// cannot abort an in-flight request would.
    pub fn ignore_cancel(&self, ignore: bool) {
        *self.ignore_cancel.lock().unwrap() = ignore;
    }

    pub fn hold_mutations(&self, hold: bool) {
        *self.hold_mutations.lock().unwrap() = hold;
    }

    pub fn fail_next_list(&self, err: CategoryError) {
        self.list_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_next_mutation(&self, err: CategoryError) {
        self.mutation_failures.lock().unwrap().push_back(err);
    }

    /// Answer the held list call with index `call`. Calls whose task is gone
    /// are ignored.
    pub fn release_list(&self, call: usize, reply: ListReply) {
        let gate = self
            .list_gates
            .lock()
            .unwrap()
            .get_mut(call)
            .and_then(Option::take);
        if let Some(gate) = gate {
            let _ = gate.send(reply);
        }
    }

    pub fn release_mutation(&self, call: usize) {
        let gate = self
            .mutation_gates
            .lock()
            .unwrap()
            .get_mut(call)
            .and_then(Option::take);
        if let Some(gate) = gate {
            let _ = gate.send(());
        }
    }

    pub fn list_calls(&self) -> Vec<ListParams> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn list_call_count(&self) -> usize {
        self.list_calls.lock().unwrap().len()
    }

    pub fn mutation_call_count(&self) -> usize {
        self.mutation_gates.lock().unwrap().len()
    }

    pub fn creates(&self) -> Vec<NewCategory> {
        self.creates.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(CategoryId, CategoryPatch)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn removes(&self) -> Vec<CategoryId> {
        self.removes.lock().unwrap().clone()
    }

    /// Yield until `n` list calls have reached the store.
    pub async fn wait_for_lists(&self, n: usize) {
        for _ in 0..10_000 {
            if self.list_call_count() >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {} list calls, saw {}", n, self.list_call_count());
    }

    /// Yield until `n` mutations have reached the store.
    pub async fn wait_for_mutations(&self, n: usize) {
        for _ in 0..10_000 {
            if self.mutation_call_count() >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {} mutations, saw {}", n, self.mutation_call_count());
    }

    async fn enter_mutation(&self) -> Result<(), CategoryError> {
        let gate = {
            let mut gates = self.mutation_gates.lock().unwrap();
            if *self.hold_mutations.lock().unwrap() {
                let (tx, rx) = oneshot::channel();
                gates.push(Some(tx));
                Some(rx)
            } else {
                gates.push(None);
                None
            }
        };
        if let Some(rx) = gate {
            let _ = rx.await;
        }
        match self.mutation_failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RecordStore for ScriptedStore {
    async fn list(
        &self,
        params: ListParams,
        cancel: CancellationToken,
    ) -> Result<Vec<CategoryRecord>, CategoryError> {
        let search = params
            .search
            .clone()
            .filter(|_| *self.filter_lists.lock().unwrap())
            .map(|term| term.to_lowercase());
        let gate = {
            let mut gates = self.list_gates.lock().unwrap();
            self.list_calls.lock().unwrap().push(params);
            if *self.hold_lists.lock().unwrap() {
                let (tx, rx) = oneshot::channel();
                gates.push(Some(tx));
                Some(rx)
            } else {
                gates.push(None);
                None
            }
        };
        let failure = self.list_failures.lock().unwrap().pop_front();
        let ignore_cancel = *self.ignore_cancel.lock().unwrap();

        let reply = async {
            if let Some(rx) = gate {
                return rx.await.unwrap_or(Err(CategoryError::Cancelled));
            }
            match failure {
                Some(err) => Err(err),
                None => Ok(self
                    .records()
                    .into_iter()
                    .filter(|r| {
                        search
                            .as_deref()
                            .map_or(true, |term| r.name.to_lowercase().contains(term))
                    })
                    .collect()),
            }
        };

        if ignore_cancel {
            reply.await
        } else {
            until_cancelled(&cancel, reply).await
        }
    }

    async fn create(&self, draft: NewCategory) -> Result<CategoryRecord, CategoryError> {
        self.creates.lock().unwrap().push(draft.clone());
        self.enter_mutation().await?;

        let id = {
            let mut next = self.next_id.lock().unwrap();
            let id = *next;
            *next += 1;
            id
        };
        let mut record = CategoryRecord::new(id, draft.name);
        record.parent_id = draft.parent_id;
        record.description = draft.description;
        record.product_count = Some(0);
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> Result<CategoryRecord, CategoryError> {
        self.updates.lock().unwrap().push((id.clone(), patch.clone()));
        self.enter_mutation().await?;

        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| CategoryError::Conflict(format!("Category {} not found", id)))?;
        record.apply(&patch);
        Ok(record.clone())
    }

    async fn remove(&self, id: CategoryId) -> Result<(), CategoryError> {
        self.removes.lock().unwrap().push(id.clone());
        self.enter_mutation().await?;

        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.iter().find(|r| r.id == id) {
            if record.products() > 0 {
                return Err(CategoryError::Conflict(format!(
                    "Category '{}' is in use",
                    record.name
                )));
            }
        }
        records.retain(|r| r.id != id);
        Ok(())
    }
}

/// The sample hierarchy used across tests:
///
/// ```text
/// Electronics (1)
///   Phones (2, 3 products)
///     Cases (5)
///   Laptops (3, 7 products)
/// Garden (4)
/// ```
pub fn sample_records() -> Vec<CategoryRecord> {
    vec![
        CategoryRecord::new(1, "Electronics"),
        CategoryRecord::new(2, "Phones").with_parent(1).with_products(3),
        CategoryRecord::new(3, "Laptops").with_parent(1).with_products(7),
        CategoryRecord::new(4, "Garden"),
        CategoryRecord::new(5, "Cases").with_parent(2),
    ]
}

pub fn id(n: i64) -> CategoryId {
    CategoryId::Int(n)
}
