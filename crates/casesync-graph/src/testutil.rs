//! Scripted in-memory gateway for tests.
//!
//! SELECT responses are served in the order they were pushed; once the
//! script runs out every query returns an empty result set. Inserts land in
//! an in-memory set of `(graph, statement)` pairs, which gives the same
//! duplicate tolerance as a real triple store.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Mutex;

use casesync_core::sparql::{InsertData, SparqlQuery};
use casesync_core::{CaseSyncError, CaseSyncResult};

use crate::client::{QueryTarget, SparqlGateway};
use crate::results::SelectResults;

#[derive(Default)]
pub struct FakeGateway {
    script: Mutex<VecDeque<CaseSyncResult<SelectResults>>>,
    selects: Mutex<Vec<(String, QueryTarget)>>,
    inserts: Mutex<Vec<InsertData>>,
    store: Mutex<BTreeSet<(String, String)>>,
    failing_graphs: Mutex<HashSet<String>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_select(&self, results: SelectResults) {
        self.script.lock().unwrap().push_back(Ok(results));
    }

    pub fn push_error(&self, error: CaseSyncError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    /// Make every insert into `graph` fail.
    pub fn fail_graph(&self, graph: &str) {
        self.failing_graphs.lock().unwrap().insert(graph.to_string());
    }

    pub fn heal_graph(&self, graph: &str) {
        self.failing_graphs.lock().unwrap().remove(graph);
    }

    pub fn select_count(&self) -> usize {
        self.selects.lock().unwrap().len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.selects.lock().unwrap().iter().map(|(q, _)| q.clone()).collect()
    }

    pub fn targets(&self) -> Vec<QueryTarget> {
        self.selects.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn inserts(&self) -> Vec<InsertData> {
        self.inserts.lock().unwrap().clone()
    }

    /// Statements currently stored in `graph`, sorted.
    pub fn stored(&self, graph: &str) -> Vec<String> {
        self.store
            .lock()
            .unwrap()
            .iter()
            .filter(|(g, _)| g == graph)
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub fn snapshot(&self) -> BTreeSet<(String, String)> {
        self.store.lock().unwrap().clone()
    }
}

#[async_trait]
impl SparqlGateway for FakeGateway {
    async fn select(
        &self,
        query: &SparqlQuery,
        target: &QueryTarget,
    ) -> CaseSyncResult<SelectResults> {
        self.selects
            .lock()
            .unwrap()
            .push((query.as_str().to_string(), target.clone()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(SelectResults::default()))
    }

    async fn insert(&self, data: &InsertData) -> CaseSyncResult<()> {
        self.inserts.lock().unwrap().push(data.clone());
        if self.failing_graphs.lock().unwrap().contains(&data.graph) {
            return Err(CaseSyncError::Rejected {
                endpoint: "fake".to_string(),
                status: 500,
                body: format!("insert into {} refused", data.graph),
            });
        }
        let mut store = self.store.lock().unwrap();
        for statement in &data.statements {
            store.insert((data.graph.clone(), statement.clone()));
        }
        Ok(())
    }
}
