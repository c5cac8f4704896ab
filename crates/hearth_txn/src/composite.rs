//! Composite requests - an ordered sequence of requests as one transaction

use crate::error::TxnResult;
use crate::request::{Request, RequestCategory, Txn};
use futures_util::future::LocalBoxFuture;
use hearth_core::Value;
use hearth_graph::Document;

/// Commits sub-requests in order, undoes them in reverse, redoes them in
/// order. Sub-requests already committed are skipped on commit, so a
/// composite may mix eagerly committed and lazily built members.
pub struct CompositeRequest {
    description: String,
    category: RequestCategory,
    sub_requests: Vec<Txn>,
    active: Option<usize>,
}

impl CompositeRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            category: RequestCategory::Composite,
            sub_requests: Vec::new(),
            active: None,
        }
    }

    /// Builder: override the category
    pub fn with_category(mut self, category: RequestCategory) -> Self {
        self.category = category;
        self
    }

    /// Builder: append a sub-request
    pub fn with(mut self, txn: Txn) -> Self {
        self.append(txn);
        self
    }

    pub fn append(&mut self, txn: Txn) {
        self.sub_requests.push(txn);
    }

    pub fn sub_requests(&self) -> &[Txn] {
        &self.sub_requests
    }

    pub fn len(&self) -> usize {
        self.sub_requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sub_requests.is_empty()
    }

    /// The sub-request whose commit is in progress
    pub fn active_request(&self) -> Option<&Txn> {
        self.active.and_then(|i| self.sub_requests.get(i))
    }

    /// Undo, in reverse, the sub-requests committed during the failed pass
    fn roll_back(&mut self, doc: &mut Document, committed: &[usize]) {
        for &i in committed.iter().rev() {
            if let Err(err) = self.sub_requests[i].undo(doc) {
                log::error!(
                    target: "hearth::txn",
                    "Rollback of '{}' failed: {}",
                    self.sub_requests[i].description(),
                    err
                );
            }
        }
    }
}

impl Request for CompositeRequest {
    fn description(&self) -> &str {
        &self.description
    }

    fn category(&self) -> RequestCategory {
        self.category.clone()
    }

    fn on_commit(&mut self, doc: &mut Document) -> TxnResult<()> {
        let mut committed = Vec::new();
        for i in 0..self.sub_requests.len() {
            if self.sub_requests[i].is_committed() {
                continue;
            }
            self.active = Some(i);
            if let Err(err) = self.sub_requests[i].commit(doc) {
                self.active = None;
                self.roll_back(doc, &committed);
                return Err(err);
            }
            committed.push(i);
        }
        self.active = None;
        Ok(())
    }

    fn on_commit_async<'a>(&'a mut self, doc: &'a mut Document) -> LocalBoxFuture<'a, TxnResult<()>> {
        Box::pin(async move {
            let mut committed = Vec::new();
            for i in 0..self.sub_requests.len() {
                if self.sub_requests[i].is_committed() {
                    continue;
                }
                self.active = Some(i);
                // Strictly sequential: the next sub-commit starts only after
                // this one has resolved.
                if let Err(err) = self.sub_requests[i].commit_async(doc).await {
                    self.active = None;
                    self.roll_back(doc, &committed);
                    return Err(err);
                }
                committed.push(i);
            }
            self.active = None;
            Ok(())
        })
    }

    /// On failure the sub-requests already undone are redone, so the
    /// composite stays wholly committed.
    fn on_undo(&mut self, doc: &mut Document) -> TxnResult<()> {
        for i in (0..self.sub_requests.len()).rev() {
            if let Err(err) = self.sub_requests[i].undo(doc) {
                log::error!(
                    target: "hearth::txn",
                    "Undo of '{}' failed at '{}': {}",
                    self.description,
                    self.sub_requests[i].description(),
                    err
                );
                for txn in &mut self.sub_requests[i + 1..] {
                    if let Err(err) = txn.redo(doc) {
                        log::error!(
                            target: "hearth::txn",
                            "'{}' left partially undone: redo of '{}' failed: {}",
                            self.description,
                            txn.description(),
                            err
                        );
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// On failure the sub-requests already redone are undone again, so the
    /// composite stays wholly undone.
    fn on_redo(&mut self, doc: &mut Document) -> TxnResult<()> {
        for i in 0..self.sub_requests.len() {
            if let Err(err) = self.sub_requests[i].redo(doc) {
                log::error!(
                    target: "hearth::txn",
                    "Redo of '{}' failed at '{}': {}",
                    self.description,
                    self.sub_requests[i].description(),
                    err
                );
                for txn in self.sub_requests[..i].iter_mut().rev() {
                    if let Err(err) = txn.undo(doc) {
                        log::error!(
                            target: "hearth::txn",
                            "'{}' left partially redone: undo of '{}' failed: {}",
                            self.description,
                            txn.description(),
                            err
                        );
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Gesture messages go to the sub-request still being built
    fn on_receive(&mut self, doc: &mut Document, message: &str, params: &Value) -> TxnResult<bool> {
        match self.sub_requests.iter_mut().rev().find(|t| !t.is_committed()) {
            Some(txn) => txn.receive(doc, message, params),
            None => Ok(false),
        }
    }

    /// Result of the last sub-request
    fn result(&self) -> Option<Value> {
        self.sub_requests.last().and_then(Txn::result)
    }
}
