/// View query description forwarded to the cluster client
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Index staleness accepted by a view query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stale {
    /// Serve whatever the index holds
    Ok,
    /// Update the index before answering
    False,
    /// Answer, then update the index
    UpdateAfter,
}

/// A query against a design document view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewQuery {
    pub design_doc: String,
    pub view: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale: Option<Stale>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce: Option<bool>,
}

impl ViewQuery {
    pub fn new<S: Into<String>>(design_doc: S, view: S) -> Self {
        Self {
            design_doc: design_doc.into(),
            view: view.into(),
            key: None,
            limit: None,
            skip: None,
            stale: None,
            reduce: None,
        }
    }

    pub fn key(mut self, key: Value) -> Self {
        self.key = Some(key);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn stale(mut self, stale: Stale) -> Self {
        self.stale = Some(stale);
        self
    }

    pub fn reduce(mut self, reduce: bool) -> Self {
        self.reduce = Some(reduce);
        self
    }
}
