use async_trait::async_trait;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use crate::definitions::{KeyDocument, KeyType, PROOF_REQUEST_TEMPLATE_TYPE, ProofRequestTemplate};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("document has no string 'id'")]
    MissingId,
    #[error("no key document for '{0}'")]
    MissingKeyDocument(String),
    #[error("(de)serializing document failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("internal error")]
    Internal,
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(_: PoisonError<T>) -> Self {
        Self::Internal
    }
}

/// The wallet's document storage
///
/// Documents are JSON objects identified by their `id` field.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, id: &str) -> Result<Option<Value>, StoreError>;

    /// Add `document`, replacing any document with the same id
    async fn add_document(&self, document: Value) -> Result<(), StoreError>;

    /// All documents having every top-level field of `filter` with an equal value
    async fn query_documents(&self, filter: &Value) -> Result<Vec<Value>, StoreError>;
}

/// Holds documents in memory
#[derive(Default, Clone)]
pub struct MemoryDocumentStore {
    documents: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Default::default()
    }

    /// All documents, ordered by id
    pub fn export(&self) -> Result<Vec<Value>, StoreError> {
        let documents = self.documents.read()?;

        let mut ids = documents.keys().collect::<Vec<_>>();
        ids.sort();

        Ok(ids.into_iter().map(|id| documents[id].clone()).collect())
    }

    pub fn import(&self, documents: Vec<Value>) -> Result<(), StoreError> {
        let mut store = self.documents.write()?;

        documents.into_iter().try_for_each(|document| {
            store.insert(document_id(&document)?, document);

            Ok(())
        })
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(&self, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.documents.read()?.get(id).cloned())
    }

    async fn add_document(&self, document: Value) -> Result<(), StoreError> {
        let id = document_id(&document)?;

        if self.documents.write()?.insert(id.clone(), document).is_some() {
            tracing::debug!("replaced document {id}");
        }

        Ok(())
    }

    async fn query_documents(&self, filter: &Value) -> Result<Vec<Value>, StoreError> {
        let Some(filter) = filter.as_object() else {
            return Ok(vec![]);
        };

        let mut matches = self
            .documents
            .read()?
            .values()
            .filter(|document| {
                filter
                    .iter()
                    .all(|(field, value)| document.get(field) == Some(value))
            })
            .cloned()
            .collect::<Vec<_>>();

        matches.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));

        Ok(matches)
    }
}

fn document_id(document: &Value) -> Result<String, StoreError> {
    document
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(StoreError::MissingId)
}

pub async fn add_key_document(
    store: &dyn DocumentStore,
    key_doc: &KeyDocument,
) -> Result<(), StoreError> {
    store.add_document(key_doc.to_document()?).await
}

/// All key documents held by the wallet
pub async fn key_documents(store: &dyn DocumentStore) -> Result<Vec<KeyDocument>, StoreError> {
    let mut key_docs = Vec::new();

    for key_type in KeyType::ALL {
        for document in store
            .query_documents(&serde_json::json!({ "type": key_type.as_str() }))
            .await?
        {
            key_docs.push(serde_json::from_value(document)?);
        }
    }

    Ok(key_docs)
}

/// The key document controlled by `did`
pub async fn key_document_for(
    store: &dyn DocumentStore,
    did: &str,
) -> Result<KeyDocument, StoreError> {
    store
        .query_documents(&serde_json::json!({ "controller": did }))
        .await?
        .into_iter()
        .find(|document| {
            document["type"]
                .as_str()
                .is_some_and(|key_type| key_type.parse::<KeyType>().is_ok())
        })
        .map(serde_json::from_value)
        .transpose()?
        .ok_or_else(|| StoreError::MissingKeyDocument(did.to_string()))
}

pub async fn add_proof_request_template(
    store: &dyn DocumentStore,
    template: &ProofRequestTemplate,
) -> Result<(), StoreError> {
    store.add_document(serde_json::to_value(template)?).await
}

/// The proof request template stored under `id`, if any
pub async fn proof_request_template(
    store: &dyn DocumentStore,
    id: &str,
) -> Result<Option<ProofRequestTemplate>, StoreError> {
    match store.get_document(id).await? {
        Some(document) if document["type"] == PROOF_REQUEST_TEMPLATE_TYPE => {
            Ok(Some(serde_json::from_value(document)?))
        }
        _ => Ok(None),
    }
}
