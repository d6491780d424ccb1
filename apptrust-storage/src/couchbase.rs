//! Couchbase storage implementation
//!
//! Each entity is persisted as one aggregate document holding the head
//! record and its whole version chain. A commit is therefore a single
//! document upsert, which Couchbase applies atomically.

use async_trait::async_trait;
use couchbase::{
    cluster::Cluster,
    collection::Collection,
    options::{
        cluster_options::ClusterOptions,
        diagnostic_options::WaitUntilReadyOptions,
        kv_options::{GetOptions, InsertOptions, RemoveOptions, UpsertOptions},
        query_options::QueryOptions,
    },
};
use tokio_stream::StreamExt;

use couchbase::authenticator::{Authenticator, PasswordAuthenticator};

use apptrust_core::{EntityId, EntityKind, EntityRecord, Version, VersionId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{EntityStorage, StorageError};

/// Couchbase storage configuration
#[derive(Debug, Clone)]
pub struct CouchbaseConfig {
    pub connection_string: String,
    pub username: String,
    pub password: String,
    pub bucket_name: String,
}

impl Default for CouchbaseConfig {
    fn default() -> Self {
        Self {
            connection_string: "couchbase://localhost".to_string(),
            username: "admin".to_string(),
            password: "password123".to_string(),
            bucket_name: "apptrust".to_string(),
        }
    }
}

/// Couchbase storage for templates, rules and their versions
pub struct CouchbaseStorage {
    cluster: Arc<Cluster>,
    collection: Collection,
    bucket_name: String,
}

/// Aggregate document: one entity plus its version chain
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntityDocument<E> {
    #[serde(rename = "type")]
    doc_type: String,
    entity: E,
    versions: Vec<Version>,
}

#[derive(Debug, Deserialize)]
struct CounterRow {
    next: i64,
}

#[derive(Debug, Serialize)]
struct CounterDocument {
    #[serde(rename = "type")]
    doc_type: &'static str,
    next: i64,
}

fn document_id(kind: EntityKind, id: EntityId) -> String {
    format!("{}::{}", kind, id)
}

/// Attempts to reserve a sequence value before giving up on contention
const SEQUENCE_ATTEMPTS: usize = 5;

fn is_not_found(err: &impl std::fmt::Display) -> bool {
    err.to_string().contains("DocumentNotFound")
}

fn is_exists(err: &impl std::fmt::Display) -> bool {
    err.to_string().contains("DocumentExists")
}

/// A row that does not match the expected shape fails the whole query
fn decode_row<T: serde::de::DeserializeOwned>(row: serde_json::Value) -> Result<T, StorageError> {
    Ok(serde_json::from_value(row)?)
}

impl CouchbaseStorage {
    /// Create a new Couchbase storage instance
    pub async fn new(config: CouchbaseConfig) -> Result<Self, StorageError> {
        let authenticator = PasswordAuthenticator::new(&config.username, &config.password);
        let options = ClusterOptions::new(Authenticator::PasswordAuthenticator(authenticator));
        let cluster = Cluster::connect(&config.connection_string, options)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to connect to cluster: {}", e)))?;

        let bucket = cluster.bucket(&config.bucket_name);
        let _: () = bucket
            .wait_until_ready(WaitUntilReadyOptions::default())
            .await
            .map_err(|e: couchbase::error::Error| {
                StorageError::Connection(format!("Failed to connect to bucket: {}", e))
            })?;

        let collection = bucket.default_collection();

        tracing::info!(
            "Connected to Couchbase cluster at {}, bucket: {}",
            config.connection_string,
            config.bucket_name
        );

        Ok(Self {
            cluster: Arc::new(cluster),
            collection,
            bucket_name: config.bucket_name,
        })
    }

    /// Execute a N1QL query
    async fn query<T: serde::de::DeserializeOwned>(
        &self,
        statement: &str,
    ) -> Result<Vec<T>, StorageError> {
        let mut result = self
            .cluster
            .query(statement, QueryOptions::default())
            .await
            .map_err(|e: couchbase::error::Error| {
                StorageError::Internal(format!("Query failed: {}", e))
            })?;

        let mut rows = Vec::new();
        let mut row_iter = result.rows::<serde_json::Value>();

        while let Some(row) = row_iter.next().await {
            let row = row.map_err(|e| {
                StorageError::Internal(format!("Failed to read query row: {}", e))
            })?;
            rows.push(decode_row(row)?);
        }

        Ok(rows)
    }

    async fn load<E: EntityRecord>(
        &self,
        id: EntityId,
    ) -> Result<Option<EntityDocument<E>>, StorageError> {
        let doc_id = document_id(E::KIND, id);

        match self.collection.get(&doc_id, GetOptions::default()).await {
            Ok(result) => {
                let doc = result.content_as::<EntityDocument<E>>().map_err(|e| {
                    StorageError::Serialization(serde_json::Error::io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        e.to_string(),
                    )))
                })?;
                Ok(Some(doc))
            }
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(StorageError::Internal(format!(
                "Failed to get {} {}: {}",
                E::KIND,
                id,
                e
            ))),
        }
    }

    /// Bump a named sequence and return the reserved value.
    ///
    /// The counter document is seeded with `insert`, so of several callers
    /// racing on a missing counter exactly one gets the first value and the
    /// others go back to the atomic `UPDATE`.
    async fn next_in_sequence(&self, name: &str) -> Result<i64, StorageError> {
        let counter_id = format!("counter::{}", name);
        let statement = format!(
            r#"
            UPDATE `{}` USE KEYS '{}'
            SET next = next + 1
            RETURNING next
            "#,
            self.bucket_name, counter_id
        );

        for _ in 0..SEQUENCE_ATTEMPTS {
            let rows: Vec<CounterRow> = self.query(&statement).await?;
            if let Some(row) = rows.into_iter().next() {
                return Ok(row.next);
            }

            let doc = CounterDocument {
                doc_type: "counter",
                next: 1,
            };
            match self
                .collection
                .insert(&counter_id, &doc, InsertOptions::default())
                .await
            {
                Ok(_) => return Ok(1),
                Err(e) if is_exists(&e) => {
                    tracing::debug!("Counter {} seeded concurrently, retrying", name);
                }
                Err(e) => {
                    return Err(StorageError::Internal(format!(
                        "Failed to seed counter {}: {}",
                        name, e
                    )))
                }
            }
        }

        Err(StorageError::Internal(format!(
            "Could not reserve a value from counter {}",
            name
        )))
    }
}

#[async_trait]
impl<E: EntityRecord> EntityStorage<E> for CouchbaseStorage {
    async fn allocate_entity_id(&self) -> Result<EntityId, StorageError> {
        self.next_in_sequence(&format!("{}::entity", E::KIND)).await
    }

    async fn allocate_version_id(&self) -> Result<VersionId, StorageError> {
        self.next_in_sequence(&format!("{}::version", E::KIND)).await
    }

    async fn get(&self, id: EntityId) -> Result<Option<E>, StorageError> {
        Ok(self.load::<E>(id).await?.map(|doc| doc.entity))
    }

    async fn list(&self) -> Result<Vec<E>, StorageError> {
        let query = format!(
            r#"
            SELECT RAW d.entity
            FROM `{}` d
            WHERE d.type = '{}'
            ORDER BY d.entity.created_at DESC, d.entity.id DESC
            "#,
            self.bucket_name,
            E::KIND
        );

        self.query(&query).await
    }

    async fn versions(&self, entity_id: EntityId) -> Result<Vec<Version>, StorageError> {
        let mut versions = self
            .load::<E>(entity_id)
            .await?
            .map(|doc| doc.versions)
            .unwrap_or_default();
        versions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(versions)
    }

    async fn commit(&self, entity: &E, versions: &[Version]) -> Result<(), StorageError> {
        if let Some(stray) = versions.iter().find(|v| v.entity_id != entity.id()) {
            return Err(StorageError::Internal(format!(
                "version {} belongs to {} {}, not {}",
                stray.id,
                E::KIND,
                stray.entity_id,
                entity.id()
            )));
        }

        let mut chain = self
            .load::<E>(entity.id())
            .await?
            .map(|doc| doc.versions)
            .unwrap_or_default();
        for version in versions {
            match chain.iter_mut().find(|v| v.id == version.id) {
                Some(existing) => *existing = version.clone(),
                None => chain.push(version.clone()),
            }
        }

        let doc = EntityDocument {
            doc_type: E::KIND.to_string(),
            entity: entity.clone(),
            versions: chain,
        };

        let doc_id = document_id(E::KIND, entity.id());
        let _ = self
            .collection
            .upsert(&doc_id, &doc, UpsertOptions::default())
            .await
            .map_err(|e| StorageError::Internal(format!("Failed to save {}: {}", E::KIND, e)))?;

        tracing::debug!(
            "Saved {} {} with {} version(s)",
            E::KIND,
            entity.id(),
            doc.versions.len()
        );
        Ok(())
    }

    async fn delete(&self, id: EntityId) -> Result<(), StorageError> {
        let doc_id = document_id(E::KIND, id);

        match self.collection.remove(&doc_id, RemoveOptions::default()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Err(StorageError::NotFound(format!(
                "{} with id {} not found",
                E::KIND,
                id
            ))),
            Err(e) => Err(StorageError::Internal(format!(
                "Failed to delete {}: {}",
                E::KIND,
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_row_rejects_malformed_counter() {
        let row: CounterRow = decode_row(json!({"next": 4})).unwrap();
        assert_eq!(row.next, 4);

        let err = decode_row::<CounterRow>(json!({"next": "four"})).unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
        assert!(decode_row::<CounterRow>(json!({})).is_err());
    }

    #[test]
    fn test_kv_error_classification() {
        let exists = "DocumentExists: key counter::template::entity already exists";
        let missing = "DocumentNotFound: key template::9";

        assert!(is_exists(&exists));
        assert!(!is_exists(&missing));
        assert!(is_not_found(&missing));
        assert!(!is_not_found(&exists));
    }
}
