//! # Migration Operations
//!
//! Declarative operations that scripted migrations are written in, and the
//! executor interface that applies them to a database.

use super::errors::StepError;
use super::MigrationStep;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// A single declarative migration operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationOperation {
    /// Create a new collection with an optional schema
    CreateCollection {
        name: String,
        #[serde(default)]
        schema: serde_json::Value,
    },

    /// Drop an existing collection
    DropCollection { name: String },

    /// Add a field to a collection
    AddField {
        collection: String,
        field: String,
        #[serde(default)]
        default: Option<serde_json::Value>,
    },

    /// Remove a field from a collection
    RemoveField { collection: String, field: String },

    /// Rename a field
    RenameField {
        collection: String,
        from: String,
        to: String,
    },

    /// Add an index
    CreateIndex {
        collection: String,
        fields: Vec<String>,
        #[serde(default)]
        unique: bool,
        #[serde(default)]
        name: Option<String>,
    },

    /// Drop an index
    DropIndex { collection: String, name: String },

    /// Rename a collection
    RenameCollection { from: String, to: String },

    /// Passed to the executor untouched
    Raw { operation: serde_json::Value },
}

impl MigrationOperation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateCollection { .. } => "create_collection",
            Self::DropCollection { .. } => "drop_collection",
            Self::AddField { .. } => "add_field",
            Self::RemoveField { .. } => "remove_field",
            Self::RenameField { .. } => "rename_field",
            Self::CreateIndex { .. } => "create_index",
            Self::DropIndex { .. } => "drop_index",
            Self::RenameCollection { .. } => "rename_collection",
            Self::Raw { .. } => "raw",
        }
    }
}

/// Database handle that scripted migrations run against.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    async fn execute(&self, operation: &MigrationOperation) -> Result<(), StepError>;
}

/// Ordered operations forming one direction of a scripted migration.
///
/// Each operation is a single-key map, `- create_collection: {name: users}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationScript(
    #[serde(with = "serde_yaml::with::singleton_map_recursive")] Vec<MigrationOperation>,
);

impl OperationScript {
    pub fn new(operations: Vec<MigrationOperation>) -> Self {
        Self(operations)
    }

    pub fn operations(&self) -> &[MigrationOperation] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[async_trait]
impl<D> MigrationStep<D> for OperationScript
where
    D: OperationExecutor + ?Sized,
{
    /// Runs every operation in order, stopping at the first failure.
    async fn execute(&self, db: &D) -> Result<(), StepError> {
        for (i, op) in self.0.iter().enumerate() {
            db.execute(op).await.map_err(|e| {
                StepError::with_source(format!("operation[{}] {} failed", i, op.kind()), e)
            })?;
        }
        Ok(())
    }
}

/// An index definition in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// A collection definition in the catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionDef {
    #[serde(default)]
    pub schema: serde_json::Value,
    /// Field name -> default value
    #[serde(default)]
    pub fields: BTreeMap<String, Option<serde_json::Value>>,
    #[serde(default)]
    pub indexes: BTreeMap<String, IndexDef>,
}

/// Collections, fields and indexes known to a [`CatalogExecutor`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionDef>,
    #[serde(default)]
    pub raw_operations: Vec<serde_json::Value>,
}

impl Catalog {
    fn collection_mut(&mut self, name: &str) -> Result<&mut CollectionDef, StepError> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| StepError::new(format!("Collection '{}' does not exist", name)))
    }

    /// Apply one operation in place.
    pub fn apply(&mut self, operation: &MigrationOperation) -> Result<(), StepError> {
        match operation {
            MigrationOperation::CreateCollection { name, schema } => {
                if self.collections.contains_key(name) {
                    return Err(StepError::new(format!("Collection '{}' already exists", name)));
                }
                self.collections.insert(
                    name.clone(),
                    CollectionDef {
                        schema: schema.clone(),
                        ..CollectionDef::default()
                    },
                );
            }
            MigrationOperation::DropCollection { name } => {
                if self.collections.remove(name).is_none() {
                    return Err(StepError::new(format!("Collection '{}' does not exist", name)));
                }
            }
            MigrationOperation::AddField {
                collection,
                field,
                default,
            } => {
                let def = self.collection_mut(collection)?;
                if def.fields.contains_key(field) {
                    return Err(StepError::new(format!(
                        "Field '{}' already exists on '{}'",
                        field, collection
                    )));
                }
                def.fields.insert(field.clone(), default.clone());
            }
            MigrationOperation::RemoveField { collection, field } => {
                let def = self.collection_mut(collection)?;
                if def.fields.remove(field).is_none() {
                    return Err(StepError::new(format!(
                        "Field '{}' does not exist on '{}'",
                        field, collection
                    )));
                }
            }
            MigrationOperation::RenameField {
                collection,
                from,
                to,
            } => {
                let def = self.collection_mut(collection)?;
                if def.fields.contains_key(to) {
                    return Err(StepError::new(format!(
                        "Field '{}' already exists on '{}'",
                        to, collection
                    )));
                }
                let default = def.fields.remove(from).ok_or_else(|| {
                    StepError::new(format!("Field '{}' does not exist on '{}'", from, collection))
                })?;
                def.fields.insert(to.clone(), default);
            }
            MigrationOperation::CreateIndex {
                collection,
                fields,
                unique,
                name,
            } => {
                let index_name = name.clone().unwrap_or_else(|| fields.join("_"));
                let def = self.collection_mut(collection)?;
                if def.indexes.contains_key(&index_name) {
                    return Err(StepError::new(format!(
                        "Index '{}' already exists on '{}'",
                        index_name, collection
                    )));
                }
                def.indexes.insert(
                    index_name,
                    IndexDef {
                        fields: fields.clone(),
                        unique: *unique,
                    },
                );
            }
            MigrationOperation::DropIndex { collection, name } => {
                let def = self.collection_mut(collection)?;
                if def.indexes.remove(name).is_none() {
                    return Err(StepError::new(format!(
                        "Index '{}' does not exist on '{}'",
                        name, collection
                    )));
                }
            }
            MigrationOperation::RenameCollection { from, to } => {
                if self.collections.contains_key(to) {
                    return Err(StepError::new(format!("Collection '{}' already exists", to)));
                }
                let def = self.collections.remove(from).ok_or_else(|| {
                    StepError::new(format!("Collection '{}' does not exist", from))
                })?;
                self.collections.insert(to.clone(), def);
            }
            MigrationOperation::Raw { operation } => {
                self.raw_operations.push(operation.clone());
            }
        }
        Ok(())
    }
}

/// Reference executor backed by a [`Catalog`].
///
/// Each operation is applied to a copy of the catalog and committed only
/// when it succeeds (and, for file-backed catalogs, once the copy is on
/// disk), so a failed operation leaves no trace.
#[derive(Debug, Default)]
pub struct CatalogExecutor {
    catalog: Mutex<Catalog>,
    path: Option<PathBuf>,
}

impl CatalogExecutor {
    /// Catalog that lives only as long as the executor
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Catalog persisted as JSON at `path`, loaded if it already exists.
    pub async fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let catalog = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Catalog::default(),
            Err(e) => return Err(e),
        };

        Ok(Self {
            catalog: Mutex::new(catalog),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Copy of the current catalog
    pub async fn snapshot(&self) -> Catalog {
        self.catalog.lock().await.clone()
    }

    pub async fn collection_exists(&self, name: &str) -> bool {
        self.catalog.lock().await.collections.contains_key(name)
    }

    pub async fn index_exists(&self, collection: &str, name: &str) -> bool {
        self.catalog
            .lock()
            .await
            .collections
            .get(collection)
            .map(|c| c.indexes.contains_key(name))
            .unwrap_or(false)
    }

    async fn persist(path: &Path, catalog: &Catalog) -> Result<(), StepError> {
        let content = serde_json::to_string_pretty(catalog)
            .map_err(|e| StepError::with_source("Failed to serialize catalog", e))?;

        // Atomic write: write to temp file, then rename
        let temp_file = path.with_extension("json.tmp");
        tokio::fs::write(&temp_file, content).await.map_err(|e| {
            StepError::with_source(format!("Failed to write {}", temp_file.display()), e)
        })?;
        tokio::fs::rename(&temp_file, path).await.map_err(|e| {
            StepError::with_source(format!("Failed to replace {}", path.display()), e)
        })
    }
}

#[async_trait]
impl OperationExecutor for CatalogExecutor {
    async fn execute(&self, operation: &MigrationOperation) -> Result<(), StepError> {
        let mut catalog = self.catalog.lock().await;
        let mut next = catalog.clone();
        next.apply(operation)?;

        if let Some(path) = &self.path {
            Self::persist(path, &next).await?;
        }

        *catalog = next;
        Ok(())
    }
}
