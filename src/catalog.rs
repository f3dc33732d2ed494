//! Recipient catalog collaborator.
//!
//! The catalog service owns recipient identities, usage counts and
//! coefficients; the planner only reads them. `FileCatalog` is a JSON-file
//! stand-in for that service.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::address::Address;
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::planner::{validate_coefficient, RecipientRecord};

#[async_trait]
pub trait RecipientCatalog: Send + Sync {
    /// Recipients in catalog order, each with its effective coefficient.
    async fn recipients(&self) -> Result<Vec<RecipientRecord>>;
    async fn set_coefficient(&self, id: u32, coefficient: f64) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    pub address: Address,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub recipients: Vec<CatalogEntry>,
    /// Missing ids use 1.0.
    #[serde(default)]
    pub coefficients: BTreeMap<u32, f64>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl CatalogDocument {
    pub fn records(&self) -> Vec<RecipientRecord> {
        self.recipients
            .iter()
            .map(|e| RecipientRecord {
                id: e.id,
                name: e.name.clone(),
                address: e.address,
                raw_count: e.count,
                coefficient: self.coefficients.get(&e.id).copied().unwrap_or(1.0),
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct FileCatalog {
    path: PathBuf,
}

impl FileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Result<CatalogDocument> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading catalog {}", self.path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing catalog {}", self.path.display()))
    }

    pub async fn save(&self, doc: &CatalogDocument) -> Result<()> {
        let body = serde_json::to_string_pretty(doc)?;
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("writing catalog {}", self.path.display()))
    }
}

#[async_trait]
impl RecipientCatalog for FileCatalog {
    async fn recipients(&self) -> Result<Vec<RecipientRecord>> {
        let doc = self.load().await?;
        log(
            Level::Debug,
            Domain::Catalog,
            "catalog_read",
            obj(&[
                ("path", v_str(&self.path.to_string_lossy())),
                ("recipients", json!(doc.recipients.len())),
            ]),
        );
        Ok(doc.records())
    }

    async fn set_coefficient(&self, id: u32, coefficient: f64) -> Result<()> {
        validate_coefficient(id, coefficient)?;
        let mut doc = self.load().await?;
        if !doc.recipients.iter().any(|e| e.id == id) {
            return Err(anyhow!("unknown recipient id {}", id));
        }
        doc.coefficients.insert(id, coefficient);
        doc.last_updated = Some(crate::logging::ts_now());
        self.save(&doc).await?;
        log(
            Level::Info,
            Domain::Catalog,
            "coefficient_updated",
            obj(&[("recipient_id", json!(id)), ("coefficient", v_num(coefficient))]),
        );
        Ok(())
    }
}
