//! Run-history capabilities the diff engine depends on
//!
//! The engine never decides on its own which run is the baseline or where
//! its files live; it asks a [`RunHistory`].

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Read;
use uuid::Uuid;

/// Readable bytes of one dataset
pub type ByteStream = Box<dyn Read + Send>;

/// Who a run is and where it belongs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    pub run_id: String,
    pub job_name: String,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RunIdentity {
    /// A fresh run created now
    pub fn new(job_name: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            job_name: job_name.into(),
            channel: channel.into(),
            product: None,
            tenant: None,
            ingress: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_product(mut self, product: Option<String>) -> Self {
        self.product = product;
        self
    }

    pub fn with_tenant(mut self, tenant: Option<String>) -> Self {
        self.tenant = tenant;
        self
    }

    pub fn with_ingress(mut self, ingress: Option<String>) -> Self {
        self.ingress = ingress;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Whether `candidate` may serve as this run's baseline, status aside.
    ///
    /// Same job name and channel, same product and ingress when this run has
    /// one, the same tenant (or neither has one), a different run id and a
    /// strictly earlier creation time.
    pub fn accepts_predecessor(&self, candidate: &RunIdentity) -> bool {
        candidate.run_id != self.run_id
            && candidate.job_name == self.job_name
            && candidate.channel == self.channel
            && (self.product.is_none() || candidate.product == self.product)
            && (self.ingress.is_none() || candidate.ingress == self.ingress)
            && candidate.tenant == self.tenant
            && candidate.created_at < self.created_at
    }

    pub fn handle(&self) -> RunHandle {
        RunHandle {
            run_id: self.run_id.clone(),
            created_at: self.created_at,
        }
    }
}

/// Reference to a prior run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
}

/// Where a dataset's bytes can be read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetLocation {
    pub uri: String,
}

impl DatasetLocation {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

pub trait RunHistory: Send + Sync {
    /// Most recent completed run equivalent to `current`, if any
    fn find_previous_run(&self, current: &RunIdentity) -> Result<Option<RunHandle>>;

    /// Location of `dataset` as produced by `run`, if it produced one
    fn resolve_dataset_location(
        &self,
        run: &RunHandle,
        dataset: &str,
    ) -> Result<Option<DatasetLocation>>;

    /// Open a dataset for reading. Failures may be transient.
    fn open_read_stream(&self, location: &DatasetLocation) -> Result<ByteStream>;
}

/// History with no runs in it
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl RunHistory for NoHistory {
    fn find_previous_run(&self, _current: &RunIdentity) -> Result<Option<RunHandle>> {
        Ok(None)
    }

    fn resolve_dataset_location(
        &self,
        _run: &RunHandle,
        _dataset: &str,
    ) -> Result<Option<DatasetLocation>> {
        Ok(None)
    }

    fn open_read_stream(&self, location: &DatasetLocation) -> Result<ByteStream> {
        Err(crate::error::RowdiffError::invalid_input(format!(
            "No history to read {} from",
            location.uri
        )))
    }
}
