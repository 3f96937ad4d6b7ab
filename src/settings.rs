use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default time a pipeline waits for its sub-grid requests to complete.
pub const DEFAULT_TIME_TO_LIVE: Duration = Duration::from_secs(2 * 60);

/// Default number of sub-grids handed to the retrieval layer at once.
pub const DEFAULT_MAX_SUB_GRIDS_PER_BATCH: usize = 100;

/// Restricts a request to one page of the sub-grids it would otherwise submit.
///
/// Pages are numbered from zero and hold `page_size` sub-grids, in scan
/// order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PageSettings {
    pub page_size: u64,
    pub page_number: u64,
}

/// Pipeline settings.
///
/// Settings apply to a single request and are usually received along with
/// it as JSON. Missing fields take their default value.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Time to wait for the retrieval to complete, in milliseconds.
    #[serde(with = "duration_millis")]
    pub time_to_live: Duration,
    pub max_sub_grids_per_batch: usize,
    /// Number of threads retrieving batches. `1` retrieves in the dispatching thread.
    pub num_retrieval_threads: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_page: Option<PageSettings>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            time_to_live: DEFAULT_TIME_TO_LIVE,
            max_sub_grids_per_batch: DEFAULT_MAX_SUB_GRIDS_PER_BATCH,
            num_retrieval_threads: 1,
            submission_page: None,
        }
    }
}

impl PipelineSettings {
    pub fn from_json(json: &str) -> crate::Result<PipelineSettings> {
        let settings: PipelineSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Checks that the settings describe a request that can run.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_sub_grids_per_batch == 0 {
            return Err(crate::SiteGridError::InvalidArgument(
                "max_sub_grids_per_batch must be at least 1".to_string(),
            ));
        }
        if self.num_retrieval_threads == 0 {
            return Err(crate::SiteGridError::InvalidArgument(
                "num_retrieval_threads must be at least 1".to_string(),
            ));
        }
        if let Some(page) = &self.submission_page {
            if page.page_size == 0 {
                return Err(crate::SiteGridError::InvalidArgument(
                    "page_size must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
