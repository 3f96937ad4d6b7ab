//! Definition of sitegrid's error, result and request status types.

use std::fmt;
use std::sync::PoisonError;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The library's error enum.
#[derive(Debug, Error)]
pub enum SiteGridError {
    /// Invalid argument was passed by the user.
    #[error("An invalid argument was passed: '{0}'")]
    InvalidArgument(String),
    /// A site model referenced by a request is not registered.
    #[error("Site model not found: '{0}'")]
    SiteModelNotFound(Uuid),
    /// A design referenced by a filter or request has no existence map.
    #[error("Design not found: '{0}'")]
    DesignNotFound(Uuid),
    /// A sub-grid batch could not be retrieved.
    #[error("Failed to retrieve sub-grids: '{0}'")]
    RetrievalFailed(String),
    /// An error happened in one of the worker threads.
    #[error("An error occurred in a thread: '{0}'")]
    ErrorInThread(String),
    /// A thread holding the locked panicked and poisoned the lock.
    #[error("A thread holding the lock panicked and poisoned the lock")]
    Poisoned,
    /// System error. (e.g.: We failed spawning a new thread)
    #[error("System error.'{0}'")]
    SystemError(String),
    /// Settings or filters could not be (de)serialized.
    #[error("Serialization error: '{0}'")]
    Serialization(#[from] serde_json::Error),
}

impl<Guard> From<PoisonError<Guard>> for SiteGridError {
    fn from(_: PoisonError<Guard>) -> SiteGridError {
        SiteGridError::Poisoned
    }
}

impl From<rayon::ThreadPoolBuildError> for SiteGridError {
    fn from(error: rayon::ThreadPoolBuildError) -> SiteGridError {
        SiteGridError::SystemError(error.to_string())
    }
}

/// Terminal status of a pipeline request.
///
/// Every request ends with exactly one of these, whether it completed,
/// failed while being built, timed out or was cancelled.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum RequestErrorStatus {
    Ok,
    #[default]
    Unknown,
    /// The site model could not be found.
    NoSuchDataModel,
    /// The site model has no valid plan extent.
    FailedToRequestDatamodelStatistics,
    /// A surveyed surface existence map could not be obtained.
    FailedToRequestSubgridExistenceMap,
    /// A required design was not supplied or its existence map is missing.
    NoDesignProvided,
    /// A filter time range ends before it starts.
    InvalidTimeRange,
    /// A filter fence has too few vertices to bound an area.
    InvalidSpatialFilter,
    /// The dispatch strategy could not start retrieving sub-grids.
    FailedToExecuteRetrieval,
    /// The pipeline settings cannot drive a request, e.g. an empty page size.
    InvalidSettings,
    AbortedDueToPipelineTimeout,
    RequestHasBeenCancelled,
}

impl RequestErrorStatus {
    pub fn is_ok(self) -> bool {
        self == RequestErrorStatus::Ok
    }
}

impl fmt::Display for RequestErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RequestErrorStatus::Ok => "ok",
            RequestErrorStatus::Unknown => "unknown",
            RequestErrorStatus::NoSuchDataModel => "no such data model",
            RequestErrorStatus::FailedToRequestDatamodelStatistics => {
                "failed to request data model statistics"
            }
            RequestErrorStatus::FailedToRequestSubgridExistenceMap => {
                "failed to request sub-grid existence map"
            }
            RequestErrorStatus::NoDesignProvided => "no design provided",
            RequestErrorStatus::InvalidTimeRange => "invalid time range",
            RequestErrorStatus::InvalidSpatialFilter => "invalid spatial filter",
            RequestErrorStatus::FailedToExecuteRetrieval => "failed to execute retrieval",
            RequestErrorStatus::InvalidSettings => "invalid pipeline settings",
            RequestErrorStatus::AbortedDueToPipelineTimeout => "aborted due to pipeline timeout",
            RequestErrorStatus::RequestHasBeenCancelled => "request has been cancelled",
        };
        f.write_str(text)
    }
}
