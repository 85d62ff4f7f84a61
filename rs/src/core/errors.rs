use std::io::Error as IoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("File IO Error: {0}")]
    FileIO(#[from] IoError),
    #[error("JSON Error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Bincode Error: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),
    #[error("Entity with ID {0} not found")]
    NotFound(i64),
    #[error("Entity with ID {0} already exists")]
    DuplicateId(i64),
    #[error("Road node with ID {0} is not part of the graph")]
    UnknownNode(i64),
    #[error("Road graph has no nodes")]
    EmptyGraph,
    #[error("Invalid edge weight: {0}")]
    InvalidWeight(String),
    #[error("Invalid coordinate: lat {lat}, lon {lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Found only {found} of {requested} neighbours within {max_radius_m} m")]
    InsufficientCoverage {
        found: usize,
        requested: usize,
        max_radius_m: f64,
    },
    #[error("No candidates matched the query")]
    NoCandidates,
    #[error("Operation timed out: {0}")]
    Timeout(String),
    #[error("Worker task failed: {0}")]
    TaskFailed(String),
}

impl SearchError {
    /// `true` for outcomes that mean "nothing to return" rather than a fault.
    pub fn is_no_result(&self) -> bool {
        matches!(
            self,
            SearchError::InsufficientCoverage { .. } | SearchError::NoCandidates
        )
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
