#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached (connect failure, dropped connection).
    #[error("Store connection error: {0}")]
    Connection(String),

    /// The store rejected or failed an individual operation.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// A record could not be (de)serialized.
    #[error("Record serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
