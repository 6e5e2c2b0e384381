use crate::copy::Stage;
use crate::types::WriteOp;

use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use std::fmt;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, Error>;

/// Service error codes DynamoDB uses when a request may succeed later.
const RETRYABLE_CODES: [&str; 5] = [
    "ProvisionedThroughputExceededException",
    "ThrottlingException",
    "RequestLimitExceeded",
    "InternalServerError",
    "ServiceUnavailable",
];

#[derive(Debug, Error)]
pub enum Error {
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Retries exhausted after {attempts} attempts with {} unprocessed entries", .unprocessed.len())]
    ThrottleExhausted {
        attempts: u32,
        unprocessed: Vec<WriteOp>,
    },
    #[error("Attribute `{attribute}` has unsupported type `{found}`, expected a string")]
    UnsupportedAttributeType { attribute: String, found: String },
    #[error("Transient remote error: {0}")]
    RemoteTransient(String),
    #[error("Remote error: {0}")]
    RemoteFatal(String),
    #[error("Cancelled with {} unprocessed entries", .unprocessed.len())]
    Cancelled { unprocessed: Vec<WriteOp> },
    #[error("Cannot copy across different tables: {source_table} != {target_table}")]
    TableMismatch {
        source_table: String,
        target_table: String,
    },
    #[error("Failed at stage `{stage}`: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl Error {
    pub fn schema<T: Into<String>>(message: T) -> Self {
        Self::Schema(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RemoteTransient(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Entries the store never accepted, if this error carries any.
    pub fn unprocessed(&self) -> &[WriteOp] {
        match self {
            Self::ThrottleExhausted { unprocessed, .. } | Self::Cancelled { unprocessed } => {
                unprocessed
            }
            Self::Stage { source, .. } => source.unprocessed(),
            _ => &[],
        }
    }

    pub(crate) fn at(self, stage: Stage) -> Self {
        match self {
            Self::Stage { .. } => self,
            _ => Self::Stage {
                stage,
                source: Box::new(self),
            },
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        error!("{:#?}", err);
        Self::Worker(err.to_string())
    }
}

impl<E, R> From<SdkError<E, R>> for Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: fmt::Debug,
{
    fn from(err: SdkError<E, R>) -> Self {
        match &err {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
                Self::RemoteTransient(format!("{err:?}"))
            }
            SdkError::ServiceError(context) => {
                let code = context.err().code().unwrap_or_default();
                let message = context.err().message().unwrap_or_default();

                if RETRYABLE_CODES.contains(&code) {
                    Self::RemoteTransient(format!("{code}: {message}"))
                } else {
                    Self::RemoteFatal(format!("{code}: {message}"))
                }
            }
            _ => Self::RemoteFatal(format!("{err:?}")),
        }
    }
}
