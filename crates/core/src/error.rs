use thiserror::Error;

use crate::gate::GateError;
use crate::model::{CatalogError, MalformedRecordError, ProgressError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    MalformedRecord(#[from] MalformedRecordError),
}
