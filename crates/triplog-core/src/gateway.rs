use crate::error::GatewayError;
use crate::record::CommittedRecord;
use std::sync::Arc;

/// Append-only durable store for committed records.
///
/// Implementations must tolerate appends from several sessions at once.
/// A failed append is reported and not retried by the caller.
pub trait PersistenceGateway: Send + Sync {
    fn append(&self, record: &CommittedRecord) -> Result<(), GatewayError>;
}

impl<G: PersistenceGateway + ?Sized> PersistenceGateway for Arc<G> {
    fn append(&self, record: &CommittedRecord) -> Result<(), GatewayError> {
        (**self).append(record)
    }
}

impl<G: PersistenceGateway + ?Sized> PersistenceGateway for &G {
    fn append(&self, record: &CommittedRecord) -> Result<(), GatewayError> {
        (**self).append(record)
    }
}
