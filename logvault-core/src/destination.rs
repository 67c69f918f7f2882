//! Destination validation ahead of export submission

use tracing::{debug, warn};

use crate::error::{DestinationFailure, ExportError};
use crate::storage::BucketStore;
use crate::Result;

/// Confirm that `bucket` exists and is accessible.
///
/// Failures carry the classified reason and the raw provider error so the
/// orchestrator can record them against the current source only.
pub fn validate_destination<S: BucketStore + ?Sized>(store: &S, bucket: &str) -> Result<()> {
    match store.head_bucket(bucket) {
        Ok(()) => {
            debug!(bucket = %bucket, "Destination bucket validated");
            Ok(())
        }
        Err(error) => {
            let reason = DestinationFailure::classify(&error);
            warn!(bucket = %bucket, reason = %reason, error = %error, "Destination bucket unavailable");
            Err(ExportError::DestinationUnavailable {
                bucket: bucket.to_string(),
                reason,
                error,
            })
        }
    }
}
