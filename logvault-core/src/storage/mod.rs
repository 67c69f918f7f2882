/*!
Object storage port used to probe the export destination.

The core only ever needs a metadata-level existence check on the destination
bucket; writing the exported objects is done by the log service itself.
*/

#[cfg(feature = "aws")]
pub mod s3;

use crate::error::ProviderError;

/// Object storage abstraction for destination probing
///
/// Implementations must issue a metadata-only request (HEAD) and must never
/// list or modify the bucket.
#[cfg_attr(test, mockall::automock)]
pub trait BucketStore {
    /// Check that `bucket` exists and is accessible
    ///
    /// # Returns
    /// `Ok(())` if the bucket can be used, otherwise the provider's error
    fn head_bucket(&self, bucket: &str) -> std::result::Result<(), ProviderError>;
}

impl<T: BucketStore + ?Sized> BucketStore for &T {
    fn head_bucket(&self, bucket: &str) -> std::result::Result<(), ProviderError> {
        (**self).head_bucket(bucket)
    }
}

#[cfg(feature = "aws")]
pub use s3::S3BucketStore;
