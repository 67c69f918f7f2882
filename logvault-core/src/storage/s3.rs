/*!
Amazon S3 bucket probe.
*/

use aws_sdk_s3::Client as S3Client;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use super::BucketStore;
use crate::aws::{map_sdk_error, AwsEnvironment};
use crate::error::ProviderError;

/// Amazon S3 implementation of [`BucketStore`]
///
/// Uses `HeadBucket`, which is billed as a cheap request and does not
/// enumerate objects.
///
/// # Example
/// ```rust,no_run
/// use logvault_core::aws::AwsEnvironment;
/// use logvault_core::storage::{BucketStore, S3BucketStore};
///
/// let env = AwsEnvironment::load(Some("us-east-1"))?;
/// let store = S3BucketStore::new(&env);
/// store.head_bucket("cw-log-exports-01").ok();
/// # Ok::<(), logvault_core::ExportError>(())
/// ```
#[derive(Debug, Clone)]
pub struct S3BucketStore {
    client: S3Client,
    runtime: Arc<Runtime>,
}

impl S3BucketStore {
    pub fn new(env: &AwsEnvironment) -> Self {
        let client = S3Client::new(env.sdk_config());
        info!("Initialized S3 bucket store");
        Self {
            client,
            runtime: env.runtime(),
        }
    }
}

impl BucketStore for S3BucketStore {
    fn head_bucket(&self, bucket: &str) -> std::result::Result<(), ProviderError> {
        debug!(bucket = %bucket, "Starting S3 head_bucket operation");

        let result = self
            .runtime
            .block_on(async { self.client.head_bucket().bucket(bucket).send().await });

        match result {
            Ok(_) => {
                debug!(bucket = %bucket, "Destination bucket is reachable");
                Ok(())
            }
            Err(e) => {
                let mapped = map_sdk_error("head_bucket", &e);
                warn!(bucket = %bucket, error = %mapped, "S3 head_bucket failed");
                Err(mapped)
            }
        }
    }
}
