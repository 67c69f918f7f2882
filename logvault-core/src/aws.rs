/*!
Shared AWS plumbing for the provider adapters.

The export engine is synchronous. Each adapter blocks on SDK futures using a
Tokio runtime owned by [`AwsEnvironment`], which also carries the loaded SDK
configuration so the log catalog and bucket store share credentials and
region.
*/

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::info;

use crate::error::ProviderError;
use crate::{ExportError, Result};

/// Loaded SDK configuration plus the runtime used to drive it
#[derive(Debug, Clone)]
pub struct AwsEnvironment {
    sdk_config: SdkConfig,
    runtime: Arc<Runtime>,
}

impl AwsEnvironment {
    /// Load configuration from the standard AWS provider chain
    ///
    /// # Errors
    /// Returns [`ExportError::Config`] if the runtime cannot be created or no
    /// credentials provider is available.
    pub fn load(region: Option<&str>) -> Result<Self> {
        let runtime = Runtime::new().map_err(|e| {
            ExportError::config(format!("Failed to create async runtime for AWS clients: {e}"))
        })?;

        let sdk_config = runtime.block_on(async {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(region) = region {
                loader = loader.region(Region::new(region.to_string()));
            }
            loader.load().await
        });

        if sdk_config.credentials_provider().is_none() {
            return Err(ExportError::config(
                "AWS credentials not found. Configure the default credential provider chain",
            ));
        }

        info!(
            region = ?sdk_config.region().map(|r| r.as_ref().to_string()),
            "Loaded AWS configuration"
        );

        Ok(Self {
            sdk_config,
            runtime: Arc::new(runtime),
        })
    }

    /// Wrap an explicit configuration and runtime
    pub fn with_config(sdk_config: SdkConfig, runtime: Arc<Runtime>) -> Self {
        Self {
            sdk_config,
            runtime,
        }
    }

    pub fn sdk_config(&self) -> &SdkConfig {
        &self.sdk_config
    }

    pub fn runtime(&self) -> Arc<Runtime> {
        Arc::clone(&self.runtime)
    }
}

/// Map an SDK error to a [`ProviderError`] keeping code and HTTP status
pub(crate) fn map_sdk_error<E>(op: &str, error: &SdkError<E>) -> ProviderError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    let http_status = error.raw_response().map(|r| r.status().as_u16());

    let mapped = match error {
        SdkError::DispatchFailure(dispatch_err) => {
            ProviderError::transport(format!("{op} request failed to dispatch: {dispatch_err:?}"))
        }
        SdkError::TimeoutError(_) => ProviderError::transport(format!("{op} request timed out")),
        SdkError::ResponseError(response_err) => {
            ProviderError::transport(format!("{op} response error: {response_err:?}"))
        }
        SdkError::ServiceError(service_err) => {
            let err = service_err.err();
            let message = err.message().unwrap_or("Unknown error").to_string();
            match err.code() {
                Some(code) => ProviderError::with_code(code, message),
                None => ProviderError::new(format!("{op} service error: {message}")),
            }
        }
        _ => ProviderError::new(format!("{op} error: {error:?}")),
    };

    match http_status {
        Some(status) => mapped.with_http_status(status),
        None => mapped,
    }
}
