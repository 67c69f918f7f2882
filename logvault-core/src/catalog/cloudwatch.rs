/*!
CloudWatch Logs implementation of the log catalog.
*/

use aws_sdk_cloudwatchlogs::types::ExportTask;
use aws_sdk_cloudwatchlogs::Client as LogsClient;
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{debug, error, info};

use super::{LogCatalog, SourcePage, LIST_PAGE_SIZE};
use crate::aws::{map_sdk_error, AwsEnvironment};
use crate::error::ProviderError;
use crate::task::{ExportTaskRequest, ExportTaskStatus, LogSource, StatusCode, TaskId};

/// CloudWatch Logs catalog
///
/// Lists log groups with `DescribeLogGroups`, submits `CreateExportTask`
/// and reads `DescribeExportTasks`. The destination bucket must live in the
/// same region as the log groups and grant the logs service principal
/// `s3:GetBucketAcl` and `s3:PutObject`.
#[derive(Debug, Clone)]
pub struct CloudWatchLogsCatalog {
    client: LogsClient,
    runtime: Arc<Runtime>,
}

impl CloudWatchLogsCatalog {
    pub fn new(env: &AwsEnvironment) -> Self {
        let client = LogsClient::new(env.sdk_config());
        info!("Initialized CloudWatch Logs catalog");
        Self {
            client,
            runtime: env.runtime(),
        }
    }
}

impl LogCatalog for CloudWatchLogsCatalog {
    fn list_sources(
        &self,
        page_token: Option<String>,
    ) -> std::result::Result<SourcePage, ProviderError> {
        let result = self.runtime.block_on(async {
            self.client
                .describe_log_groups()
                .limit(LIST_PAGE_SIZE)
                .set_next_token(page_token)
                .send()
                .await
        });

        let output = result.map_err(|e| map_sdk_error("describe_log_groups", &e))?;

        let sources = output
            .log_groups()
            .iter()
            .filter_map(|group| {
                group.log_group_name().map(|name| LogSource {
                    name: name.to_string(),
                    stored_bytes: group.stored_bytes(),
                    creation_time: group.creation_time(),
                })
            })
            .collect();

        Ok(SourcePage {
            sources,
            next_token: output.next_token().map(str::to_string),
        })
    }

    fn submit_export(
        &self,
        request: &ExportTaskRequest,
    ) -> std::result::Result<TaskId, ProviderError> {
        info!(
            source = %request.source,
            bucket = %request.destination_bucket,
            prefix = %request.destination_prefix,
            from = request.window.from_millis(),
            to = request.window.to_millis(),
            "Submitting CloudWatch Logs export task"
        );

        let result = self.runtime.block_on(async {
            self.client
                .create_export_task()
                .task_name(request.task_name())
                .log_group_name(&request.source)
                .from(request.window.from_millis())
                .to(request.window.to_millis())
                .destination(&request.destination_bucket)
                .destination_prefix(&request.destination_prefix)
                .send()
                .await
        });

        match result {
            Ok(output) => output.task_id().map(TaskId::from).ok_or_else(|| {
                ProviderError::new("create_export_task returned no task id")
            }),
            Err(e) => {
                let mapped = map_sdk_error("create_export_task", &e);
                error!(source = %request.source, error = %mapped, "Export task submission failed");
                Err(mapped)
            }
        }
    }

    fn export_status(&self, task_id: &TaskId) -> std::result::Result<ExportTaskStatus, ProviderError> {
        let result = self.runtime.block_on(async {
            self.client
                .describe_export_tasks()
                .task_id(task_id.as_str())
                .send()
                .await
        });

        let output = result.map_err(|e| map_sdk_error("describe_export_tasks", &e))?;

        let task = output.export_tasks().first().ok_or_else(|| {
            ProviderError::with_code(
                "ResourceNotFoundException",
                format!("Export task {task_id} not found"),
            )
        })?;

        let status = to_status(task_id, task);
        debug!(task_id = %task_id, status = %status.code, "Read export task status");
        Ok(status)
    }
}

fn to_status(task_id: &TaskId, task: &ExportTask) -> ExportTaskStatus {
    let code = task
        .status()
        .and_then(|s| s.code())
        .map(|c| StatusCode::parse(c.as_str()))
        .unwrap_or_else(|| StatusCode::Unknown(String::new()));
    let message = task.status().and_then(|s| s.message()).map(str::to_string);

    let raw = json!({
        "taskId": task.task_id(),
        "taskName": task.task_name(),
        "logGroupName": task.log_group_name(),
        "from": task.from(),
        "to": task.to(),
        "destination": task.destination(),
        "destinationPrefix": task.destination_prefix(),
        "status": {
            "code": code.as_str(),
            "message": message,
        },
        "executionInfo": {
            "creationTime": task.execution_info().and_then(|i| i.creation_time()),
            "completionTime": task.execution_info().and_then(|i| i.completion_time()),
        },
    });

    ExportTaskStatus {
        task_id: task_id.clone(),
        code,
        message,
        raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_cloudwatchlogs::types::{
        ExportTaskExecutionInfo, ExportTaskStatus as SdkTaskStatus, ExportTaskStatusCode,
    };

    #[test]
    fn test_to_status_maps_code_and_payload() {
        let task = ExportTask::builder()
            .task_id("t-42")
            .task_name("5e0b0c4e")
            .log_group_name("/aws/lambda/orders")
            .from(1_000)
            .to(2_000)
            .destination("archive")
            .destination_prefix("aws-lambda-orders/2024-2-9")
            .status(
                SdkTaskStatus::builder()
                    .code(ExportTaskStatusCode::Running)
                    .message("Started successfully")
                    .build(),
            )
            .execution_info(ExportTaskExecutionInfo::builder().creation_time(900).build())
            .build();

        let status = to_status(&TaskId::from("t-42"), &task);

        assert_eq!(status.code, StatusCode::Running);
        assert_eq!(status.message.as_deref(), Some("Started successfully"));
        assert_eq!(status.raw["logGroupName"], "/aws/lambda/orders");
        assert_eq!(status.raw["status"]["code"], "RUNNING");
        assert_eq!(status.raw["executionInfo"]["creationTime"], 900);
        assert!(status.raw["executionInfo"]["completionTime"].is_null());
    }

    #[test]
    fn test_to_status_without_status_is_unknown() {
        let task = ExportTask::builder().task_id("t-1").build();
        let status = to_status(&TaskId::from("t-1"), &task);
        assert_eq!(status.code, StatusCode::Unknown(String::new()));
        assert!(!status.code.is_terminal());
    }
}
