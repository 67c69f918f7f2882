/*!
Log catalog port: listing log groups and driving export tasks.

The catalog is the managed log service. Besides the [`LogCatalog`] trait this
module holds source discovery, which pages through the catalog and keeps the
groups named in the run configuration.
*/

#[cfg(feature = "aws")]
pub mod cloudwatch;

use logvault_retry::{catalog_listing_backoff_policy, retry_transient, ExponentialBackoff};
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::task::{ExportTaskRequest, ExportTaskStatus, LogSource, TaskId};
use crate::{ExportError, Result};

/// Page size requested when listing log groups
pub const LIST_PAGE_SIZE: i32 = 50;

/// One page of the catalog listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePage {
    pub sources: Vec<LogSource>,
    pub next_token: Option<String>,
}

/// Managed log service operations consumed by the export engine
#[cfg_attr(test, mockall::automock)]
pub trait LogCatalog {
    /// List one page of log groups, starting at `page_token`
    fn list_sources(&self, page_token: Option<String>)
        -> std::result::Result<SourcePage, ProviderError>;

    /// Submit an export task and return its provider id
    ///
    /// At most one export task may be active per account; a second
    /// submission is rejected by the provider.
    fn submit_export(
        &self,
        request: &ExportTaskRequest,
    ) -> std::result::Result<TaskId, ProviderError>;

    /// Read the current status of an export task
    fn export_status(&self, task_id: &TaskId) -> std::result::Result<ExportTaskStatus, ProviderError>;
}

impl<T: LogCatalog + ?Sized> LogCatalog for &T {
    fn list_sources(
        &self,
        page_token: Option<String>,
    ) -> std::result::Result<SourcePage, ProviderError> {
        (**self).list_sources(page_token)
    }

    fn submit_export(
        &self,
        request: &ExportTaskRequest,
    ) -> std::result::Result<TaskId, ProviderError> {
        (**self).submit_export(request)
    }

    fn export_status(&self, task_id: &TaskId) -> std::result::Result<ExportTaskStatus, ProviderError> {
        (**self).export_status(task_id)
    }
}

/// List every log group and keep those named in `wanted`.
///
/// Names match exactly and case-sensitively. The result follows catalog
/// order. An empty result is [`ExportError::NoSources`].
pub fn discover_sources<C: LogCatalog + ?Sized>(
    catalog: &C,
    wanted: &[String],
) -> Result<Vec<LogSource>> {
    discover_sources_with_policy(catalog, wanted, catalog_listing_backoff_policy())
}

/// [`discover_sources`] with an explicit retry policy for each page
pub fn discover_sources_with_policy<C: LogCatalog + ?Sized>(
    catalog: &C,
    wanted: &[String],
    policy: ExponentialBackoff,
) -> Result<Vec<LogSource>> {
    let all = list_all_sources(catalog, policy)?;
    let total = all.len();

    let matched: Vec<LogSource> = all
        .into_iter()
        .filter(|source| wanted.iter().any(|name| name == &source.name))
        .collect();

    for name in wanted {
        if !matched.iter().any(|source| &source.name == name) {
            warn!(log_group = %name, "Configured log group not found in catalog");
        }
    }

    info!(
        listed = total,
        matched = matched.len(),
        "Filtered log groups for export"
    );

    if matched.is_empty() {
        return Err(ExportError::NoSources {
            requested: wanted.to_vec(),
        });
    }
    Ok(matched)
}

/// Follow pagination until the catalog stops returning a next token
pub fn list_all_sources<C: LogCatalog + ?Sized>(
    catalog: &C,
    policy: ExponentialBackoff,
) -> Result<Vec<LogSource>> {
    let mut sources = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = retry_transient("list_sources", policy.clone(), |_attempt| {
            catalog.list_sources(token.clone())
        })
        .map_err(|e| ExportError::Catalog(e.into_inner()))?;

        pages += 1;
        debug!(page = pages, count = page.sources.len(), "Fetched log group page");
        sources.extend(page.sources);

        match page.next_token {
            Some(next) if Some(&next) != token.as_ref() => token = Some(next),
            Some(_) => {
                warn!(page = pages, "Catalog returned the same page token twice, stopping");
                break;
            }
            None => break,
        }
    }

    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use logvault_retry::fast_backoff_policy;
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn page(names: &[&str], next: Option<&str>) -> SourcePage {
        SourcePage {
            sources: names.iter().map(|n| LogSource::new(*n)).collect(),
            next_token: next.map(str::to_string),
        }
    }

    fn wanted(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_discovery_follows_pagination() {
        let mut catalog = MockLogCatalog::new();
        let mut seq = Sequence::new();
        catalog
            .expect_list_sources()
            .with(eq(None))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(page(&["/aws/lambda/a", "/aws/lambda/b"], Some("t1"))));
        catalog
            .expect_list_sources()
            .with(eq(Some("t1".to_string())))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(page(&["/aws/lambda/c"], None)));

        let sources = discover_sources_with_policy(
            &catalog,
            &wanted(&["/aws/lambda/c", "/aws/lambda/a"]),
            fast_backoff_policy(),
        )
        .unwrap();

        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["/aws/lambda/a", "/aws/lambda/c"]);
    }

    #[test]
    fn test_discovery_is_case_sensitive() {
        let mut catalog = MockLogCatalog::new();
        catalog
            .expect_list_sources()
            .returning(|_| Ok(page(&["/aws/lambda/Orders"], None)));

        let result = discover_sources_with_policy(
            &catalog,
            &wanted(&["/aws/lambda/orders"]),
            fast_backoff_policy(),
        );

        match result {
            Err(ExportError::NoSources { requested }) => {
                assert_eq!(requested, vec!["/aws/lambda/orders"]);
            }
            other => panic!("Expected NoSources, got {other:?}"),
        }
    }

    #[test]
    fn test_listing_retries_transient_errors() {
        let mut catalog = MockLogCatalog::new();
        let mut seq = Sequence::new();
        catalog
            .expect_list_sources()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ProviderError::with_code("ThrottlingException", "Rate exceeded")));
        catalog
            .expect_list_sources()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(page(&["/aws/lambda/a"], None)));

        let sources = discover_sources_with_policy(
            &catalog,
            &wanted(&["/aws/lambda/a"]),
            fast_backoff_policy(),
        )
        .unwrap();
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn test_listing_permanent_error_is_catalog_error() {
        let mut catalog = MockLogCatalog::new();
        catalog.expect_list_sources().times(1).returning(|_| {
            Err(ProviderError::with_code(
                "AccessDeniedException",
                "not authorized to perform logs:DescribeLogGroups",
            ))
        });

        let err = discover_sources_with_policy(
            &catalog,
            &wanted(&["/aws/lambda/a"]),
            fast_backoff_policy(),
        )
        .unwrap_err();

        assert!(err.is_run_fatal());
        assert!(matches!(err, ExportError::Catalog(_)));
        assert!(err.to_string().contains("AccessDeniedException"));
    }

    #[test]
    fn test_repeated_page_token_stops_listing() {
        let mut catalog = MockLogCatalog::new();
        catalog
            .expect_list_sources()
            .times(2)
            .returning(|_| Ok(page(&["/aws/lambda/a"], Some("same"))));

        let sources = list_all_sources(&catalog, fast_backoff_policy()).unwrap();
        assert_eq!(sources.len(), 2);
    }
}
