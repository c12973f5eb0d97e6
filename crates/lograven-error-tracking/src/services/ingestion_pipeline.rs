use chrono::Utc;
use lograven_config::IngestConfig;
use lograven_core::{ErrorNotification, EventNotifier, EventSummary, GroupSummary, UtcDateTime};
use lograven_database::DbConnection;
use lograven_entities::types::PlanLimit;
use lograven_entities::{error_events, error_groups};
use sea_orm::{ActiveModelTrait, DatabaseTransaction, Set, TransactionTrait};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::group_store::{GroupSeed, GroupStore};
use super::payload::{EventPayload, ValidatedEvent};
use super::project_resolver::ProjectResolver;
use super::quota_tracker::{Admission, QuotaTracker};
use super::symbolicator::{PassthroughSymbolicator, Symbolicator};
use super::types::{IngestError, IngestResult};
use crate::fingerprint::Fingerprinter;

/// Single entry point for SDK submissions
///
/// Order of work per event: resolve the DSN, validate, then in one
/// transaction admit against quota, upsert the group and write the event row.
/// The notifier is called only after the transaction commits.
pub struct IngestionPipeline {
    db: Arc<DbConnection>,
    config: IngestConfig,
    fingerprinter: Fingerprinter,
    notifier: Arc<dyn EventNotifier>,
    symbolicator: Arc<dyn Symbolicator>,
}

/// Rows written by one successful attempt
struct Stored {
    group: error_groups::Model,
    event: error_events::Model,
    is_new: bool,
}

impl IngestionPipeline {
    pub fn new(
        db: Arc<DbConnection>,
        config: IngestConfig,
        fingerprinter: Fingerprinter,
        notifier: Arc<dyn EventNotifier>,
    ) -> Self {
        Self {
            db,
            config,
            fingerprinter,
            notifier,
            symbolicator: Arc::new(PassthroughSymbolicator),
        }
    }

    pub fn with_symbolicator(mut self, symbolicator: Arc<dyn Symbolicator>) -> Self {
        self.symbolicator = symbolicator;
        self
    }

    /// Ingest one raw payload sent with `dsn`
    ///
    /// The whole call runs under `ingest.deadline_ms`. When the deadline
    /// fires the open transaction is dropped and rolled back, so a timed-out
    /// event is either fully stored or not at all.
    pub async fn ingest(&self, dsn: &str, raw: &[u8]) -> Result<IngestResult, IngestError> {
        let received_at = Utc::now();
        match tokio::time::timeout(self.config.deadline(), self.run(dsn, raw, received_at)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    deadline_ms = self.config.deadline_ms,
                    "Ingestion deadline exceeded, uncommitted work rolled back"
                );
                Err(IngestError::Timeout)
            }
        }
    }

    async fn run(
        &self,
        dsn: &str,
        raw: &[u8],
        received_at: UtcDateTime,
    ) -> Result<IngestResult, IngestError> {
        let resolved = ProjectResolver::resolve_in(self.db.as_ref(), dsn).await?;
        let project_id = resolved.project.id;

        let event = EventPayload::parse(raw)
            .and_then(|payload| payload.validate(received_at, self.config.max_message_length))
            .inspect_err(|e| debug!(project_id, error = %e, "Rejected event payload"))?;

        let mapped_stack_trace = match event.stack_trace.as_deref() {
            Some(raw_trace) => {
                self.symbolicator
                    .symbolicate(project_id, event.release.as_deref(), raw_trace)
                    .await
            }
            None => None,
        };
        let fingerprint = self.fingerprinter.fingerprint(
            &event.error_type,
            &event.message,
            mapped_stack_trace
                .as_deref()
                .or(event.stack_trace.as_deref()),
        );

        let mut attempt = 0u32;
        let stored = loop {
            match self
                .store(
                    project_id,
                    resolved.limit,
                    &fingerprint,
                    &event,
                    mapped_stack_trace.as_deref(),
                    received_at,
                )
                .await
            {
                Ok(stored) => break stored,
                Err(e) if e.is_retryable() && attempt < self.config.conflict_retries => {
                    let delay = self.config.conflict_backoff() * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    debug!(
                        project_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Storage conflict during ingestion, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        if stored.is_new {
            info!(
                project_id,
                group_id = stored.group.id,
                error_type = %stored.group.error_type,
                "New error group"
            );
        }

        let notification = ErrorNotification {
            project_id,
            is_new_group: stored.is_new,
            group: GroupSummary::from(&stored.group),
            event: EventSummary::from(&stored.event),
        };
        if let Err(e) = self.notifier.notify(notification) {
            warn!(
                project_id,
                group_id = stored.group.id,
                event_id = stored.event.id,
                error = %e,
                "Dropped webhook notification"
            );
        }

        Ok(IngestResult {
            event_id: stored.event.id,
            group_id: stored.group.id,
            is_new_group: stored.is_new,
            count: stored.group.total_count,
        })
    }

    /// Quota, group and event in one transaction. Any error drops the
    /// transaction, which rolls all three back together.
    async fn store(
        &self,
        project_id: i32,
        limit: PlanLimit,
        fingerprint: &str,
        event: &ValidatedEvent,
        mapped_stack_trace: Option<&str>,
        received_at: UtcDateTime,
    ) -> Result<Stored, IngestError> {
        let txn = self.db.begin().await?;

        if let Admission::Rejected { current, limit } =
            QuotaTracker::try_admit_in(&txn, project_id, limit, received_at).await?
        {
            txn.rollback().await?;
            debug!(project_id, current, limit, "Event rejected by quota");
            return Err(IngestError::QuotaExceeded { current, limit });
        }

        let (group, is_new) = GroupStore::upsert_group_in(
            &txn,
            project_id,
            fingerprint,
            GroupSeed {
                error_type: &event.error_type,
                message: &event.message,
                seen_at: event.timestamp,
            },
        )
        .await?;

        let stored_event =
            insert_event(&txn, project_id, group.id, fingerprint, event, mapped_stack_trace)
                .await?;

        txn.commit().await?;

        Ok(Stored {
            group,
            event: stored_event,
            is_new,
        })
    }
}

async fn insert_event(
    txn: &DatabaseTransaction,
    project_id: i32,
    group_id: i32,
    fingerprint: &str,
    event: &ValidatedEvent,
    mapped_stack_trace: Option<&str>,
) -> Result<error_events::Model, IngestError> {
    let to_json = |bag: &Option<lograven_core::TagMap>| {
        bag.as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| IngestError::InvalidPayload(e.to_string()))
    };

    let row = error_events::ActiveModel {
        project_id: Set(project_id),
        error_group_id: Set(group_id),
        fingerprint: Set(fingerprint.to_string()),
        timestamp: Set(event.timestamp),
        error_type: Set(event.error_type.clone()),
        message: Set(event.message.clone()),
        stack_trace: Set(event.stack_trace.clone()),
        mapped_stack_trace: Set(mapped_stack_trace.map(str::to_string)),
        url: Set(event.url.clone()),
        method: Set(event.method.clone()),
        path: Set(event.path.clone()),
        status_code: Set(event.status_code),
        user_agent: Set(event.user_agent.clone()),
        browser: Set(event.browser.clone()),
        browser_version: Set(event.browser_version.clone()),
        os: Set(event.os.clone()),
        os_version: Set(event.os_version.clone()),
        device_type: Set(event.device_type.clone()),
        environment: Set(event.environment.clone()),
        release: Set(event.release.clone()),
        user_context: Set(to_json(&event.user_context)?),
        tags: Set(to_json(&event.tags)?),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    Ok(row.insert(txn).await?)
}

#[cfg(test)]
mod tests {
    include!("ingestion_pipeline_tests.rs");
}
