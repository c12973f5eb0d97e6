use super::*;
use chrono::TimeZone;
use lograven_core::{EventSummary, GroupSummary};
use lograven_database::test_utils::{create_project_with_limit, create_webhook, TestDatabase};
use lograven_entities::types::{DeliveryStatus, PlanLimit};
use lograven_entities::webhook_deliveries;
use sea_orm::{EntityTrait, QueryOrder};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        initial_backoff: Duration::from_secs(1),
        max_backoff: Duration::from_secs(10),
        max_retry_window: Duration::from_secs(60),
    }
}

fn failed_attempt(attempt_number: i32, first_sent_at: UtcDateTime) -> webhook_deliveries::Model {
    webhook_deliveries::Model {
        id: 1,
        webhook_id: 1,
        correlation_id: "c0ffee".to_string(),
        attempt_number,
        event_type: "error_group.created".to_string(),
        event_id: 1,
        status: DeliveryStatus::Failed,
        request_body: "{}".to_string(),
        success: false,
        status_code: Some(500),
        response_body: None,
        error_message: Some("Receiver responded with HTTP 500".to_string()),
        first_sent_at: Some(first_sent_at),
        sent_at: Some(first_sent_at),
        response_at: Some(first_sent_at),
        created_at: first_sent_at,
    }
}

fn notification(project_id: i32) -> ErrorNotification {
    let now = Utc::now();
    ErrorNotification {
        project_id,
        is_new_group: true,
        group: GroupSummary {
            id: 5,
            project_id,
            fingerprint: "beef".to_string(),
            error_type: "RangeError".to_string(),
            message: "Maximum call stack size exceeded".to_string(),
            status: "open".to_string(),
            count: 1,
            first_seen: now,
            last_seen: now,
            assignee: None,
        },
        event: EventSummary {
            id: 9,
            error_type: "RangeError".to_string(),
            message: "Maximum call stack size exceeded".to_string(),
            timestamp: now,
            environment: None,
            release: None,
            url: None,
        },
    }
}

fn fast_config() -> DispatcherConfig {
    DispatcherConfig {
        queue_capacity: 16,
        workers: 2,
        request_timeout_secs: 2,
        max_attempts: 3,
        initial_backoff_ms: 10,
        ..DispatcherConfig::default()
    }
}

async fn attempts(test_db: &TestDatabase) -> Vec<webhook_deliveries::Model> {
    webhook_deliveries::Entity::find()
        .order_by_asc(webhook_deliveries::Column::Id)
        .all(test_db.connection())
        .await
        .unwrap()
}

/// Poll until `done` holds for the recorded attempts, for up to five seconds
async fn wait_for_attempts(
    test_db: &TestDatabase,
    done: impl Fn(&[webhook_deliveries::Model]) -> bool,
) -> Vec<webhook_deliveries::Model> {
    for _ in 0..200 {
        let rows = attempts(test_db).await;
        if done(&rows) {
            return rows;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    attempts(test_db).await
}

#[test]
fn test_backoff_doubles_and_caps() {
    let policy = policy();
    assert_eq!(policy.delay_after(1), Duration::from_secs(1));
    assert_eq!(policy.delay_after(2), Duration::from_secs(2));
    assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    assert_eq!(policy.delay_after(4), Duration::from_secs(8));
    assert_eq!(policy.delay_after(5), Duration::from_secs(10));
    assert_eq!(policy.delay_after(64), Duration::from_secs(10));
}

#[test]
fn test_next_retry_respects_attempts_and_window() {
    let policy = policy();
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    assert_eq!(
        policy.next_retry(&failed_attempt(1, start), start),
        Some(Duration::from_secs(1))
    );
    assert_eq!(policy.next_retry(&failed_attempt(5, start), start), None);

    // 55s into a 60s window, a 4s wait still fits but a 8s one does not
    let late = start + chrono::Duration::seconds(55);
    assert_eq!(
        policy.next_retry(&failed_attempt(3, start), late),
        Some(Duration::from_secs(4))
    );
    assert_eq!(policy.next_retry(&failed_attempt(4, start), late), None);
}

#[tokio::test]
async fn test_full_queue_drops_newest() {
    let (sender, mut receiver) = mpsc::channel(1);
    let notifier = DispatchSender { sender };

    assert_eq!(notifier.notify(notification(1)), Ok(()));
    assert_eq!(notifier.notify(notification(2)), Err(NotifyError::QueueFull));

    match receiver.recv().await {
        Some(Job::Notify(kept)) => assert_eq!(kept.project_id, 1),
        _ => panic!("expected the first notification to be queued"),
    }

    drop(receiver);
    assert_eq!(notifier.notify(notification(3)), Err(NotifyError::Closed));
}

#[tokio::test]
async fn test_dispatcher_retries_until_success() {
    let test_db = TestDatabase::with_migrations().await.unwrap();
    let project = create_project_with_limit(test_db.connection(), "pk_dispatch", PlanLimit::Unlimited)
        .await
        .unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    create_webhook(
        test_db.connection(),
        project.id,
        &server.uri(),
        Some("whsec"),
        &["error_group.created"],
        true,
    )
    .await
    .unwrap();

    let config = fast_config();
    let service = Arc::new(WebhookService::new(test_db.connection_arc(), &config).unwrap());
    let dispatcher = WebhookDispatcher::start(service, &config);

    dispatcher.notifier().notify(notification(project.id)).unwrap();

    let rows = wait_for_attempts(&test_db, |rows| rows.iter().any(|r| r.success)).await;
    dispatcher.shutdown().await;

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].status, DeliveryStatus::Failed);
    assert_eq!(rows[0].status_code, Some(502));
    assert_eq!(rows[1].status, DeliveryStatus::Success);
    assert_eq!(rows[1].attempt_number, 2);
    assert_eq!(rows[1].correlation_id, rows[0].correlation_id);
    assert_eq!(rows[1].request_body, rows[0].request_body);
    assert_eq!(rows[1].first_sent_at, rows[0].first_sent_at);
}

#[tokio::test]
async fn test_dispatcher_gives_up_after_max_attempts() {
    let test_db = TestDatabase::with_migrations().await.unwrap();
    let project = create_project_with_limit(test_db.connection(), "pk_give_up", PlanLimit::Unlimited)
        .await
        .unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    create_webhook(
        test_db.connection(),
        project.id,
        &server.uri(),
        None,
        &["error_group.created", "error_group.updated"],
        true,
    )
    .await
    .unwrap();

    let config = fast_config();
    let service = Arc::new(WebhookService::new(test_db.connection_arc(), &config).unwrap());
    let dispatcher = WebhookDispatcher::start(service, &config);

    dispatcher.notifier().notify(notification(project.id)).unwrap();

    wait_for_attempts(&test_db, |rows| {
        rows.len() == 3 && rows.iter().all(|r| r.status.is_terminal())
    })
    .await;
    // Long enough for a fourth attempt to show up if one were scheduled
    tokio::time::sleep(Duration::from_millis(200)).await;
    dispatcher.shutdown().await;

    let rows = attempts(&test_db).await;
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.status == DeliveryStatus::Failed));
    assert_eq!(
        rows.iter().map(|r| r.attempt_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[tokio::test]
async fn test_disabled_webhooks_are_never_called() {
    let test_db = TestDatabase::with_migrations().await.unwrap();
    let project = create_project_with_limit(test_db.connection(), "pk_disabled", PlanLimit::Unlimited)
        .await
        .unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    create_webhook(
        test_db.connection(),
        project.id,
        &server.uri(),
        None,
        &["error_group.created"],
        false,
    )
    .await
    .unwrap();

    let config = fast_config();
    let service = Arc::new(WebhookService::new(test_db.connection_arc(), &config).unwrap());
    let dispatcher = WebhookDispatcher::start(service, &config);

    dispatcher.notifier().notify(notification(project.id)).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    dispatcher.shutdown().await;

    assert!(attempts(&test_db).await.is_empty());
}

#[tokio::test]
async fn test_manual_success_cancels_scheduled_retry() {
    let test_db = TestDatabase::with_migrations().await.unwrap();
    let project = create_project_with_limit(test_db.connection(), "pk_superseded", PlanLimit::Unlimited)
        .await
        .unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    create_webhook(
        test_db.connection(),
        project.id,
        &server.uri(),
        None,
        &["error_group.created"],
        true,
    )
    .await
    .unwrap();

    let config = DispatcherConfig {
        initial_backoff_ms: 500,
        ..fast_config()
    };
    let service = Arc::new(WebhookService::new(test_db.connection_arc(), &config).unwrap());
    let dispatcher = WebhookDispatcher::start(service.clone(), &config);

    dispatcher.notifier().notify(notification(project.id)).unwrap();
    let rows = wait_for_attempts(&test_db, |rows| {
        rows.len() == 1 && rows[0].status == DeliveryStatus::Failed
    })
    .await;

    let manual = service.retry_delivery(rows[0].id).await.unwrap();
    assert!(manual.success);

    // Past the scheduled backoff
    tokio::time::sleep(Duration::from_millis(1200)).await;
    dispatcher.shutdown().await;

    let rows = attempts(&test_db).await;
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows.iter()
            .filter(|r| r.status == DeliveryStatus::Success)
            .count(),
        1
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}
