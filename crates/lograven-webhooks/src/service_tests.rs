use super::*;
use chrono::Utc;
use lograven_core::{EventSummary, GroupSummary};
use lograven_database::test_utils::{create_project_with_limit, create_webhook, TestDatabase};
use lograven_entities::types::PlanLimit;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Fixture {
    test_db: TestDatabase,
    service: WebhookService,
    project_id: i32,
}

async fn fixture(config: DispatcherConfig) -> Fixture {
    let test_db = TestDatabase::with_migrations()
        .await
        .expect("Failed to create test database");
    let project = create_project_with_limit(test_db.connection(), "pk_webhooks", PlanLimit::Unlimited)
        .await
        .expect("Failed to create project");
    let service = WebhookService::new(test_db.connection_arc(), &config).unwrap();

    Fixture {
        test_db,
        service,
        project_id: project.id,
    }
}

fn notification(project_id: i32, is_new_group: bool, status: &str) -> ErrorNotification {
    let now = Utc::now();
    ErrorNotification {
        project_id,
        is_new_group,
        group: GroupSummary {
            id: 1,
            project_id,
            fingerprint: "f00d".to_string(),
            error_type: "TypeError".to_string(),
            message: "Cannot read property 'x' of undefined".to_string(),
            status: status.to_string(),
            count: 1,
            first_seen: now,
            last_seen: now,
            assignee: None,
        },
        event: EventSummary {
            id: 42,
            error_type: "TypeError".to_string(),
            message: "Cannot read property 'x' of undefined".to_string(),
            timestamp: now,
            environment: None,
            release: Some("1.4.0".to_string()),
            url: None,
        },
    }
}

async fn webhook(
    fx: &Fixture,
    url: &str,
    secret: Option<&str>,
    events: &[&str],
) -> webhooks::Model {
    create_webhook(fx.test_db.connection(), fx.project_id, url, secret, events, true)
        .await
        .expect("Failed to create webhook")
}

const ALL_EVENTS: &[&str] = &["error_group.created", "error_group.updated"];

#[test]
fn test_sign_payload_is_hex_hmac() {
    let signature = sign_payload("test_secret", r#"{"test":"data"}"#);
    assert_eq!(signature.len(), 64);
    assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(signature, sign_payload("test_secret", r#"{"test":"data"}"#));
    assert_ne!(signature, sign_payload("other_secret", r#"{"test":"data"}"#));
}

#[test]
fn test_truncate_utf8_respects_char_boundaries() {
    assert_eq!(truncate_utf8("hello".to_string(), 10), "hello");
    assert_eq!(truncate_utf8("hello".to_string(), 3), "hel");
    // 'é' is two bytes
    assert_eq!(truncate_utf8("héllo".to_string(), 2), "h");
}

#[tokio::test]
async fn test_successful_delivery_records_response() {
    let fx = fixture(DispatcherConfig::default()).await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("content-type", "application/json"))
        .and(header(EVENT_HEADER, "error_group.created"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let hook = webhook(&fx, &format!("{}/hook", server.uri()), None, ALL_EVENTS).await;
    let n = notification(fx.project_id, true, "open");

    let delivery = fx.service.deliver(&hook, &n).await.unwrap();

    assert_eq!(delivery.status, DeliveryStatus::Success);
    assert!(delivery.success);
    assert_eq!(delivery.attempt_number, 1);
    assert_eq!(delivery.status_code, Some(200));
    assert_eq!(delivery.response_body.as_deref(), Some("ok"));
    assert!(delivery.response_at.is_some());
    assert_eq!(delivery.first_sent_at, delivery.sent_at);
    assert_eq!(delivery.event_id, 42);

    let body: serde_json::Value = serde_json::from_str(&delivery.request_body).unwrap();
    assert_eq!(body["eventType"], "error_group.created");
    assert_eq!(body["group"]["fingerprint"], "f00d");
    assert_eq!(body["event"]["release"], "1.4.0");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(
        requests[0].headers.get(DELIVERY_HEADER).unwrap().to_str().unwrap(),
        delivery.correlation_id
    );
    assert!(requests[0].headers.get(SIGNATURE_HEADER).is_none());
    assert_eq!(requests[0].body, delivery.request_body.as_bytes());
}

#[tokio::test]
async fn test_signature_header_matches_raw_body() {
    let fx = fixture(DispatcherConfig::default()).await;
    let n = notification(fx.project_id, false, "open");
    let body = serde_json::to_string(&WebhookPayload::from_notification(&n)).unwrap();
    let expected = sign_payload("whsec_123", &body);

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header(SIGNATURE_HEADER, expected.as_str()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let hook = webhook(&fx, &server.uri(), Some("whsec_123"), ALL_EVENTS).await;
    let delivery = fx.service.deliver(&hook, &n).await.unwrap();

    assert!(delivery.success);
    assert_eq!(delivery.request_body, body);
    assert_eq!(delivery.event_type, "error_group.updated");
}

#[tokio::test]
async fn test_failed_delivery_then_manual_retry_appends_attempt() {
    let fx = fixture(DispatcherConfig::default()).await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let hook = webhook(&fx, &server.uri(), None, ALL_EVENTS).await;
    let first = fx
        .service
        .deliver(&hook, &notification(fx.project_id, true, "open"))
        .await
        .unwrap();

    assert_eq!(first.status, DeliveryStatus::Failed);
    assert!(!first.success);
    assert_eq!(first.status_code, Some(500));
    assert_eq!(first.response_body.as_deref(), Some("upstream down"));
    assert!(first.error_message.as_deref().unwrap().contains("500"));

    let second = fx.service.retry_delivery(first.id).await.unwrap();

    assert_ne!(second.id, first.id);
    assert!(second.success);
    assert_eq!(second.attempt_number, 2);
    assert_eq!(second.correlation_id, first.correlation_id);
    assert_eq!(second.request_body, first.request_body);
    assert_eq!(second.first_sent_at, first.first_sent_at);
    assert!(second.error_message.is_none());

    // The failed attempt is never rewritten
    let reloaded = fx.service.get_delivery(first.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, DeliveryStatus::Failed);
    assert_eq!(reloaded.attempt_number, 1);
    assert_eq!(reloaded.status_code, Some(500));
    assert_eq!(reloaded.error_message, first.error_message);

    let latest = fx
        .service
        .delivery_status(&first.correlation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, second.id);

    // Retrying an old attempt still numbers after the latest one
    let third = fx.service.retry_delivery(first.id).await.unwrap();
    assert_eq!(third.attempt_number, 3);
}

#[tokio::test]
async fn test_concurrent_manual_retries_get_distinct_attempts() {
    let fx = fixture(DispatcherConfig::default()).await;
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

    let hook = webhook(&fx, &server.uri(), None, ALL_EVENTS).await;
    let failed = fx
        .service
        .deliver(&hook, &notification(fx.project_id, true, "open"))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        fx.service.retry_delivery(failed.id),
        fx.service.retry_delivery(failed.id)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    let mut numbers = vec![a.attempt_number, b.attempt_number];
    numbers.sort_unstable();
    assert_eq!(numbers, vec![2, 3]);
    assert_eq!(a.correlation_id, b.correlation_id);
    assert_eq!(fx.test_db.count_rows("webhook_deliveries").await.unwrap(), 3);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_scheduled_retry_skips_delivery_that_moved_on() {
    let fx = fixture(DispatcherConfig::default()).await;
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

    let hook = webhook(&fx, &server.uri(), None, ALL_EVENTS).await;
    let failed = fx
        .service
        .deliver(&hook, &notification(fx.project_id, true, "open"))
        .await
        .unwrap();
    let manual = fx.service.retry_delivery(failed.id).await.unwrap();
    assert!(manual.success);

    let scheduled = fx.service.continue_delivery(&hook, &failed).await.unwrap();
    assert!(scheduled.is_none());
    assert_eq!(fx.test_db.count_rows("webhook_deliveries").await.unwrap(), 2);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_scheduled_retry_follows_latest_failure() {
    let fx = fixture(DispatcherConfig::default()).await;
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

    let hook = webhook(&fx, &server.uri(), None, ALL_EVENTS).await;
    let failed = fx
        .service
        .deliver(&hook, &notification(fx.project_id, true, "open"))
        .await
        .unwrap();

    let next = fx
        .service
        .continue_delivery(&hook, &failed)
        .await
        .unwrap()
        .expect("latest attempt failed, so the retry must be sent");
    assert!(next.success);
    assert_eq!(next.attempt_number, 2);
    assert_eq!(next.first_sent_at, failed.first_sent_at);
}

#[tokio::test]
async fn test_retry_to_disabled_webhook_is_refused() {
    let fx = fixture(DispatcherConfig::default()).await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let hook = webhook(&fx, &server.uri(), None, ALL_EVENTS).await;
    let n = notification(fx.project_id, true, "open");
    let failed = fx.service.deliver(&hook, &n).await.unwrap();
    assert!(!failed.success);

    let mut disabled: webhooks::ActiveModel = hook.into();
    disabled.enabled = Set(false);
    disabled.update(fx.test_db.connection()).await.unwrap();

    assert!(matches!(
        fx.service.retry_delivery(failed.id).await,
        Err(WebhookError::Disabled(_))
    ));
    assert!(fx.service.matching_webhooks(&n).await.unwrap().is_empty());
    assert_eq!(fx.test_db.count_rows("webhook_deliveries").await.unwrap(), 1);
}

#[tokio::test]
async fn test_matching_honours_event_types_and_status_filter() {
    let fx = fixture(DispatcherConfig::default()).await;

    let created_only = webhook(&fx, "http://127.0.0.1:9/a", None, &["error_group.created"]).await;
    let everything = webhook(&fx, "http://127.0.0.1:9/b", None, ALL_EVENTS).await;
    let resolved_only = webhook(&fx, "http://127.0.0.1:9/c", None, ALL_EVENTS).await;
    let mut filtered: webhooks::ActiveModel = resolved_only.clone().into();
    filtered.status_filter = Set(Some(r#"["resolved"]"#.to_string()));
    filtered.update(fx.test_db.connection()).await.unwrap();

    let ids = |hooks: Vec<webhooks::Model>| hooks.into_iter().map(|h| h.id).collect::<Vec<_>>();

    let created = fx
        .service
        .matching_webhooks(&notification(fx.project_id, true, "open"))
        .await
        .unwrap();
    assert_eq!(ids(created), vec![created_only.id, everything.id]);

    let updated = fx
        .service
        .matching_webhooks(&notification(fx.project_id, false, "open"))
        .await
        .unwrap();
    assert_eq!(ids(updated), vec![everything.id]);

    let resolved = fx
        .service
        .matching_webhooks(&notification(fx.project_id, false, "resolved"))
        .await
        .unwrap();
    assert_eq!(ids(resolved), vec![everything.id, resolved_only.id]);

    let other_project = fx
        .service
        .matching_webhooks(&notification(fx.project_id + 100, true, "open"))
        .await
        .unwrap();
    assert!(other_project.is_empty());
}

#[tokio::test]
async fn test_unreachable_receiver_is_failed_without_response() {
    let fx = fixture(DispatcherConfig::default()).await;
    let hook = webhook(&fx, "http://127.0.0.1:1/unreachable", None, ALL_EVENTS).await;

    let delivery = fx
        .service
        .deliver(&hook, &notification(fx.project_id, true, "open"))
        .await
        .unwrap();

    assert_eq!(delivery.status, DeliveryStatus::Failed);
    assert_eq!(delivery.status_code, None);
    assert!(delivery.response_at.is_none());
    assert!(delivery.sent_at.is_some());
    assert!(delivery.error_message.is_some());
}

#[tokio::test]
async fn test_response_body_is_truncated() {
    let fx = fixture(DispatcherConfig {
        max_response_body_bytes: 8,
        ..DispatcherConfig::default()
    })
    .await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("a rather long acknowledgement"))
        .mount(&server)
        .await;

    let hook = webhook(&fx, &server.uri(), None, ALL_EVENTS).await;
    let delivery = fx
        .service
        .deliver(&hook, &notification(fx.project_id, true, "open"))
        .await
        .unwrap();

    assert_eq!(delivery.response_body.as_deref(), Some("a rather"));
}

#[tokio::test]
async fn test_list_deliveries_newest_first() {
    let fx = fixture(DispatcherConfig::default()).await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let hook = webhook(&fx, &server.uri(), None, ALL_EVENTS).await;
    let mut ids = Vec::new();
    for _ in 0..3 {
        let delivery = fx
            .service
            .deliver(&hook, &notification(fx.project_id, false, "open"))
            .await
            .unwrap();
        ids.push(delivery.id);
    }

    let listed = fx.service.list_deliveries(hook.id, 2).await.unwrap();
    assert_eq!(
        listed.iter().map(|d| d.id).collect::<Vec<_>>(),
        vec![ids[2], ids[1]]
    );

    assert!(matches!(
        fx.service.list_deliveries(hook.id + 1000, 10).await,
        Err(WebhookError::NotFound(_))
    ));
}
