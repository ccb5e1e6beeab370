//! HTTP client behaviour against a canned-response stub.

mod common;

use common::{Canned, Stub};
use serde_json::json;
use triage_sources::{
    BugQuery, BugUpdate, BugzillaClient, ChatNotifier, CiPassRateSource, CiSourceConfig,
    IssueTracker, OrgSource, OrgSourceConfig, ServiceOrgSource, SippyClient, SlackClient,
    SlackConfig, SourceError, TrackerConfig,
};

fn bugs(ids: &[u64]) -> serde_json::Value {
    json!({ "bugs": ids.iter().map(|id| json!({ "id": id, "component": ["Node"] })).collect::<Vec<_>>() })
}

// ===========================================================================
// Bugzilla
// ===========================================================================

#[tokio::test]
async fn bugzilla_search_pages_until_short_page() {
    let stub = Stub::start(vec![
        Canned::json(200, bugs(&[1, 2])),
        Canned::json(200, bugs(&[3, 4])),
        Canned::json(200, bugs(&[5])),
    ])
    .await;
    let client = BugzillaClient::new(&TrackerConfig::new(&stub.url).with_api_key("k3y")).unwrap();

    let set = client.search(&BugQuery::open_bugs()).await.unwrap();
    assert_eq!(set.ids(), vec![1, 2, 3, 4, 5]);

    let requests = stub.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].target.starts_with("/rest/bug?"));
    assert_eq!(requests[0].header("x-bugzilla-api-key"), Some("k3y"));
    assert_eq!(requests[0].query_values("limit"), vec!["0"]);
    assert_eq!(requests[1].query_values("limit"), vec!["2"]);
    assert_eq!(requests[1].query_values("offset"), vec!["2"]);
    assert_eq!(requests[2].query_values("offset"), vec!["4"]);
    assert_eq!(requests[0].query_values("n1"), vec!["1"]);
    let fields = requests[0].query_values("include_fields").join(",");
    assert!(fields.contains("cf_pm_score"));
    assert!(fields.contains("whiteboard"));
    assert!(fields.contains("flags"));
}

#[tokio::test]
async fn bugzilla_search_stops_on_empty_page() {
    let stub = Stub::start(vec![
        Canned::json(200, bugs(&[1, 2])),
        Canned::json(200, bugs(&[])),
    ])
    .await;
    let client = BugzillaClient::new(&TrackerConfig::new(&stub.url)).unwrap();
    let set = client.search(&BugQuery::default()).await.unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(stub.requests()[0].header("x-bugzilla-api-key"), None);
}

#[tokio::test]
async fn bugzilla_upstream_error_propagates() {
    let stub = Stub::start(vec![Canned::json(503, json!({ "error": "maintenance" }))]).await;
    let client = BugzillaClient::new(&TrackerConfig::new(&stub.url)).unwrap();
    let err = client.search(&BugQuery::default()).await.unwrap_err();
    assert!(matches!(err, SourceError::Upstream { status: 503, .. }));
    assert!(!err.is_not_found());
}

#[tokio::test]
async fn bugzilla_get_and_update_map_404_to_not_found() {
    let stub = Stub::start(vec![
        Canned::json(200, bugs(&[7])),
        Canned::json(404, json!({ "error": true })),
        Canned::json(200, json!({ "bugs": [] })),
        Canned::json(404, json!({ "error": true })),
    ])
    .await;
    let client = BugzillaClient::new(&TrackerConfig::new(&stub.url)).unwrap();

    assert_eq!(client.get_bug(7).await.unwrap().id, 7);
    assert!(client.get_bug(8).await.unwrap_err().is_not_found());

    client
        .update_bug(7, &BugUpdate::status("POST"))
        .await
        .unwrap();
    assert!(client
        .update_bug(9, &BugUpdate::status("POST"))
        .await
        .unwrap_err()
        .is_not_found());

    let requests = stub.requests();
    assert_eq!(requests[2].method, "PUT");
    assert_eq!(requests[2].target, "/rest/bug/7");
    let body: serde_json::Value = serde_json::from_str(&requests[2].body).unwrap();
    assert_eq!(body, json!({ "status": "POST" }));
}

// ===========================================================================
// Org data service and sippy
// ===========================================================================

#[tokio::test]
async fn org_service_accepts_keyed_payload() {
    let stub = Stub::start(vec![Canned::json(
        200,
        json!({
            "orgTitle": "Platform",
            "teams": {
                "Storage": { "name": "Storage", "components": ["Storage"] },
                "Node": { "components": ["Node"], "memberCount": 3 }
            },
            "releases": { "4.7": { "targets": ["4.7.0"] } }
        }),
    )])
    .await;
    let url = format!("{}/teams", stub.url);
    let source = ServiceOrgSource::new(&url, &OrgSourceConfig::from_url(&url)).unwrap();

    let dir = source.load().await.unwrap();
    assert_eq!(dir.team_names(), vec!["Node", "Storage"]);
    assert_eq!(dir.teams()[0].name, "Node");
    assert_eq!(dir.team("Node").unwrap().member_count, 3);
    assert_eq!(dir.current_release().unwrap(), "4.7.0");

    let ua = stub.requests()[0].header("user-agent").unwrap_or_default().to_string();
    assert!(ua.starts_with("triage-sources/"));
}

#[tokio::test]
async fn sippy_client_requests_release() {
    let stub = Stub::start(vec![Canned::json(
        200,
        json!({
            "4.7": { "minimumJobPassRatesByComponent": [
                { "name": "Node", "passRates": { "latest": { "percentage": 75.0 } } }
            ] }
        }),
    )])
    .await;
    let client = SippyClient::new(&CiSourceConfig::new(&format!("{}/json", stub.url))).unwrap();
    let rates = client.pass_rates("4.7").await.unwrap();
    assert_eq!(rates.get("Node"), Some(75.0));
    assert_eq!(stub.requests()[0].query_values("release"), vec!["4.7"]);
}

// ===========================================================================
// Slack
// ===========================================================================

#[tokio::test]
async fn slack_retries_once_after_rate_limit() {
    let stub = Stub::start(vec![
        Canned::json(429, json!({ "ok": false, "error": "ratelimited" })).with_header("Retry-After", "0"),
        Canned::json(200, json!({ "ok": true })),
    ])
    .await;
    let client = SlackClient::new(&SlackConfig::new(&stub.url, "xoxb-test")).unwrap();
    client.message_channel("#node", "hello").await.unwrap();

    let requests = stub.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].target, "/chat.postMessage");
    assert_eq!(requests[1].header("authorization"), Some("Bearer xoxb-test"));
    let body: serde_json::Value = serde_json::from_str(&requests[1].body).unwrap();
    assert_eq!(body["channel"], "#node");
}

#[tokio::test]
async fn slack_gives_up_after_second_rate_limit() {
    let stub = Stub::start(vec![
        Canned::json(429, json!({ "ok": false })).with_header("Retry-After", "0"),
        Canned::json(429, json!({ "ok": false })).with_header("Retry-After", "0"),
        Canned::json(200, json!({ "ok": true })),
    ])
    .await;
    let client = SlackClient::new(&SlackConfig::new(&stub.url, "t")).unwrap();
    let err = client.message_channel("#node", "hello").await.unwrap_err();
    assert!(matches!(err, SourceError::RateLimited { .. }));
    assert_eq!(stub.requests().len(), 2);
}

#[tokio::test]
async fn slack_debug_mode_redirects() {
    let stub = Stub::start(vec![
        Canned::json(200, json!({ "ok": true })),
        Canned::json(200, json!({ "ok": true })),
    ])
    .await;
    let config = SlackConfig::new(&stub.url, "t").with_debug("#debug");
    let client = SlackClient::new(&config).unwrap();

    client.message_channel("#node", "hi").await.unwrap();
    client.message_email("dev@example.com", "yo").await.unwrap();

    let requests = stub.requests();
    assert_eq!(requests.len(), 2);
    for r in &requests {
        let body: serde_json::Value = serde_json::from_str(&r.body).unwrap();
        assert_eq!(body["channel"], "#debug");
    }
    let first: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(first["text"], "DEBUG sendto: #node: hi");
}

#[tokio::test]
async fn slack_direct_message_flow() {
    let stub = Stub::start(vec![
        Canned::json(200, json!({ "ok": true, "user": { "id": "U1" } })),
        Canned::json(200, json!({ "ok": true, "channel": { "id": "D1" } })),
        Canned::json(200, json!({ "ok": true })),
    ])
    .await;
    let config = SlackConfig::new(&stub.url, "t").with_alias("dev@example.com", "d@example.com");
    let client = SlackClient::new(&config).unwrap();
    client.message_email("dev@example.com", "you have bugs").await.unwrap();

    let requests = stub.requests();
    assert!(requests[0].target.starts_with("/users.lookupByEmail?"));
    assert_eq!(requests[0].query_values("email"), vec!["d%40example.com"]);
    assert_eq!(requests[1].target, "/conversations.open");
    let post: serde_json::Value = serde_json::from_str(&requests[2].body).unwrap();
    assert_eq!(post["channel"], "D1");
}

#[tokio::test]
async fn slack_api_error_surfaces() {
    let stub = Stub::start(vec![Canned::json(200, json!({ "ok": false, "error": "not_in_channel" }))]).await;
    let client = SlackClient::new(&SlackConfig::new(&stub.url, "t")).unwrap();
    let err = client.message_channel("#x", "hi").await.unwrap_err();
    assert!(matches!(err, SourceError::Chat(ref e) if e == "not_in_channel"));
}
