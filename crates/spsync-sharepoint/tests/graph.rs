mod common;

use std::time::Duration;

use serde_json::json;
use spsync_core::{ColumnDefinition, DriveItemRef, ListBackend, SyncError};
use spsync_sharepoint::{RequestOptions, TransportConfig};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{client_for, client_with_transport, library};

const LISTS: &str = "/v1.0/sites/site-1/lists";

#[tokio::test]
async fn test_paged_request_follows_next_link_and_keeps_delta() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LISTS))
        .and(query_param("$skiptoken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "c" }],
            "@odata.deltaLink": "https://graph.microsoft.com/v1.0/sites/site-1/lists/delta?token=d1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(LISTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "a" }, { "id": "b" }],
            "@odata.nextLink": format!("{}{}?$skiptoken=p2", server.uri(), LISTS)
        })))
        .expect(1)
        .mount(&server)
        .await;

    let t = client_for(&server);
    let result = t
        .client
        .graph
        .paged_request("sites/site-1/lists", &RequestOptions::get())
        .await
        .unwrap();

    let ids: Vec<&str> = result.value.iter().map(|v| v["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(result.count(), 3);
    assert_eq!(
        result.delta_link.as_deref(),
        Some("https://graph.microsoft.com/v1.0/sites/site-1/lists/delta?token=d1")
    );
}

#[tokio::test]
async fn test_first_page_mode_stops_early() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LISTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "a" }],
            "@odata.nextLink": format!("{}{}?$skiptoken=p2", server.uri(), LISTS)
        })))
        .expect(1)
        .mount(&server)
        .await;

    let t = client_for(&server);
    let result = t
        .client
        .graph
        .paged_request("sites/site-1/lists", &RequestOptions::get().first_page())
        .await
        .unwrap();

    assert_eq!(result.count(), 1);
    assert!(result.delta_link.is_none());
}

#[tokio::test]
async fn test_page_failing_three_times_returns_error_not_partial_result() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LISTS))
        .and(query_param("$skiptoken", "p2"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(LISTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "a" }],
            "@odata.nextLink": format!("{}{}?$skiptoken=p2", server.uri(), LISTS)
        })))
        .expect(1)
        .mount(&server)
        .await;

    let t = client_for(&server);
    let err = t
        .client
        .graph
        .paged_request("sites/site-1/lists", &RequestOptions::get())
        .await
        .unwrap_err();

    match err {
        SyncError::Remote { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_page_retried_until_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LISTS))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(LISTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [{ "id": "a" }] })))
        .expect(1)
        .mount(&server)
        .await;

    let t = client_for(&server);
    let result = t
        .client
        .graph
        .paged_request("sites/site-1/lists", &RequestOptions::get())
        .await
        .unwrap();

    assert_eq!(result.count(), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_unauthorized_forces_one_token_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me"))
        .and(header("authorization", "Bearer token-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "me" })))
        .expect(1)
        .mount(&server)
        .await;

    let t = client_for(&server);
    let body = t.client.graph.request("me", &RequestOptions::get()).await.unwrap();

    assert_eq!(body["id"], "me");
    assert_eq!(t.tokens.calls(), 2);
}

#[tokio::test]
async fn test_second_unauthorized_is_surfaced() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me"))
        .respond_with(ResponseTemplate::new(401).set_body_string("denied"))
        .expect(2)
        .mount(&server)
        .await;

    let t = client_for(&server);
    let err = t.client.graph.request("me", &RequestOptions::get()).await.unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(t.tokens.calls(), 2);
}

#[tokio::test]
async fn test_advanced_beta_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/beta/users"))
        .and(header("ConsistencyLevel", "eventual"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let t = client_for(&server);
    t.client
        .graph
        .request("users", &RequestOptions::get().beta().advanced())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_slow_response_is_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let t = client_with_transport(
        &server,
        TransportConfig {
            request_timeout: Duration::from_millis(200),
            ..TransportConfig::default()
        },
    );
    let err = t.client.graph.request("me", &RequestOptions::get()).await.unwrap_err();

    assert!(matches!(err, SyncError::Timeout(_)), "got {err:?}");
}

#[tokio::test]
async fn test_resolve_list_and_site_id() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/sites/contoso.sharepoint.com:/sites/Team:/lists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {
                    "id": "list-other",
                    "webUrl": "https://contoso.sharepoint.com/sites/Team/Lists/Other",
                    "parentReference": { "siteId": "contoso.sharepoint.com,site-guid,web-guid" }
                },
                {
                    "id": "list-docs",
                    "webUrl": "https://contoso.sharepoint.com/sites/Team/docs",
                    "parentReference": { "siteId": "contoso.sharepoint.com,site-guid,web-guid" }
                }
            ]
        })))
        .mount(&server)
        .await;

    let t = client_for(&server);
    let resolved = t
        .client
        .graph
        .get_list_and_site_id("https://contoso.sharepoint.com/sites/Team/Docs/")
        .await
        .unwrap();

    assert_eq!(resolved.list_id, "list-docs");
    assert_eq!(resolved.site_id, "site-guid");
    assert_eq!(resolved.site_name, "Team");
    assert_eq!(resolved.tenant, "contoso");

    let missing = t
        .client
        .graph
        .get_list_and_site_id("https://contoso.sharepoint.com/sites/Team/Archive")
        .await;
    assert!(matches!(missing, Err(SyncError::NotFound(_))));
}

#[tokio::test]
async fn test_create_column_posts_definition_to_graph() {
    let server = MockServer::start().await;
    let definition = ColumnDefinition::new("ptd_versjon", "Publisert versjon", "Forrige versjon")
        .with_facet("text", json!({}))
        .with_formatter("{}");

    Mock::given(method("POST"))
        .and(path("/v1.0/sites/site-1/lists/list-1/columns"))
        .and(body_json(definition.create_body()))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "col-9" })))
        .expect(1)
        .mount(&server)
        .await;

    let t = client_for(&server);
    let id = t
        .client
        .backend()
        .create_column(&library(), &definition)
        .await
        .unwrap();

    assert_eq!(id, "col-9");
}

#[tokio::test]
async fn test_drive_item_and_version_lookup() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/sites/site-1/lists/list-1/items/42/driveItem"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "i-1",
            "name": "Rutine.docx",
            "parentReference": { "driveId": "d-1" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/drives/d-1/items/i-1/versions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "3.0" }, { "id": "2.0" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/drives/d-1/items/i-1/versions/2.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "2.0", "size": 1024 })))
        .expect(1)
        .mount(&server)
        .await;

    let t = client_for(&server);
    let graph = &t.client.graph;

    let item = graph
        .get_drive_item_from_list_item("site-1", "list-1", "42")
        .await
        .unwrap();
    assert_eq!(item["parentReference"]["driveId"], "d-1");

    let item_ref = DriveItemRef::new("d-1", "i-1");
    let versions = graph.get_drive_item_versions(&item_ref).await.unwrap();
    assert_eq!(versions.len(), 2);

    let version = graph.get_drive_item_version(&item_ref, "2.0").await.unwrap();
    assert_eq!(version["size"], 1024);
}
