mod common;

use serde_json::json;
use spsync_core::{upsert_columns, ColumnDefinition, ColumnPatch, ListBackend};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{client_for, library};

const VERBOSE: &str = "application/json;odata=verbose";
const FIELDS: &str = "/sites/Team/_api/web/lists(guid'list-1')/fields";

fn fields_response() -> serde_json::Value {
    json!({ "d": { "results": [
        {
            "__metadata": { "type": "SP.FieldText" },
            "Id": "f-1",
            "InternalName": "ptd_versjon",
            "StaticName": "ptd_versjon",
            "Title": "Versjon",
            "Description": "Forrige versjon",
            "CustomFormatter": null
        },
        {
            "__metadata": { "type": "SP.FieldMultiChoice" },
            "Id": "f-2",
            "InternalName": "ptd_publisering",
            "StaticName": "ptd_publisering",
            "Title": "Publiseres til",
            "Description": "",
            "CustomFormatter": "{\"elmType\":\"div\"}",
            "Choices": { "__metadata": { "type": "Collection(Edm.String)" }, "results": ["Innsida", "Web"] }
        }
    ]}})
}

#[tokio::test]
async fn test_get_columns_uses_sharepoint_audience_and_verbose_odata() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FIELDS))
        .and(query_param(
            "$select",
            "Id,CustomFormatter,InternalName,StaticName,Title,Choices,Description",
        ))
        .and(header("accept", VERBOSE))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fields_response()))
        .expect(1)
        .mount(&server)
        .await;

    let t = client_for(&server);
    let columns = t.client.backend().get_columns(&library()).await.unwrap();

    assert_eq!(columns.len(), 2);
    assert_eq!(columns[0].name, "ptd_versjon");
    assert_eq!(columns[0].display_name, "Versjon");
    assert_eq!(columns[1].choices, vec!["Innsida", "Web"]);
    assert_eq!(columns[1].type_tag, "SP.FieldMultiChoice");
    assert_eq!(
        t.tokens.scopes(),
        vec!["https://contoso.sharepoint.com/.default".to_string()]
    );
}

#[tokio::test]
async fn test_modify_column_is_merge_post() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("{FIELDS}('f-1')")))
        .and(header("X-HTTP-Method", "MERGE"))
        .and(header("content-type", VERBOSE))
        .and(body_json(json!({
            "__metadata": { "type": "SP.FieldText" },
            "Title": "Publisert versjon"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let patch = ColumnPatch {
        type_tag: Some("SP.FieldText".into()),
        display_name: Some("Publisert versjon".into()),
        ..Default::default()
    };
    let t = client_for(&server);
    t.client
        .backend()
        .modify_column(&library(), "f-1", &patch)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_view_operations() {
    let server = MockServer::start().await;
    let views = "/sites/Team/_api/web/lists(guid'list-1')/views";

    Mock::given(method("POST"))
        .and(path(views))
        .and(query_param("$expand", "ViewFields"))
        .and(body_json(json!({
            "__metadata": { "type": "SP.View" },
            "Title": "Publisering",
            "PersonalView": false
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "d": {
            "Id": "v-9",
            "Title": "Publisering",
            "DefaultView": false,
            "ViewFields": { "__deferred": { "uri": "https://contoso.sharepoint.com/x" } }
        }})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{views}('v-9')/viewfields/addviewfield('ptd_versjon')")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{views}('v-9')/viewfields/removeviewfield('Editor')")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{views}/getbytitle('Gammel')")))
        .and(header("X-HTTP-Method", "DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let t = client_for(&server);
    let backend = t.client.backend();
    let lib = library();

    let view = backend.add_view(&lib, "Publisering").await.unwrap();
    assert_eq!(view.id, "v-9");
    assert!(view.columns.is_empty());

    backend.add_view_field(&lib, "v-9", "ptd_versjon").await.unwrap();
    backend.remove_view_field(&lib, "v-9", "Editor").await.unwrap();
    backend.remove_view(&lib, "Gammel").await.unwrap();
}

#[tokio::test]
async fn test_get_views_reads_expanded_fields() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sites/Team/_api/web/lists(guid'list-1')/views"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "d": { "results": [
            {
                "Id": "v-1",
                "Title": "Alle dokumenter",
                "DefaultView": true,
                "ViewFields": { "Items": { "results": ["DocIcon", "LinkFilename", "Modified"] } }
            }
        ]}})))
        .mount(&server)
        .await;

    let t = client_for(&server);
    let views = t.client.backend().get_views(&library()).await.unwrap();

    assert_eq!(views.len(), 1);
    assert!(views[0].is_default);
    assert_eq!(views[0].columns, vec!["DocIcon", "LinkFilename", "Modified"]);
}

#[tokio::test]
async fn test_content_type_lookup_and_update() {
    let server = MockServer::start().await;
    let content_types = "/sites/Team/_api/web/lists('list-1')/contenttypes";
    let formatter = json!({ "headerJSONFormatter": { "elmType": "div" } });

    Mock::given(method("GET"))
        .and(path(content_types))
        .and(query_param("$filter", "Name eq 'Element'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "d": { "results": [
            { "StringId": "0x0100AB", "Name": "Element", "ClientFormCustomFormatter": "" }
        ]}})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{content_types}('0x0100AB')")))
        .and(header("X-HTTP-Method", "MERGE"))
        .and(body_json(json!({
            "__metadata": { "type": "SP.ContentType" },
            "ClientFormCustomFormatter": "{\"headerJSONFormatter\":{\"elmType\":\"div\"}}"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let t = client_for(&server);
    let backend = t.client.backend();

    let found = backend
        .get_content_types(&library(), Some("Element"))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "0x0100AB");
    assert!(found[0].client_form_custom_formatter.is_none());

    backend
        .update_content_type_formatter(&library(), "0x0100AB", &formatter)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_upsert_columns_against_sharepoint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FIELDS))
        .respond_with(ResponseTemplate::new(200).set_body_json(fields_response()))
        .expect(1)
        .mount(&server)
        .await;

    // Title drift on the existing column
    Mock::given(method("POST"))
        .and(path(format!("{FIELDS}('f-1')")))
        .and(body_json(json!({
            "__metadata": { "type": "SP.FieldText" },
            "Title": "Publisert versjon"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    // Missing column is created through Graph ...
    Mock::given(method("POST"))
        .and(path("/v1.0/sites/site-1/lists/list-1/columns"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "new-col" })))
        .expect(1)
        .mount(&server)
        .await;

    // ... and gets its formatter through REST
    Mock::given(method("POST"))
        .and(path(format!("{FIELDS}('new-col')")))
        .and(body_json(json!({ "CustomFormatter": "{\"elmType\":\"span\"}" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let desired = vec![
        ColumnDefinition::new("ptd_versjon", "Publisert versjon", "Forrige versjon"),
        ColumnDefinition::new("ptd_publisering", "Publiseres til", "")
            .with_choices(["Web", "Innsida"])
            .with_formatter("{\"elmType\":\"div\"}"),
        ColumnDefinition::new("ptd_status", "Status", "")
            .with_facet("text", json!({}))
            .with_formatter("{\"elmType\":\"span\"}"),
    ];

    let t = client_for(&server);
    let report = upsert_columns(&t.client.backend(), &library(), &desired)
        .await
        .unwrap();

    assert_eq!(report.modified, vec!["ptd_versjon"]);
    assert_eq!(report.unchanged, vec!["ptd_publisering"]);
    assert_eq!(report.created, vec!["ptd_status"]);
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn test_content_type_filter_is_query_encoded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sites/Team/_api/web/lists('list-1')/contenttypes"))
        .and(query_param("$filter", "Name eq 'Sak #12 Kari''s'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "d": { "results": [
            { "StringId": "0x0100CD", "Name": "Sak #12 Kari's" }
        ]}})))
        .expect(1)
        .mount(&server)
        .await;

    let t = client_for(&server);
    let found = t
        .client
        .backend()
        .get_content_types(&library(), Some("Sak #12 Kari's"))
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "0x0100CD");
}
