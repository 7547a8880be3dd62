use serde_json::json;
use wiremock::matchers::{body_json, body_bytes, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use onedrive_core::{
    ConflictBehavior, DriveClient, DriveError, DriveTarget, ItemLocator, ItemReference,
    ODataQuery, PreviewOptions, SimpleUploadTarget,
};

fn client(server: &MockServer) -> DriveClient {
    DriveClient::with_base_url(&format!("{}/v1.0", server.uri()), "test-token").unwrap()
}

#[tokio::test]
async fn item_by_path_includes_bearer_header_and_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me/drive/root:/Docs/report.pdf:"))
        .and(header("authorization", "Bearer test-token"))
        .and(query_param("$select", "id,name,size"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "01REPORT",
            "name": "report.pdf",
            "size": 2048
        })))
        .mount(&server)
        .await;

    let query = ODataQuery::new().select(&["id", "name", "size"]);
    let item = client(&server)
        .item(&ItemLocator::path("Docs/report.pdf"), Some(&query))
        .await
        .unwrap();

    assert_eq!(item.id, "01REPORT");
    assert_eq!(item.size, Some(2048));
    assert!(!item.is_folder());
}

#[tokio::test]
async fn drive_target_changes_prefix() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/drives/b!drive/items/ITEM1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "ITEM1" })))
        .mount(&server)
        .await;

    let mut client = client(&server);
    client.set_drive(DriveTarget::Drives("b!drive".into()));
    let item = client.item(&ItemLocator::id("ITEM1"), None).await.unwrap();

    assert_eq!(item.id, "ITEM1");
}

#[tokio::test]
async fn children_all_follows_next_links() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me/drive/root/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "id": "A", "name": "a.txt", "file": {} },
                { "id": "B", "name": "Photos", "folder": { "childCount": 3 } }
            ],
            "@odata.nextLink": format!("{}/v1.0/next-page", server.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/next-page"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [ { "id": "C", "name": "c.txt" } ]
        })))
        .mount(&server)
        .await;

    let items = client(&server)
        .children_all(&ItemLocator::root(), None)
        .await
        .unwrap();

    let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
    assert!(items[1].is_folder());
}

#[tokio::test]
async fn create_folder_posts_conflict_behavior() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1.0/me/drive/items/PARENT/children"))
        .and(body_json(json!({
            "name": "NewFolder",
            "folder": {},
            "@microsoft.graph.conflictBehavior": "rename"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "NEW",
            "name": "NewFolder",
            "folder": { "childCount": 0 }
        })))
        .mount(&server)
        .await;

    let folder = client(&server)
        .create_folder(&ItemLocator::id("PARENT"), "NewFolder", ConflictBehavior::Rename)
        .await
        .unwrap();

    assert!(folder.is_folder());
    assert_eq!(folder.name.as_deref(), Some("NewFolder"));
}

#[tokio::test]
async fn move_and_rename_patch_the_item() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/v1.0/me/drive/items/ITEM"))
        .and(body_json(json!({ "parentReference": { "id": "DEST" }, "name": "moved.txt" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "ITEM", "name": "moved.txt" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/v1.0/me/drive/items/ITEM"))
        .and(body_json(json!({ "name": "renamed.txt" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "ITEM", "name": "renamed.txt" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let locator = ItemLocator::id("ITEM");
    let moved = client
        .move_item(&locator, "DEST", Some("moved.txt"))
        .await
        .unwrap();
    let renamed = client.rename(&locator, "renamed.txt").await.unwrap();

    assert_eq!(moved.name.as_deref(), Some("moved.txt"));
    assert_eq!(renamed.name.as_deref(), Some("renamed.txt"));
}

#[tokio::test]
async fn copy_returns_monitor_location() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1.0/me/drive/items/ITEM/copy"))
        .and(body_json(json!({
            "parentReference": { "driveId": "D1", "id": "DEST" },
            "name": "copy.txt",
        })))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("location", "https://monitor.example/jobs/42"),
        )
        .mount(&server)
        .await;

    let parent = ItemReference {
        drive_id: Some("D1".into()),
        id: Some("DEST".into()),
        ..ItemReference::default()
    };
    let monitor = client(&server)
        .copy_item(&ItemLocator::id("ITEM"), Some(&parent), Some("copy.txt"))
        .await
        .unwrap();

    assert_eq!(
        monitor.map(|url| url.to_string()).as_deref(),
        Some("https://monitor.example/jobs/42")
    );
}

#[tokio::test]
async fn delete_accepts_no_content_and_reports_api_errors() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v1.0/me/drive/items/GONE"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1.0/me/drive/items/MISSING"))
        .respond_with(ResponseTemplate::new(404).set_body_string("itemNotFound"))
        .mount(&server)
        .await;

    let client = client(&server);
    client.delete(&ItemLocator::id("GONE")).await.unwrap();
    let err = client.delete(&ItemLocator::id("MISSING")).await.unwrap_err();

    match err {
        DriveError::Api { status, body } => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(body, "itemNotFound");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn download_url_reads_redirect_location_with_range() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me/drive/root:/big.iso:/content"))
        .and(header("range", "bytes=0-1023"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", "https://download.example/big.iso?sig=abc"),
        )
        .mount(&server)
        .await;

    let url = client(&server)
        .download_url(&ItemLocator::path("big.iso"), Some((0, 1023)), None)
        .await
        .unwrap();

    assert_eq!(url.as_str(), "https://download.example/big.iso?sig=abc");
}

#[tokio::test]
async fn search_escapes_quotes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me/drive/root/search(q='bob''s')"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [ { "id": "HIT", "name": "bob's notes.txt" } ]
        })))
        .mount(&server)
        .await;

    let hits = client(&server)
        .search(&ItemLocator::root(), "bob's")
        .await
        .unwrap();

    assert_eq!(hits.value.len(), 1);
    assert_eq!(hits.value[0].id, "HIT");
}

#[tokio::test]
async fn delta_passes_token_and_exposes_delta_link() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me/drive/root/delta"))
        .and(query_param("token", "latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [],
            "@odata.deltaLink": "https://graph.example/v1.0/me/drive/root/delta?token=next"
        })))
        .mount(&server)
        .await;

    let page = client(&server)
        .delta(&ItemLocator::root(), Some(&ODataQuery::new().param("token", "latest")))
        .await
        .unwrap();

    assert!(page.value.is_empty());
    assert!(page.next_link.is_none());
    assert_eq!(
        page.delta_link.unwrap().query(),
        Some("token=next")
    );
}

#[tokio::test]
async fn thumbnails_list_and_single_size() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me/drive/items/PIC/thumbnails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{
                "id": "0",
                "small": { "width": 96, "height": 96, "url": "https://t.example/s" },
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/me/drive/items/PIC/thumbnails/0/small"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "width": 96, "height": 96, "url": "https://t.example/s"
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let locator = ItemLocator::id("PIC");
    let sets = client.thumbnails(&locator, None).await.unwrap();
    let small = client.thumbnail(&locator, "0", "small").await.unwrap();

    assert_eq!(sets.value[0].small.as_ref().unwrap().width, Some(96));
    assert_eq!(small.url.as_deref(), Some("https://t.example/s"));
}

#[tokio::test]
async fn upload_simple_puts_into_parent_folder() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v1.0/me/drive/root:/Docs/hello.txt:/content"))
        .and(body_bytes(b"hello".to_vec()))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "HELLO", "name": "hello.txt", "size": 5
        })))
        .mount(&server)
        .await;

    let target = SimpleUploadTarget::New {
        parent: ItemLocator::path("Docs/"),
        file_name: "hello.txt".into(),
    };
    let item = client(&server)
        .upload_simple(&target, b"hello".to_vec())
        .await
        .unwrap();

    assert_eq!(item.size, Some(5));
}

#[tokio::test]
async fn create_upload_session_posts_to_item() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1.0/me/drive/root:/Videos/clip.mp4:/createUploadSession"))
        .and(body_json(json!({
            "item": { "@microsoft.graph.conflictBehavior": "replace" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uploadUrl": "https://upload.example/session/xyz",
            "expirationDateTime": "2026-10-19T10:00:00Z",
            "nextExpectedRanges": ["0-"]
        })))
        .mount(&server)
        .await;

    let session = client(&server)
        .create_upload_session(&ItemLocator::path("Videos/clip.mp4"), ConflictBehavior::Replace)
        .await
        .unwrap();

    assert_eq!(session.upload_url.as_str(), "https://upload.example/session/xyz");
    assert_eq!(session.next_expected_ranges, vec!["0-"]);
}

#[tokio::test]
async fn custom_defaults_method_from_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me/drive/items/DOC/versions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "value": [{ "id": "1.0" }] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1.0/me/drive/items/DOC/versions/1.0/restoreVersion"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = client(&server);
    let locator = ItemLocator::id("DOC");
    let versions = client
        .custom(&locator, "versions", None, None, None)
        .await
        .unwrap();
    let restored = client
        .custom(&locator, "versions/1.0/restoreVersion", None, Some(&json!({})), None)
        .await
        .unwrap();

    assert_eq!(versions["value"][0]["id"], "1.0");
    assert!(restored.is_null());
}

#[tokio::test]
async fn preview_posts_options() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1.0/me/drive/items/DOC/preview"))
        .and(body_json(json!({ "viewer": "office", "chromeless": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "getUrl": "https://preview.example/doc"
        })))
        .mount(&server)
        .await;

    let options = PreviewOptions {
        viewer: Some("office".into()),
        chromeless: Some(true),
        ..PreviewOptions::default()
    };
    let links = client(&server)
        .preview(&ItemLocator::id("DOC"), &options)
        .await
        .unwrap();

    assert_eq!(links.get_url.as_deref(), Some("https://preview.example/doc"));
    assert!(links.post_url.is_none());
}

#[tokio::test]
async fn checkout_and_checkin_post_to_item() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1.0/me/drive/items/DOC/checkout"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1.0/me/drive/items/DOC/checkin"))
        .and(body_json(json!({ "comment": "done" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let locator = ItemLocator::id("DOC");
    client.checkout(&locator).await.unwrap();
    client.checkin(&locator, "done").await.unwrap();
}

#[tokio::test]
async fn thumbnail_content_url_comes_from_redirect() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me/drive/items/PIC/thumbnails/0/large/content"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "https://t.example/large.jpg"),
        )
        .mount(&server)
        .await;

    let url = client(&server)
        .thumbnail_content_url(&ItemLocator::id("PIC"), "0", "large")
        .await
        .unwrap();

    assert_eq!(url.as_str(), "https://t.example/large.jpg");
}
