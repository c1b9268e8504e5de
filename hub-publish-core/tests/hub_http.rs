use httpmock::prelude::*;
use serde_json::json;
use tempfile::tempdir;

use hub_publish_core::client::HubClient;
use hub_publish_core::config::{HubConfig, RepositoryConfig, SiteConfig};
use hub_publish_core::contract::{Blob, DownloadService, GitData, NewDownload, Reference, TreeEntry};
use hub_publish_core::credentials::Credentials;
use hub_publish_core::data::DataService;
use hub_publish_core::downloads::ReleaseAssets;
use hub_publish_core::repository::RepositoryId;
use hub_publish_core::settings::{Proxy, Settings};
use hub_publish_core::site::{publish_site, RefUpdate, SiteOutcome};
use hub_publish_core::PublishError;

fn token() -> Credentials {
    Credentials::Token("t0ken".into())
}

fn client(server: &MockServer, credentials: &Credentials) -> HubClient {
    HubClient::new(Some(&server.base_url()), credentials, None).expect("client should build")
}

fn repo() -> RepositoryId {
    RepositoryId::new("octo", "site").unwrap()
}

/// Generous quota so the limiter never delays a test.
async fn mock_rate_limit(server: &MockServer) -> httpmock::Mock<'_> {
    let reset = chrono::Utc::now().timestamp() + 1;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v3/rate_limit");
            then.status(200)
                .header("X-RateLimit-Remaining", "100000")
                .header("X-RateLimit-Reset", reset.to_string())
                .json_body(json!({"resources": {}}));
        })
        .await
}

#[tokio::test]
async fn token_and_user_agent_are_sent() {
    let server = MockServer::start_async().await;
    let user = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v3/user")
                .header("authorization", "token t0ken")
                .header_exists("user-agent");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"login": "octocat", "name": "The Octocat"}));
        })
        .await;

    let data = DataService::new(client(&server, &token()));
    let found = data.get_user().await.expect("user lookup should succeed");
    assert_eq!(found.login, "octocat");
    user.assert_async().await;
}

#[tokio::test]
async fn basic_credentials_are_encoded() {
    let server = MockServer::start_async().await;
    let emails = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v3/user/emails")
                .header("authorization", "Basic YTpi");
            then.status(200)
                .json_body(json!([{"email": "a@example.com", "primary": true, "verified": true}]));
        })
        .await;

    let credentials = Credentials::Basic {
        user: "a".into(),
        password: "b".into(),
    };
    let data = DataService::new(client(&server, &credentials));
    let found = data.get_emails().await.unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].primary);
    emails.assert_async().await;
}

#[tokio::test]
async fn rate_limit_is_probed_once_for_mutations() {
    let server = MockServer::start_async().await;
    let rate_limit = mock_rate_limit(&server).await;
    let blobs = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v3/repos/octo/site/git/blobs")
                .json_body(json!({"encoding": "base64", "content": "aGVsbG8="}));
            then.status(201)
                .json_body(json!({"sha": "b45ef6fec89518d314f546fd6c3025367b721684", "url": "x"}));
        })
        .await;

    let data = DataService::new(client(&server, &token()));
    for _ in 0..3 {
        let sha = data.create_blob(&repo(), Blob::base64(b"hello")).await.unwrap();
        assert_eq!(sha, "b45ef6fec89518d314f546fd6c3025367b721684");
    }

    blobs.assert_calls_async(3).await;
    rate_limit.assert_calls_async(1).await;
}

#[tokio::test]
async fn reads_and_deletes_are_not_limited() {
    let server = MockServer::start_async().await;
    let rate_limit = mock_rate_limit(&server).await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v3/repos/octo/site/git/commits/abc");
            then.status(200).json_body(json!({
                "sha": "abc",
                "message": "m",
                "tree": {"sha": "tree"},
                "parents": [{"sha": "p"}]
            }));
        })
        .await;
    let delete = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/api/v3/repos/octo/site/releases/assets/42");
            then.status(204);
        })
        .await;

    let hub = client(&server, &token());
    let commit = DataService::new(hub.clone()).get_commit(&repo(), "abc").await.unwrap();
    assert_eq!(commit.tree.sha, "tree");
    assert_eq!(commit.parents[0].sha, "p");
    ReleaseAssets::new(hub).delete_download(&repo(), 42).await.unwrap();

    delete.assert_async().await;
    rate_limit.assert_calls_async(0).await;
}

#[tokio::test]
async fn failed_probe_falls_back_and_still_sends() {
    let server = MockServer::start_async().await;
    let rate_limit = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v3/rate_limit");
            then.status(500);
        })
        .await;
    let refs = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v3/repos/octo/site/git/refs")
                .json_body(json!({"ref": "refs/heads/gh-pages", "sha": "c0ffee"}));
            then.status(201).json_body(json!({
                "ref": "refs/heads/gh-pages",
                "object": {"type": "commit", "sha": "c0ffee"}
            }));
        })
        .await;

    let data = DataService::new(client(&server, &token()));
    let created = data
        .create_reference(&repo(), Reference::to_commit("refs/heads/gh-pages", "c0ffee"))
        .await
        .unwrap();
    assert_eq!(created.object.sha, "c0ffee");
    rate_limit.assert_async().await;
    refs.assert_async().await;
}

#[tokio::test]
async fn error_document_becomes_hub_error() {
    let server = MockServer::start_async().await;
    mock_rate_limit(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v3/repos/octo/site/git/trees");
            then.status(422).json_body(json!({
                "message": "Invalid tree info",
                "errors": [{"resource": "Tree", "field": "sha", "code": "invalid"}]
            }));
        })
        .await;

    let data = DataService::new(client(&server, &token()));
    let err = data
        .create_tree(&repo(), vec![TreeEntry::blob("a", "nope")], None)
        .await
        .unwrap_err();
    match err {
        PublishError::Hub {
            status,
            message,
            errors,
        } => {
            assert_eq!(status, 422);
            assert_eq!(message, "Invalid tree info");
            assert_eq!(errors[0].code.as_deref(), Some("invalid"));
        }
        other => panic!("expected Hub error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_reference_is_not_found() {
    let server = MockServer::start_async().await;
    let reference = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v3/repos/octo/site/git/refs/heads/gh-pages");
            then.status(404).json_body(json!({"message": "Not Found"}));
        })
        .await;

    let data = DataService::new(client(&server, &token()));
    let err = data
        .get_reference(&repo(), "refs/heads/gh-pages")
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err:?}");
    reference.assert_async().await;
}

#[tokio::test]
async fn edit_reference_patches_sha_and_force() {
    let server = MockServer::start_async().await;
    mock_rate_limit(&server).await;
    let patch = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/api/v3/repos/octo/site/git/refs/heads/gh-pages")
                .json_body(json!({"sha": "new", "force": true}));
            then.status(200).json_body(json!({
                "ref": "refs/heads/gh-pages",
                "object": {"type": "commit", "sha": "new"}
            }));
        })
        .await;

    let data = DataService::new(client(&server, &token()));
    data.edit_reference(&repo(), Reference::to_commit("refs/heads/gh-pages", "new"), true)
        .await
        .unwrap();
    patch.assert_async().await;
}

#[tokio::test]
async fn merge_tree_sends_base_tree() {
    let server = MockServer::start_async().await;
    mock_rate_limit(&server).await;
    let trees = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v3/repos/octo/site/git/trees")
                .json_body(json!({
                    "tree": [{"path": "b.html", "mode": "100644", "type": "blob", "sha": "b"}],
                    "base_tree": "prior"
                }));
            then.status(201).json_body(json!({
                "sha": "merged",
                "tree": [
                    {"path": "a.html", "mode": "100644", "type": "blob", "sha": "a", "size": 1},
                    {"path": "b.html", "mode": "100644", "type": "blob", "sha": "b", "size": 1}
                ]
            }));
        })
        .await;

    let data = DataService::new(client(&server, &token()));
    let tree = data
        .create_tree(&repo(), vec![TreeEntry::blob("b.html", "b")], Some("prior".into()))
        .await
        .unwrap();
    assert_eq!(tree.sha, "merged");
    assert_eq!(tree.tree.len(), 2);
    trees.assert_async().await;
}

#[tokio::test]
async fn release_assets_resolve_release_once() {
    let server = MockServer::start_async().await;
    mock_rate_limit(&server).await;
    let upload_url = format!(
        "{}/uploads/repos/octo/site/releases/5/assets{{?name,label}}",
        server.base_url()
    );
    let release = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v3/repos/octo/site/releases/tags/v1.0.0");
            then.status(200)
                .json_body(json!({"id": 5, "tag_name": "v1.0.0", "upload_url": upload_url}));
        })
        .await;
    let assets = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v3/repos/octo/site/releases/5/assets")
                .query_param("per_page", "100");
            then.status(200)
                .json_body(json!([{"id": 1, "name": "tool.jar", "size": 3, "label": null}]));
        })
        .await;
    let upload = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/uploads/repos/octo/site/releases/5/assets")
                .query_param("name", "tool.jar")
                .query_param("label", "Release binaries")
                .header("content-type", "application/octet-stream")
                .body("jar");
            then.status(201)
                .json_body(json!({"id": 2, "name": "tool.jar", "size": 3}));
        })
        .await;

    let dir = tempdir().unwrap();
    let path = dir.path().join("tool.jar");
    std::fs::write(&path, "jar").unwrap();

    let service = ReleaseAssets::new(client(&server, &token()));
    let listed = service.list_downloads(&repo(), "v1.0.0").await.unwrap();
    assert_eq!(listed[0].name, "tool.jar");

    let created = service
        .create_download(
            &repo(),
            "v1.0.0",
            NewDownload {
                name: "tool.jar".into(),
                description: Some("Release binaries".into()),
                path,
                size: 3,
            },
        )
        .await
        .unwrap();
    assert_eq!(created.id, 2);

    release.assert_calls_async(1).await;
    assets.assert_async().await;
    upload.assert_async().await;
}

#[tokio::test]
async fn first_publish_over_http() {
    let server = MockServer::start_async().await;
    mock_rate_limit(&server).await;
    let get_ref = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v3/repos/octo/site/git/refs/heads/gh-pages");
            then.status(404).json_body(json!({"message": "Not Found"}));
        })
        .await;
    let blob = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v3/repos/octo/site/git/blobs")
                .json_body(json!({"encoding": "base64", "content": "aGVsbG8="}));
            then.status(201).json_body(json!({"sha": "blob1"}));
        })
        .await;
    let tree = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v3/repos/octo/site/git/trees")
                .json_body(json!({
                    "tree": [{"path": "index.html", "mode": "100644", "type": "blob", "sha": "blob1"}]
                }));
            then.status(201).json_body(json!({"sha": "tree1", "tree": []}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v3/user");
            then.status(401).json_body(json!({"message": "Requires authentication"}));
        })
        .await;
    let commit = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v3/repos/octo/site/git/commits")
                .json_body(json!({"message": "Site", "tree": "tree1", "parents": []}));
            then.status(201).json_body(json!({"sha": "commit1", "tree": {"sha": "tree1"}}));
        })
        .await;
    let create_ref = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v3/repos/octo/site/git/refs")
                .json_body(json!({"ref": "refs/heads/gh-pages", "sha": "commit1"}));
            then.status(201).json_body(json!({
                "ref": "refs/heads/gh-pages",
                "object": {"type": "commit", "sha": "commit1"}
            }));
        })
        .await;

    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "hello").unwrap();
    let config = SiteConfig {
        message: Some("Site".into()),
        output_directory: Some(dir.path().to_path_buf()),
        ..SiteConfig::default()
    };
    let target = RepositoryConfig {
        owner: Some("octo".into()),
        name: Some("site".into()),
    };

    let data = DataService::new(client(&server, &token()));
    let outcome = publish_site(&data, &config, &target, None).await.unwrap();
    let SiteOutcome::Published(report) = outcome else {
        panic!("expected a publication");
    };
    assert_eq!(report.update, RefUpdate::Created);
    assert_eq!(report.commit_sha, "commit1");

    get_ref.assert_async().await;
    blob.assert_async().await;
    tree.assert_async().await;
    commit.assert_async().await;
    create_ref.assert_async().await;
}

fn proxy_at(server: &MockServer, credentials: Option<(&str, &str)>) -> Proxy {
    Proxy {
        id: Some("corp".into()),
        active: true,
        protocol: "http".into(),
        host: server.host(),
        port: server.port(),
        username: credentials.map(|(user, _)| user.to_string()),
        password: credentials.map(|(_, password)| password.to_string()),
        non_proxy_hosts: None,
    }
}

#[tokio::test]
async fn requests_are_routed_through_proxy() {
    // The Hub host does not resolve; only the proxy can answer.
    let proxy = MockServer::start_async().await;
    let user = proxy
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v3/user")
                .header("host", "ghe.invalid")
                .header("authorization", "token t0ken");
            then.status(200).json_body(json!({"login": "via-proxy"}));
        })
        .await;

    let client = HubClient::new(Some("http://ghe.invalid"), &token(), Some(&proxy_at(&proxy, None)))
        .expect("client should build");
    let found = DataService::new(client).get_user().await.expect("proxied lookup should succeed");
    assert_eq!(found.login, "via-proxy");
    user.assert_async().await;
}

#[tokio::test]
async fn proxy_credentials_from_settings_are_sent() {
    let proxy = MockServer::start_async().await;
    let emails = proxy
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v3/user/emails")
                .header("host", "ghe.invalid")
                .header("proxy-authorization", "Basic dTpw");
            then.status(200)
                .json_body(json!([{"email": "a@example.com", "primary": true, "verified": true}]));
        })
        .await;

    let config = HubConfig {
        host: Some("http://ghe.invalid".into()),
        oauth2_token: Some("t0ken".into()),
        ..HubConfig::default()
    };
    let settings = Settings {
        servers: vec![],
        proxies: vec![proxy_at(&proxy, Some(("u", "p")))],
    };
    let client = HubClient::from_config(&config, Some(&settings)).expect("client should build");
    let found = DataService::new(client).get_emails().await.unwrap();
    assert_eq!(found[0].email, "a@example.com");
    emails.assert_async().await;
}

#[tokio::test]
async fn asset_listing_follows_next_pages() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v3/repos/octo/site/releases/tags/v1.0.0");
            then.status(200)
                .json_body(json!({"id": 5, "upload_url": "http://unused/assets{?name,label}"}));
        })
        .await;
    let next = server.url("/api/v3/repos/octo/site/releases/5/assets?per_page=100&page=2");
    let first = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v3/repos/octo/site/releases/5/assets")
                .query_param_missing("page");
            then.status(200)
                .header("link", format!(r#"<{next}>; rel="next", <{next}>; rel="last""#))
                .json_body(json!([{"id": 1, "name": "a.jar", "size": 1}]));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v3/repos/octo/site/releases/5/assets")
                .query_param("page", "2");
            then.status(200)
                .json_body(json!([{"id": 2, "name": "b.jar", "size": 2}]));
        })
        .await;

    let service = ReleaseAssets::new(client(&server, &token()));
    let listed = service.list_downloads(&repo(), "v1.0.0").await.unwrap();
    let names: Vec<_> = listed.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["a.jar", "b.jar"]);

    first.assert_calls_async(1).await;
    second.assert_calls_async(1).await;
}

#[tokio::test]
async fn refused_connection_is_transport_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = HubClient::new(Some(&format!("http://127.0.0.1:{port}")), &token(), None).unwrap();

    let err = DataService::new(client)
        .get_user()
        .await
        .expect_err("nothing listens on the port");
    assert!(matches!(err, PublishError::Transport(_)), "unexpected error: {err:?}");
}
