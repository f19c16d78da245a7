//! NntpClient and TcpConnector against a local NNTP server

mod common;

use common::{FakeServer, FakeServerOptions};
use nntp_courier::yenc::{decode_verified, encode_parts};
use nntp_courier::{
    Article, NntpClient, NntpError, NntpSession, ProviderConfig, SessionConnector, TcpConnector,
    generate_message_id,
};
use std::sync::Arc;

fn credentials() -> FakeServerOptions {
    FakeServerOptions {
        credentials: Some(("alice".to_string(), "secret".to_string())),
        ..FakeServerOptions::default()
    }
}

fn segment_article(data: &[u8], message_id: &str) -> Article {
    let parts = encode_parts(data, data.len(), 128, "blob.bin").unwrap();
    Article::for_segment(
        &parts[0],
        "\"blob.bin\" yEnc (1/1)",
        "poster <poster@example.com>",
        vec!["alt.binaries.test".to_string()],
        message_id,
    )
    .unwrap()
}

#[tokio::test]
async fn test_post_then_fetch_round_trip() {
    common::init_tracing();
    let server = FakeServer::start(credentials()).await;
    let config = Arc::new(server.provider().with_credentials("alice", "secret"));

    let mut client = NntpClient::connect(config).await.unwrap();
    assert!(client.posting_allowed());
    client.authenticate("alice", "secret").await.unwrap();
    assert!(client.is_authenticated());

    let data: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
    let id = generate_message_id("client.test");
    let article = segment_article(&data, &id);

    assert!(!client.stat(&id).await.unwrap());
    assert_eq!(client.post(&article).await.unwrap(), id);
    assert!(client.stat(&id).await.unwrap());

    let head = client.fetch_header(&id).await.unwrap();
    assert!(head.iter().any(|line| line.contains(&id)));

    let body = client.fetch_body(&id).await.unwrap();
    let decoded = decode_verified(&body).unwrap();
    assert_eq!(decoded.data, data);
    assert_eq!(decoded.header.name, "blob.bin");

    client.quit().await.unwrap();
    assert!(client.is_broken());
}

#[tokio::test]
async fn test_leading_dots_survive_transport() {
    let server = FakeServer::start(FakeServerOptions::default()).await;
    let mut client = NntpClient::connect(Arc::new(server.provider()))
        .await
        .unwrap();

    let id = generate_message_id("client.test");
    let mut article = Article::new(
        "dots",
        "poster <poster@example.com>",
        vec!["alt.test".to_string()],
        id.clone(),
        1,
        1,
    )
    .unwrap();
    article.body = vec![b".hidden".to_vec(), b"..double".to_vec(), b"plain".to_vec()];
    client.post(&article).await.unwrap();

    let body = client.fetch_body(&id).await.unwrap();
    assert_eq!(body, b".hidden\n..double\nplain\n");
}

#[tokio::test]
async fn test_rejected_credentials() {
    let server = FakeServer::start(credentials()).await;
    let mut client = NntpClient::connect(Arc::new(server.provider()))
        .await
        .unwrap();

    let err = client.authenticate("alice", "wrong").await.unwrap_err();
    assert!(matches!(err, NntpError::AuthRejected(_)), "got {err:?}");
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_read_only_greeting_blocks_posting() {
    let server = FakeServer::start(FakeServerOptions {
        greeting: "201 reading only".to_string(),
        ..FakeServerOptions::default()
    })
    .await;
    let mut client = NntpClient::connect(Arc::new(server.provider()))
        .await
        .unwrap();
    assert!(!client.posting_allowed());

    let article = segment_article(b"payload", &generate_message_id("client.test"));
    let err = client.post(&article).await.unwrap_err();
    assert!(matches!(err, NntpError::PostRejected(_)));
    assert!(!server.command_log().iter().any(|c| c == "POST"));
    assert_eq!(server.article_count(), 0);
}

#[tokio::test]
async fn test_duplicate_post_is_rejected() {
    let server = FakeServer::start(FakeServerOptions::default()).await;
    let mut client = NntpClient::connect(Arc::new(server.provider()))
        .await
        .unwrap();

    let article = segment_article(b"once", &generate_message_id("client.test"));
    client.post(&article).await.unwrap();
    let err = client.post(&article).await.unwrap_err();
    assert!(matches!(err, NntpError::PostRejected(_)), "got {err:?}");

    // A refused article leaves the session usable
    assert!(!client.is_broken());
    assert!(client.stat(&article.message_id).await.unwrap());
}

#[tokio::test]
async fn test_missing_article_and_group() {
    let server = FakeServer::start(FakeServerOptions::default()).await;
    let mut client = NntpClient::connect(Arc::new(server.provider()))
        .await
        .unwrap();

    let err = client.fetch_body("<absent@x>").await.unwrap_err();
    assert!(matches!(err, NntpError::NoSuchArticle(_)), "got {err:?}");
    let err = client.fetch_header("<absent@x>").await.unwrap_err();
    assert!(matches!(err, NntpError::NoSuchArticle(_)), "got {err:?}");

    let err = client.join_group("comp.nonexistent").await.unwrap_err();
    assert!(matches!(err, NntpError::NoSuchGroup(_)), "got {err:?}");

    let info = client.join_group("alt.binaries.test").await.unwrap();
    assert_eq!(info.name, "alt.binaries.test");
    assert_eq!(client.current_group(), Some("alt.binaries.test"));
}

#[tokio::test]
async fn test_list_groups_with_prefix_filter() {
    let server = FakeServer::start(FakeServerOptions::default()).await;
    let mut client = NntpClient::connect(Arc::new(server.provider()))
        .await
        .unwrap();

    let list = client.list_groups(Some("alt.*")).await.unwrap();
    let names: Vec<String> = list.iter().map(|g| g.name).collect();
    assert_eq!(names, vec!["alt.binaries.test", "alt.test"]);
    // Restartable
    assert_eq!(list.iter().count(), 2);

    let all = client.list_groups(None).await.unwrap();
    assert_eq!(all.iter().count(), 3);
}

#[tokio::test]
async fn test_connector_authenticates_and_falls_back_without_compression() {
    let server = FakeServer::start(credentials()).await;
    let provider = Arc::new(server.provider().with_credentials("alice", "secret"));

    let mut session = TcpConnector.connect(&provider).await.unwrap();
    let id = generate_message_id("client.test");
    session.post(&segment_article(b"abc", &id)).await.unwrap();
    assert!(session.stat(&id).await.unwrap());

    let log = server.command_log();
    assert_eq!(log[0], "AUTHINFO USER alice");
    assert!(log.iter().any(|c| c.starts_with("XFEATURE")));
    session.quit().await.unwrap();
}

#[tokio::test]
async fn test_connector_surfaces_bad_credentials() {
    let server = FakeServer::start(credentials()).await;
    let provider: Arc<ProviderConfig> =
        Arc::new(server.provider().with_credentials("alice", "nope"));

    let err = match TcpConnector.connect(&provider).await {
        Ok(_) => panic!("connect should fail"),
        Err(e) => e,
    };
    assert!(matches!(err, NntpError::AuthRejected(_)), "got {err:?}");
}

#[tokio::test]
async fn test_connection_refused() {
    // Bind and drop to find a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut config = ProviderConfig::new("127.0.0.1", port, false);
    config.connect_timeout_secs = 2;

    assert!(NntpClient::connect(Arc::new(config)).await.is_err());
}
