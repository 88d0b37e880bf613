use std::sync::Arc;

use petnook_client::{
    api::{Comment, PostId, Scope, Uuid},
    CommentThreadStore, StoreConfig,
};
use petnook_mock_server::MockServer;
use tests::Params;

fn params(post: Uuid) -> Params {
    Params {
        post: Some(post),
        users: 3,
        comments: 23,
        max_replies: 4,
        deleted_ratio: 0.2,
    }
}

#[tokio::test]
async fn whole_fixture_pages_in() {
    let post = Uuid::new_v4();
    let fixture = tests::generate(&params(post));

    // go through the same format generate-test-data prints
    let json = serde_json::to_string(&fixture).unwrap();
    let fixture: Vec<Comment> = serde_json::from_str(&json).unwrap();

    let server = Arc::new(MockServer::new());
    server.load(fixture.clone());
    let store = CommentThreadStore::for_scope(
        server.clone(),
        StoreConfig::with_page_size(7),
        None,
        Scope::Post(PostId(post)),
    );
    store.load().await;
    let mut pages = 1;
    while store.has_more() {
        store.load_more().await;
        pages += 1;
    }

    assert_eq!(pages, 4);
    assert_eq!(store.last_error(), None);
    assert_eq!(store.next_offset(), 23);
    assert_eq!(store.comment_count(), tests::count(&fixture));
    assert_eq!(store.items(), fixture);
}

#[tokio::test]
async fn replies_of_a_fixture_comment() {
    let post = Uuid::new_v4();
    let fixture = tests::generate(&Params {
        max_replies: 0,
        ..params(post)
    });
    assert!(fixture.iter().all(|c| c.replies == Some(Vec::new())));

    let server = Arc::new(MockServer::new());
    server.load(fixture.clone());
    let store = CommentThreadStore::for_scope(
        server,
        StoreConfig::default(),
        None,
        Scope::Replies(fixture[0].id),
    );
    store.load().await;
    assert!(store.items().is_empty());
    assert!(!store.has_more());
}
