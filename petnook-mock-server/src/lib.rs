use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use futures::channel::mpsc;
use parking_lot::Mutex;
use petnook_api::{
    Author, ChangeEvent, Comment, CommentId, CommentRow, Error, Feed, FeedSender, NewComment,
    Page, Persistence, PostId, Scope, UserId, Uuid, TOMBSTONE,
};
use tokio::sync::watch;

/// In-memory stand-in for the hosted comment backend
pub struct MockServer {
    db: Mutex<Db>,

    /// While true, fetches wait before reading the database
    paused: watch::Sender<bool>,
}

#[derive(Default)]
struct Db {
    users: HashMap<UserId, Author>,

    /// In creation order
    comments: Vec<CommentRow>,

    feeds: Vec<(Scope, FeedSender)>,
    failures_left: usize,
    fetch_calls: usize,
}

impl Db {
    fn relay(&mut self, row: &CommentRow, e: ChangeEvent) {
        self.feeds
            .retain(|(scope, feed)| !scope.contains(row) || feed.unbounded_send(e.clone()).is_ok());
    }

    fn injected_failure(&mut self) -> Result<(), Error> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(Error::Unavailable(String::from("injected failure")));
        }
        Ok(())
    }

    fn row(&self, id: &CommentId) -> Result<&CommentRow, Error> {
        self.comments
            .iter()
            .find(|c| c.id == *id)
            .ok_or(Error::NotFound(*id))
    }

    fn row_mut(&mut self, id: &CommentId) -> Result<&mut CommentRow, Error> {
        self.comments
            .iter_mut()
            .find(|c| c.id == *id)
            .ok_or(Error::NotFound(*id))
    }

    /// Top-level ancestor of `row`
    fn root_of(&self, row: &CommentRow) -> CommentId {
        let mut res = row;
        while let Some(parent) = res.parent_comment_id.and_then(|p| self.row(&p).ok()) {
            res = parent;
        }
        res.id
    }

    fn comment(&self, row: &CommentRow) -> Comment {
        let mut res = Comment::from(row.clone());
        res.author = self.users.get(&row.author_id).cloned();
        res
    }

    fn top_level_comment(&self, row: &CommentRow) -> Comment {
        let replies = self
            .comments
            .iter()
            .filter(|r| r.parent_comment_id.is_some() && self.root_of(r) == row.id)
            .map(|r| self.comment(r))
            .collect();
        Comment {
            replies: Some(replies),
            ..self.comment(row)
        }
    }
}

impl MockServer {
    pub fn new() -> MockServer {
        let (paused, _) = watch::channel(false);
        MockServer {
            db: Mutex::new(Db::default()),
            paused,
        }
    }

    pub fn add_user(&self, name: &str) -> UserId {
        let id = UserId(Uuid::new_v4());
        self.db.lock().users.insert(
            id,
            Author {
                name: String::from(name),
                avatar_url: None,
            },
        );
        id
    }

    /// Loads a fixture, as produced by `generate-test-data`
    ///
    /// Replies may be nested in their top-level comment or listed on their own. Authors
    /// embedded in the comments are registered as users.
    pub fn load(&self, comments: Vec<Comment>) {
        let mut db = self.db.lock();
        let mut queue = comments;
        queue.reverse();
        while let Some(mut c) = queue.pop() {
            if let Some(author) = c.author.clone() {
                db.users.entry(c.author_id).or_insert(author);
            }
            let replies = c.replies.take().unwrap_or_default();
            db.comments.push(CommentRow::from(&c));
            queue.extend(replies.into_iter().rev());
        }
    }

    /// Number of fetch requests received so far
    pub fn test_fetch_calls(&self) -> usize {
        self.db.lock().fetch_calls
    }

    /// Makes the next `n` requests fail
    pub fn test_fail_next(&self, n: usize) {
        self.db.lock().failures_left = n;
    }

    /// Holds every fetch, edit and deletion until `test_resume_requests` is called
    pub fn test_pause_requests(&self) {
        self.paused.send_replace(true);
    }

    pub fn test_resume_requests(&self) {
        self.paused.send_replace(false);
    }

    /// Number of subscriptions whose receiver is still alive
    pub fn test_live_feeds(&self) -> usize {
        self.db
            .lock()
            .feeds
            .iter()
            .filter(|(_, f)| !f.is_closed())
            .count()
    }

    async fn fetch_gate(&self) {
        self.db.lock().fetch_calls += 1;
        self.pause_gate().await;
    }

    async fn pause_gate(&self) {
        let mut paused = self.paused.subscribe();
        loop {
            let is_paused = *paused.borrow();
            if !is_paused || paused.changed().await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl Persistence for MockServer {
    async fn fetch_comments(&self, post: PostId, page: Page) -> Result<Vec<Comment>, Error> {
        self.fetch_gate().await;
        let mut db = self.db.lock();
        db.injected_failure()?;
        Ok(db
            .comments
            .iter()
            .filter(|r| r.post_id == post && r.parent_comment_id.is_none())
            .skip(page.offset)
            .take(page.limit)
            .map(|r| db.top_level_comment(r))
            .collect())
    }

    async fn fetch_replies(&self, parent: CommentId, page: Page) -> Result<Vec<Comment>, Error> {
        self.fetch_gate().await;
        let mut db = self.db.lock();
        db.injected_failure()?;
        Ok(db
            .comments
            .iter()
            .filter(|r| r.parent_comment_id == Some(parent))
            .skip(page.offset)
            .take(page.limit)
            .map(|r| db.comment(r))
            .collect())
    }

    async fn create_comment(&self, c: NewComment) -> Result<Comment, Error> {
        let mut db = self.db.lock();
        db.injected_failure()?;
        c.validate()?;
        if !db.users.contains_key(&c.author_id) {
            return Err(Error::PermissionDenied);
        }
        if db.row(&c.id).is_ok() {
            return Err(Error::UuidAlreadyUsed(c.id.0));
        }
        if let Some(parent) = c.parent_comment_id {
            if db.row(&parent)?.post_id != c.post_id {
                return Err(Error::NotFound(parent));
            }
        }
        let row = CommentRow {
            id: c.id,
            post_id: c.post_id,
            parent_comment_id: c.parent_comment_id,
            author_id: c.author_id,
            content: c.content.trim().to_string(),
            created_at: Utc::now(),
            is_edited: false,
            is_deleted: false,
        };
        db.comments.push(row.clone());
        db.relay(&row, ChangeEvent::Insert(row.clone()));
        let mut res = db.comment(&row);
        if row.parent_comment_id.is_none() {
            res.replies = Some(Vec::new());
        }
        Ok(res)
    }

    async fn update_comment(&self, id: CommentId, content: String) -> Result<Comment, Error> {
        self.pause_gate().await;
        let mut db = self.db.lock();
        db.injected_failure()?;
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(Error::EmptyContent);
        }
        if content.contains('\0') {
            return Err(Error::NullByteInString(content));
        }
        let row = db.row_mut(&id)?;
        if row.is_deleted {
            return Err(Error::NotFound(id));
        }
        row.content = content;
        row.is_edited = true;
        let row = row.clone();
        db.relay(&row, ChangeEvent::Update(row.clone()));
        Ok(db.comment(&row))
    }

    async fn delete_comment(&self, id: CommentId) -> Result<Comment, Error> {
        self.pause_gate().await;
        let mut db = self.db.lock();
        db.injected_failure()?;
        let row = db.row_mut(&id)?;
        row.is_deleted = true;
        row.content = String::from(TOMBSTONE);
        let row = row.clone();
        db.relay(&row, ChangeEvent::Delete(id));
        Ok(db.comment(&row))
    }

    async fn subscribe(&self, scope: Scope) -> Result<Feed, Error> {
        let mut db = self.db.lock();
        db.injected_failure()?;
        let (sender, receiver) = mpsc::unbounded();
        db.feeds.push((scope, sender));
        Ok(receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn new_comment(
        post: PostId,
        author: UserId,
        parent: Option<CommentId>,
        text: &str,
    ) -> NewComment {
        NewComment {
            id: CommentId::new(),
            post_id: post,
            author_id: author,
            content: String::from(text),
            parent_comment_id: parent,
        }
    }

    #[tokio::test]
    async fn replies_are_embedded_in_their_root() {
        let server = MockServer::new();
        let user = server.add_user("rex");
        let post = PostId::stub();
        let c1 = server
            .create_comment(new_comment(post, user, None, "c1"))
            .await
            .unwrap();
        let r1 = server
            .create_comment(new_comment(post, user, Some(c1.id), "r1"))
            .await
            .unwrap();
        server
            .create_comment(new_comment(post, user, Some(r1.id), "r2"))
            .await
            .unwrap();
        let page = server
            .fetch_comments(post, Page { limit: 10, offset: 0 })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].replies.as_ref().unwrap().len(), 2);
        assert_eq!(page[0].author.as_ref().unwrap().name, "rex");

        let replies = server
            .fetch_replies(c1.id, Page { limit: 10, offset: 0 })
            .await
            .unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].id, r1.id);
    }

    #[tokio::test]
    async fn paging() {
        let server = MockServer::new();
        let user = server.add_user("rex");
        let post = PostId::stub();
        for i in 0..5 {
            server
                .create_comment(new_comment(post, user, None, &format!("c{i}")))
                .await
                .unwrap();
        }
        let page = server
            .fetch_comments(post, Page { limit: 2, offset: 4 })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].content, "c4");
        assert_eq!(server.test_fetch_calls(), 1);
    }

    #[tokio::test]
    async fn rejects_bad_comments() {
        let server = MockServer::new();
        let user = server.add_user("rex");
        let post = PostId::stub();
        let c = new_comment(post, user, None, "c1");
        server.create_comment(c.clone()).await.unwrap();
        assert_eq!(
            server.create_comment(c.clone()).await,
            Err(Error::UuidAlreadyUsed(c.id.0))
        );
        assert_eq!(
            server
                .create_comment(new_comment(post, UserId::stub(), None, "who?"))
                .await,
            Err(Error::PermissionDenied)
        );
        assert_eq!(
            server
                .create_comment(new_comment(post, user, None, " "))
                .await,
            Err(Error::EmptyContent)
        );
        let missing = CommentId::new();
        assert_eq!(
            server
                .create_comment(new_comment(post, user, Some(missing), "r"))
                .await,
            Err(Error::NotFound(missing))
        );
    }

    #[tokio::test]
    async fn feeds_only_get_their_scope() {
        let server = MockServer::new();
        let user = server.add_user("rex");
        let post = PostId::stub();
        let c1 = server
            .create_comment(new_comment(post, user, None, "c1"))
            .await
            .unwrap();
        let mut post_feed = server.subscribe(Scope::Post(post)).await.unwrap();
        let mut replies_feed = server.subscribe(Scope::Replies(c1.id)).await.unwrap();
        let mut other_feed = server
            .subscribe(Scope::Post(PostId(Uuid::new_v4())))
            .await
            .unwrap();

        let r1 = server
            .create_comment(new_comment(post, user, Some(c1.id), "r1"))
            .await
            .unwrap();
        server.delete_comment(r1.id).await.unwrap();

        for feed in [&mut post_feed, &mut replies_feed] {
            assert!(matches!(feed.next().await, Some(ChangeEvent::Insert(r)) if r.id == r1.id));
            assert_eq!(feed.next().await, Some(ChangeEvent::Delete(r1.id)));
        }
        assert!(other_feed.try_next().is_err());

        drop(replies_feed);
        server.update_comment(c1.id, String::from("edited")).await.unwrap();
        assert_eq!(server.test_live_feeds(), 2);
    }

    #[tokio::test]
    async fn injected_failures() {
        let server = MockServer::new();
        server.test_fail_next(1);
        assert!(matches!(
            server
                .fetch_comments(PostId::stub(), Page { limit: 1, offset: 0 })
                .await,
            Err(Error::Unavailable(_))
        ));
        assert_eq!(
            server
                .fetch_comments(PostId::stub(), Page { limit: 1, offset: 0 })
                .await,
            Ok(Vec::new())
        );
    }

    #[tokio::test]
    async fn load_flattens_fixture() {
        let server = MockServer::new();
        let user = server.add_user("rex");
        let post = PostId::stub();
        let c1 = server
            .create_comment(new_comment(post, user, None, "c1"))
            .await
            .unwrap();
        let r1 = server
            .create_comment(new_comment(post, user, Some(c1.id), "r1"))
            .await
            .unwrap();
        let fixture = server
            .fetch_comments(post, Page { limit: 10, offset: 0 })
            .await
            .unwrap();

        let copy = MockServer::new();
        copy.load(fixture.clone());
        let page = copy
            .fetch_comments(post, Page { limit: 10, offset: 0 })
            .await
            .unwrap();
        assert_eq!(page, fixture);
        assert_eq!(page[0].replies.as_ref().unwrap()[0].id, r1.id);
    }
}
