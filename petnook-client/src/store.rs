use std::{future::Future, sync::Arc};

use parking_lot::Mutex;

use crate::{
    api::{ChangeEvent, Comment, CommentId, CommentPatch, Error, Page, Persistence, Scope, UserId},
    feed::Subscription,
    CommentThread, StoreConfig,
};

pub(crate) struct State {
    thread: Option<CommentThread>,
    loads_in_flight: usize,
    refreshes_in_flight: usize,
    last_error: Option<String>,
    next_offset: usize,
    has_more: bool,

    /// Bumped by every reset fetch and scope change, older fetch results are then discarded
    generation: u64,

    disposed: bool,
    subscription: Option<Subscription>,
    next_subscription_id: u64,
}

impl State {
    fn new(scope: Option<Scope>) -> State {
        State {
            thread: scope.map(CommentThread::new),
            loads_in_flight: 0,
            refreshes_in_flight: 0,
            last_error: None,
            next_offset: 0,
            has_more: true,
            generation: 0,
            disposed: false,
            subscription: None,
            next_subscription_id: 0,
        }
    }

    pub(crate) fn subscription_id(&self) -> Option<u64> {
        self.subscription.as_ref().map(|s| s.id())
    }

    pub(crate) fn apply_change(&mut self, e: ChangeEvent) {
        if self.disposed {
            return;
        }
        if let Some(thread) = self.thread.as_mut() {
            thread.apply(e);
        }
    }

    fn cancel_subscription(&mut self) {
        if let Some(s) = self.subscription.take() {
            tracing::info!(id = s.id(), "unsubscribing from comment changes");
            s.cancel();
        }
    }

    fn scope(&self) -> Option<Scope> {
        self.thread.as_ref().map(|t| t.scope())
    }

    /// The thread, unless the store was disposed of or has no scope
    fn live_thread(&mut self) -> Option<&mut CommentThread> {
        match self.disposed {
            true => None,
            false => self.thread.as_mut(),
        }
    }
}

#[derive(Clone, Copy)]
enum FetchKind {
    Load,
    Refresh,
}

/// Marks a fetch as in flight until dropped, including when the fetch future is cancelled
struct InFlight<'a> {
    state: &'a Mutex<State>,
    kind: FetchKind,
}

impl<'a> InFlight<'a> {
    fn start(state: &'a Mutex<State>, s: &mut State, kind: FetchKind) -> InFlight<'a> {
        match kind {
            FetchKind::Load => s.loads_in_flight += 1,
            FetchKind::Refresh => s.refreshes_in_flight += 1,
        }
        InFlight { state, kind }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut s = self.state.lock();
        match self.kind {
            FetchKind::Load => s.loads_in_flight -= 1,
            FetchKind::Refresh => s.refreshes_in_flight -= 1,
        }
    }
}

/// Client-side cache of the comments of one post, or of the replies to one comment
///
/// Clones share the same state. Failures never escape the store: they are recorded in
/// `last_error` for the UI to display.
pub struct CommentThreadStore<P> {
    persistence: Arc<P>,
    config: StoreConfig,
    acting_user: Option<UserId>,
    state: Arc<Mutex<State>>,
}

impl<P> Clone for CommentThreadStore<P> {
    fn clone(&self) -> Self {
        CommentThreadStore {
            persistence: self.persistence.clone(),
            config: self.config.clone(),
            acting_user: self.acting_user,
            state: self.state.clone(),
        }
    }
}

impl<P: Persistence> CommentThreadStore<P> {
    /// A zero page size is raised to one
    pub fn new(
        persistence: Arc<P>,
        mut config: StoreConfig,
        acting_user: Option<UserId>,
    ) -> CommentThreadStore<P> {
        if let Err(err) = config.validate() {
            tracing::warn!(?err, "invalid store config, using a page size of 1");
            config.page_size = 1;
        }
        CommentThreadStore {
            persistence,
            config,
            acting_user,
            state: Arc::new(Mutex::new(State::new(None))),
        }
    }

    pub fn for_scope(
        persistence: Arc<P>,
        config: StoreConfig,
        acting_user: Option<UserId>,
        scope: Scope,
    ) -> CommentThreadStore<P> {
        let res = Self::new(persistence, config, acting_user);
        res.set_scope(Some(scope));
        res
    }

    pub fn scope(&self) -> Option<Scope> {
        self.state.lock().scope()
    }

    /// Points the store at another container, dropping the live feed and everything loaded
    pub fn set_scope(&self, scope: Option<Scope>) {
        let mut s = self.state.lock();
        if s.disposed || s.scope() == scope {
            return;
        }
        s.cancel_subscription();
        s.thread = scope.map(CommentThread::new);
        s.generation += 1;
        s.last_error = None;
        s.next_offset = 0;
        s.has_more = true;
    }

    // Reactive fields

    pub fn items(&self) -> Vec<Comment> {
        self.with_items(|items| items.to_vec())
    }

    pub fn with_items<R>(&self, f: impl FnOnce(&[Comment]) -> R) -> R {
        let s = self.state.lock();
        match s.thread.as_ref() {
            Some(t) => f(t.items()),
            None => f(&[]),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loads_in_flight > 0
    }

    pub fn is_refreshing(&self) -> bool {
        self.state.lock().refreshes_in_flight > 0
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().has_more
    }

    pub fn next_offset(&self) -> usize {
        self.state.lock().next_offset
    }

    pub fn comment_count(&self) -> usize {
        self.state
            .lock()
            .thread
            .as_ref()
            .map(|t| t.comment_count())
            .unwrap_or(0)
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    // Fetching

    /// Fetches one page, either replacing everything loaded (`reset`) or appending to it
    pub async fn fetch_page(&self, reset: bool) {
        let (scope, page, generation) = {
            let mut s = self.state.lock();
            let scope = match (s.disposed, s.scope()) {
                (false, Some(scope)) => scope,
                _ => return,
            };
            s.last_error = None;
            if reset {
                s.generation += 1;
            }
            let offset = match reset {
                true => 0,
                false => s.next_offset,
            };
            let page = Page {
                limit: self.config.page_size,
                offset,
            };
            (scope, page, s.generation)
        };

        let res = match scope {
            Scope::Post(post) => self.persistence.fetch_comments(post, page).await,
            Scope::Replies(parent) => self.persistence.fetch_replies(parent, page).await,
        };

        let mut s = self.state.lock();
        if s.disposed {
            tracing::debug!(?scope, "fetch completed after the store was disposed of");
            return;
        }
        if s.generation != generation {
            tracing::warn!(?scope, ?page, "discarding comment page superseded by a refresh");
            return;
        }
        match res {
            Err(err) => {
                tracing::warn!(?err, ?scope, ?page, "failed fetching comments");
                s.last_error = Some(err.to_string());
            }
            Ok(comments) => {
                let len = comments.len();
                if let Some(thread) = s.thread.as_mut() {
                    match reset {
                        true => thread.replace(comments),
                        false => thread.append(comments),
                    }
                }
                s.next_offset = page.offset + len;
                s.has_more = len == page.limit;
            }
        }
    }

    /// Initial load of the first page
    pub async fn load(&self) {
        let _in_flight = {
            let mut s = self.state.lock();
            if s.disposed || s.thread.is_none() {
                return;
            }
            InFlight::start(&self.state, &mut s, FetchKind::Load)
        };
        self.fetch_page(true).await;
    }

    /// Fetches the next page, unless there is none or a fetch is already in flight
    pub async fn load_more(&self) {
        let _in_flight = {
            let mut s = self.state.lock();
            if s.disposed
                || s.thread.is_none()
                || !s.has_more
                || s.loads_in_flight > 0
                || s.refreshes_in_flight > 0
            {
                return;
            }
            InFlight::start(&self.state, &mut s, FetchKind::Load)
        };
        self.fetch_page(false).await;
    }

    /// Reloads from the first page, superseding any fetch currently in flight
    pub async fn refresh(&self) {
        let _in_flight = {
            let mut s = self.state.lock();
            if s.disposed || s.thread.is_none() {
                return;
            }
            InFlight::start(&self.state, &mut s, FetchKind::Refresh)
        };
        self.fetch_page(true).await;
    }

    // Local mutations

    pub fn add_comment_optimistic(&self, c: Comment) {
        if let Some(thread) = self.state.lock().live_thread() {
            thread.add_comment_optimistic(c);
        }
    }

    /// Does nothing if the comment is not loaded
    pub fn update_comment(&self, id: CommentId, patch: CommentPatch) {
        if let Some(thread) = self.state.lock().live_thread() {
            if !thread.update_comment(&id, &patch) {
                tracing::debug!(?id, "not updating comment that is not loaded");
            }
        }
    }

    /// Turns the comment into a tombstone, it keeps its place in the thread
    pub fn remove_comment(&self, id: CommentId) {
        if let Some(thread) = self.state.lock().live_thread() {
            if !thread.remove_comment(&id) {
                tracing::debug!(?id, "not removing comment that is not loaded");
            }
        }
    }

    pub fn add_reply(&self, parent: CommentId, reply: Comment) {
        if let Some(thread) = self.state.lock().live_thread() {
            if !thread.add_reply(&parent, reply) {
                tracing::debug!(?parent, "not adding reply to comment that is not loaded");
            }
        }
    }

    pub fn apply_change(&self, e: ChangeEvent) {
        self.state.lock().apply_change(e);
    }

    // Author-only mutations, persisted through the backend

    pub async fn edit_comment(&self, id: CommentId, content: &str) -> bool {
        let content = content.trim().to_string();
        if content.is_empty() {
            return false;
        }
        let patch = CommentPatch::edit(content.clone());
        self.mutate_own(id, patch, move |p| async move {
            p.update_comment(id, content).await
        })
        .await
    }

    pub async fn delete_comment(&self, id: CommentId) -> bool {
        self.mutate_own(id, CommentPatch::tombstone(), move |p| async move {
            p.delete_comment(id).await
        })
        .await
    }

    /// Applies `patch` locally, then persists it, rolling back on failure
    async fn mutate_own<F, Fut>(&self, id: CommentId, patch: CommentPatch, persist: F) -> bool
    where
        F: FnOnce(Arc<P>) -> Fut,
        Fut: Future<Output = Result<Comment, Error>>,
    {
        let user = match self.acting_user {
            Some(user) => user,
            None => {
                tracing::warn!(?id, "refusing to modify a comment while logged out");
                return false;
            }
        };
        let (previous, optimistic) = {
            let mut s = self.state.lock();
            let c = match s.live_thread().and_then(|t| t.find_mut(&id)) {
                Some(c) => c,
                None => return false,
            };
            if c.author_id != user {
                tracing::warn!(?id, ?user, "refusing to modify someone else's comment");
                return false;
            }
            if c.is_deleted {
                return false;
            }
            let previous = c.snapshot();
            c.apply(&patch);
            (previous, c.snapshot())
        };

        let res = persist(self.persistence.clone()).await;

        let mut s = self.state.lock();
        match res {
            Ok(saved) => {
                if let Some(thread) = s.live_thread() {
                    thread.update_comment(&id, &saved.snapshot());
                }
                true
            }
            Err(err) => {
                tracing::warn!(?err, ?id, "failed saving comment, rolling back");
                // A realtime change that landed meanwhile is newer than `previous`
                match s.live_thread().and_then(|t| t.find_mut(&id)) {
                    Some(c) if c.snapshot() == optimistic => c.apply(&previous),
                    Some(_) => tracing::debug!(?id, "comment changed meanwhile, not rolling back"),
                    None => (),
                }
                if !s.disposed {
                    s.last_error = Some(err.to_string());
                }
                false
            }
        }
    }

    // Realtime lifecycle

    /// Starts applying the backend's change feed for the current scope
    ///
    /// Replaces any previous subscription. Returns false if there is nothing to subscribe to
    /// or the backend refused, in which case `last_error` is set.
    pub async fn subscribe(&self) -> bool {
        let scope = {
            let mut s = self.state.lock();
            let scope = match (s.disposed, s.scope()) {
                (false, Some(scope)) => scope,
                _ => return false,
            };
            s.cancel_subscription();
            scope
        };

        let feed = match self.persistence.subscribe(scope).await {
            Ok(feed) => feed,
            Err(err) => {
                tracing::warn!(?err, ?scope, "failed subscribing to comment changes");
                self.state.lock().last_error = Some(err.to_string());
                return false;
            }
        };

        let mut s = self.state.lock();
        if s.disposed || s.scope() != Some(scope) {
            tracing::debug!(?scope, "scope changed while subscribing");
            return false;
        }
        s.cancel_subscription();
        let id = s.next_subscription_id;
        s.next_subscription_id += 1;
        s.subscription = Some(Subscription::spawn(id, feed, self.state.clone()));
        tracing::info!(id, ?scope, "subscribed to comment changes");
        true
    }

    /// Stops applying changes; calling it again is harmless
    pub fn unsubscribe(&self) {
        self.state.lock().cancel_subscription();
    }

    pub fn is_subscribed(&self) -> bool {
        self.state.lock().subscription.is_some()
    }

    /// Unsubscribes and makes every later call, including pending fetches, a no-op
    pub fn dispose(&self) {
        let mut s = self.state.lock();
        s.disposed = true;
        s.cancel_subscription();
    }
}
