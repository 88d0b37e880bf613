use std::{future::Future, sync::Arc};

use parking_lot::Mutex;

use crate::api::{Comment, CommentId, Error, NewComment, Persistence, PostId, UserId};

pub const SUBMIT_FAILED: &str = "Could not post your comment, please try again";

#[derive(Debug, Default)]
struct DraftState {
    content: String,
    is_submitting: bool,
    last_error: Option<String>,
}

/// Input state of a comment or reply being written
///
/// Submitting does not touch any `CommentThreadStore`: callers add the returned comment to
/// the relevant store themselves.
#[derive(Clone, Debug)]
pub struct CommentDraft {
    post_id: PostId,
    parent_comment_id: Option<CommentId>,
    author: Option<UserId>,
    state: Arc<Mutex<DraftState>>,
}

/// Resets `is_submitting` if the submission future is dropped midway
struct Submitting<'a>(Option<&'a Mutex<DraftState>>);

impl Submitting<'_> {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for Submitting<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.0 {
            state.lock().is_submitting = false;
        }
    }
}

impl CommentDraft {
    pub fn new(
        post_id: PostId,
        parent_comment_id: Option<CommentId>,
        author: Option<UserId>,
    ) -> CommentDraft {
        CommentDraft {
            post_id,
            parent_comment_id,
            author,
            state: Arc::new(Mutex::new(DraftState::default())),
        }
    }

    pub fn content(&self) -> String {
        self.state.lock().content.clone()
    }

    pub fn set_content(&self, content: impl Into<String>) {
        self.state.lock().content = content.into();
    }

    pub fn is_submitting(&self) -> bool {
        self.state.lock().is_submitting
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    /// Hands the trimmed content to `persist`, returning the saved comment
    ///
    /// Returns `None` without calling `persist` if the content is blank, nobody is logged in,
    /// or a submission is already running. On failure the content is kept for a retry.
    pub async fn submit<F, Fut>(&self, persist: F) -> Option<Comment>
    where
        F: FnOnce(NewComment) -> Fut,
        Fut: Future<Output = Result<Comment, Error>>,
    {
        let author = self.author?;
        let (new, submitting) = {
            let mut s = self.state.lock();
            if s.is_submitting {
                return None;
            }
            let content = s.content.trim();
            if content.is_empty() {
                return None;
            }
            let new = NewComment {
                id: CommentId::new(),
                post_id: self.post_id,
                author_id: author,
                content: content.to_string(),
                parent_comment_id: self.parent_comment_id,
            };
            s.is_submitting = true;
            s.last_error = None;
            (new, Submitting(Some(&*self.state)))
        };

        let res = persist(new).await;

        // The outcome and the flag reset must be seen together by other clones
        let mut s = self.state.lock();
        submitting.disarm();
        s.is_submitting = false;
        match res {
            Ok(c) => {
                s.content.clear();
                s.last_error = None;
                Some(c)
            }
            Err(err) => {
                tracing::warn!(?err, "failed submitting comment");
                s.last_error = Some(String::from(SUBMIT_FAILED));
                None
            }
        }
    }

    pub async fn submit_to<P: Persistence + ?Sized>(&self, persistence: &P) -> Option<Comment> {
        self.submit(|new| persistence.create_comment(new)).await
    }
}
