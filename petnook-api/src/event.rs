use futures::channel::mpsc;

use crate::{CommentId, CommentRow, PostId};

/// What a comment thread is about
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Scope {
    /// Top-level comments of a post, each with its replies
    Post(PostId),

    /// Flat list of the replies to one comment
    Replies(CommentId),
}

impl Scope {
    /// Whether a stored comment belongs to the thread described by this scope
    pub fn contains(&self, row: &CommentRow) -> bool {
        match self {
            Scope::Post(p) => row.post_id == *p,
            Scope::Replies(c) => row.parent_comment_id == Some(*c),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum ChangeEvent {
    Insert(CommentRow),
    Update(CommentRow),
    Delete(CommentId),
}

impl ChangeEvent {
    pub fn comment_id(&self) -> CommentId {
        match self {
            ChangeEvent::Insert(r) | ChangeEvent::Update(r) => r.id,
            ChangeEvent::Delete(id) => *id,
        }
    }
}

/// Receiving end of a change feed, dropping it ends the subscription
pub type Feed = mpsc::UnboundedReceiver<ChangeEvent>;
pub type FeedSender = mpsc::UnboundedSender<ChangeEvent>;
