use uuid::Uuid;

use crate::{Author, Error, Time, UserId, STUB_UUID};

/// Content displayed in place of a soft-deleted comment
pub const TOMBSTONE: &str = "[deleted]";

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct PostId(pub Uuid);

impl PostId {
    pub fn stub() -> PostId {
        PostId(STUB_UUID)
    }
}

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

impl CommentId {
    pub fn new() -> CommentId {
        CommentId(Uuid::new_v4())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub parent_comment_id: Option<CommentId>,
    pub author_id: UserId,

    /// Not embedded in realtime payloads
    pub author: Option<Author>,

    pub content: String,
    pub created_at: Time,
    pub is_edited: bool,
    pub is_deleted: bool,

    /// Child comments, only set on top-level comments fetched for a post
    pub replies: Option<Vec<Comment>>,
}

impl Comment {
    pub fn apply(&mut self, patch: &CommentPatch) {
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        if let Some(is_edited) = patch.is_edited {
            self.is_edited = is_edited;
        }
        if let Some(is_deleted) = patch.is_deleted {
            self.is_deleted = is_deleted;
        }
    }

    /// Patch that would restore the mutable fields of `self` as they are now
    pub fn snapshot(&self) -> CommentPatch {
        CommentPatch {
            content: Some(self.content.clone()),
            is_edited: Some(self.is_edited),
            is_deleted: Some(self.is_deleted),
        }
    }
}

/// A comment as stored by the backend, without joined author profile nor replies
///
/// This is what the change feed carries.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentRow {
    pub id: CommentId,
    pub post_id: PostId,
    pub parent_comment_id: Option<CommentId>,
    pub author_id: UserId,
    pub content: String,
    pub created_at: Time,
    pub is_edited: bool,
    pub is_deleted: bool,
}

impl From<CommentRow> for Comment {
    fn from(r: CommentRow) -> Comment {
        Comment {
            id: r.id,
            post_id: r.post_id,
            parent_comment_id: r.parent_comment_id,
            author_id: r.author_id,
            author: None,
            content: r.content,
            created_at: r.created_at,
            is_edited: r.is_edited,
            is_deleted: r.is_deleted,
            replies: None,
        }
    }
}

impl From<&Comment> for CommentRow {
    fn from(c: &Comment) -> CommentRow {
        CommentRow {
            id: c.id,
            post_id: c.post_id,
            parent_comment_id: c.parent_comment_id,
            author_id: c.author_id,
            content: c.content.clone(),
            created_at: c.created_at,
            is_edited: c.is_edited,
            is_deleted: c.is_deleted,
        }
    }
}

/// Partial update of a comment's mutable fields, `None` fields are left untouched
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentPatch {
    pub content: Option<String>,
    pub is_edited: Option<bool>,
    pub is_deleted: Option<bool>,
}

impl CommentPatch {
    pub fn edit(content: String) -> CommentPatch {
        CommentPatch {
            content: Some(content),
            is_edited: Some(true),
            is_deleted: None,
        }
    }

    pub fn tombstone() -> CommentPatch {
        CommentPatch {
            content: Some(String::from(TOMBSTONE)),
            is_edited: None,
            is_deleted: Some(true),
        }
    }
}

impl From<&CommentRow> for CommentPatch {
    fn from(r: &CommentRow) -> CommentPatch {
        CommentPatch {
            content: Some(r.content.clone()),
            is_edited: Some(r.is_edited),
            is_deleted: Some(r.is_deleted),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    /// Generated client-side, so that the realtime echo of this comment can be matched
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub content: String,
    pub parent_comment_id: Option<CommentId>,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), Error> {
        if self.content.trim().is_empty() {
            return Err(Error::EmptyContent);
        }
        crate::validate_string(&self.content)
    }
}
