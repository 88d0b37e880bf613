use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

mod comment;
pub use comment::{Comment, CommentId, CommentPatch, CommentRow, NewComment, PostId, TOMBSTONE};

mod error;
pub use error::Error;

mod event;
pub use event::{ChangeEvent, Feed, FeedSender, Scope};

mod persistence;
pub use persistence::{Page, Persistence};

mod user;
pub use user::{Author, UserId};

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

// The backend's text columns cannot hold null bytes
pub(crate) fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(s.to_string()));
    }
    Ok(())
}
