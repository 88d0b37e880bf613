mod config;
pub use config::StoreConfig;

mod draft;
pub use draft::CommentDraft;

mod feed;

mod store;
pub use store::CommentThreadStore;

mod thread;
pub use thread::CommentThread;

pub mod api {
    pub use petnook_api::*;
}
