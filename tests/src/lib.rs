use chrono::{Duration, Utc};
use petnook_api::{Author, Comment, CommentId, PostId, Time, UserId, Uuid, TOMBSTONE};
use rand::Rng;

const COMMENT_WORD_COUNT: usize = 25;

#[derive(Clone, Debug, structopt::StructOpt)]
pub struct Params {
    /// Post the comments belong to, random if unset
    #[structopt(long)]
    pub post: Option<Uuid>,

    #[structopt(long, default_value = "4")]
    pub users: usize,

    /// Number of top-level comments
    #[structopt(long, default_value = "50")]
    pub comments: usize,

    /// Maximum number of replies under each top-level comment
    #[structopt(long, default_value = "5")]
    pub max_replies: usize,

    /// Probability for any comment to be soft-deleted
    #[structopt(long, default_value = "0.05")]
    pub deleted_ratio: f64,
}

fn gen_comment(
    rng: &mut impl Rng,
    params: &Params,
    post: PostId,
    users: &[(UserId, Author)],
    parent: Option<CommentId>,
    date: &mut Time,
) -> Comment {
    *date = *date + Duration::minutes(rng.gen_range(1..120));
    let (author_id, author) = users[rng.gen_range(0..users.len())].clone();
    let is_deleted = rng.gen_bool(params.deleted_ratio.clamp(0.0, 1.0));
    let content = match is_deleted {
        true => String::from(TOMBSTONE),
        false => lipsum::lipsum_words(rng.gen_range(1..COMMENT_WORD_COUNT)),
    };
    Comment {
        id: CommentId(Uuid::new_v4()),
        post_id: post,
        parent_comment_id: parent,
        author_id,
        author: Some(author),
        content,
        created_at: *date,
        is_edited: !is_deleted && rng.gen_bool(0.1),
        is_deleted,
        replies: None,
    }
}

/// Generates a post's comment thread, replies embedded in their top-level comment
///
/// Some replies answer another reply, like users do, and are still listed under the
/// top-level comment.
pub fn generate(params: &Params) -> Vec<Comment> {
    let mut rng = rand::thread_rng();
    let post = PostId(params.post.unwrap_or_else(Uuid::new_v4));
    let users = (0..params.users.max(1))
        .map(|_| {
            (
                UserId(Uuid::new_v4()),
                Author {
                    name: lipsum::lipsum_words(1).to_lowercase(),
                    avatar_url: None,
                },
            )
        })
        .collect::<Vec<_>>();

    let mut date = Utc::now() - Duration::days(7);
    let mut res = Vec::with_capacity(params.comments);
    for _ in 0..params.comments {
        let mut top = gen_comment(&mut rng, params, post, &users, None, &mut date);
        let mut replies: Vec<Comment> = Vec::new();
        for _ in 0..rng.gen_range(0..=params.max_replies) {
            let parent = match replies.is_empty() || rng.gen_bool(0.7) {
                true => top.id,
                false => replies[rng.gen_range(0..replies.len())].id,
            };
            let reply = gen_comment(&mut rng, params, post, &users, Some(parent), &mut date);
            replies.push(reply);
        }
        top.replies = Some(replies);
        res.push(top);
    }
    res
}

pub fn count(comments: &[Comment]) -> usize {
    comments
        .iter()
        .map(|c| 1 + c.replies.as_ref().map(|r| r.len()).unwrap_or(0))
        .sum()
}
