use crate::api::{ChangeEvent, Comment, CommentId, CommentPatch, Scope};

/// Two-level comment tree for one post, or flat list of replies to one comment
///
/// Comments are never physically removed: deletion only turns them into tombstones, so
/// that reply threads keep their shape. Replies to replies are flattened into the reply list
/// of the top-level comment holding their parent.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommentThread {
    scope: Scope,
    items: Vec<Comment>,
}

impl CommentThread {
    pub fn new(scope: Scope) -> CommentThread {
        CommentThread {
            scope,
            items: Vec::new(),
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn items(&self) -> &[Comment] {
        &self.items
    }

    pub fn find(&self, id: &CommentId) -> Option<&Comment> {
        self.items.iter().find(|c| c.id == *id).or_else(|| {
            self.items
                .iter()
                .filter_map(|c| c.replies.as_ref())
                .flat_map(|r| r.iter())
                .find(|r| r.id == *id)
        })
    }

    /// Looks up top-level comments first, then each top-level comment's replies
    pub fn find_mut(&mut self, id: &CommentId) -> Option<&mut Comment> {
        if let Some(i) = self.items.iter().position(|c| c.id == *id) {
            return self.items.get_mut(i);
        }
        self.items
            .iter_mut()
            .filter_map(|c| c.replies.as_mut())
            .flat_map(|r| r.iter_mut())
            .find(|r| r.id == *id)
    }

    /// Index of the top-level comment that either is `parent` or has `parent` as a reply
    fn holder_of(&self, parent: &CommentId) -> Option<usize> {
        self.items.iter().position(|c| c.id == *parent).or_else(|| {
            self.items.iter().position(|c| {
                c.replies
                    .as_ref()
                    .map(|r| r.iter().any(|r| r.id == *parent))
                    .unwrap_or(false)
            })
        })
    }

    /// Returns true if `c` was inserted, false if it was merged into an existing entry
    pub fn add_comment_optimistic(&mut self, mut c: Comment) -> bool {
        if let Some(existing) = self.find_mut(&c.id) {
            tracing::debug!(id = ?c.id, "comment already in thread, merging");
            existing.apply(&c.snapshot());
            if existing.author.is_none() {
                existing.author = c.author.take();
            }
            let replies = c.replies.take().unwrap_or_default();
            for r in replies {
                self.add_comment_optimistic(r);
            }
            self.adopt_orphans();
            return false;
        }
        match self.scope {
            Scope::Replies(_) => {
                c.replies = None;
                self.items.push(c);
            }
            Scope::Post(_) => {
                let holder = c.parent_comment_id.and_then(|p| self.holder_of(&p));
                match holder {
                    Some(i) => {
                        c.replies = None;
                        self.items[i].replies.get_or_insert_with(Vec::new).push(c);
                    }
                    None => {
                        let replies = c.replies.replace(Vec::new()).unwrap_or_default();
                        let id = c.id;
                        self.items.push(c);
                        for mut r in replies {
                            match self.holder_of(&id) {
                                Some(i) if self.find(&r.id).is_none() => {
                                    r.replies = None;
                                    self.items[i].replies.get_or_insert_with(Vec::new).push(r);
                                }
                                _ => {
                                    self.add_comment_optimistic(r);
                                }
                            }
                        }
                    }
                }
                self.adopt_orphans();
            }
        }
        true
    }

    /// Moves top-level comments whose parent got loaded since into the reply list holding it
    fn adopt_orphans(&mut self) {
        if let Scope::Replies(_) = self.scope {
            return;
        }
        while let Some((orphan, holder)) = self.find_orphan() {
            let mut c = self.items.remove(orphan);
            let holder = if holder > orphan { holder - 1 } else { holder };
            tracing::debug!(id = ?c.id, "parent got loaded, moving comment under it");
            let nested = c.replies.take().unwrap_or_default();
            let replies = self.items[holder].replies.get_or_insert_with(Vec::new);
            replies.push(c);
            replies.extend(nested);
        }
    }

    fn find_orphan(&self) -> Option<(usize, usize)> {
        self.items.iter().enumerate().find_map(|(i, c)| {
            let holder = self.holder_of(&c.parent_comment_id?)?;
            (holder != i).then_some((i, holder))
        })
    }

    /// Returns false if no comment with this id is loaded
    pub fn update_comment(&mut self, id: &CommentId, patch: &CommentPatch) -> bool {
        match self.find_mut(id) {
            Some(c) => {
                c.apply(patch);
                true
            }
            None => false,
        }
    }

    pub fn remove_comment(&mut self, id: &CommentId) -> bool {
        self.update_comment(id, &CommentPatch::tombstone())
    }

    /// Returns false, without adding anything, if `parent` is not loaded
    pub fn add_reply(&mut self, parent: &CommentId, mut reply: Comment) -> bool {
        if self.find(&reply.id).is_some() {
            return !self.add_comment_optimistic(reply);
        }
        match self.scope {
            Scope::Replies(root) => {
                if root != *parent && !self.items.iter().any(|c| c.id == *parent) {
                    return false;
                }
                reply.replies = None;
                self.items.push(reply);
                true
            }
            Scope::Post(_) => match self.holder_of(parent) {
                Some(i) => {
                    reply.replies = None;
                    self.items[i]
                        .replies
                        .get_or_insert_with(Vec::new)
                        .push(reply);
                    self.adopt_orphans();
                    true
                }
                None => false,
            },
        }
    }

    /// Number of comments, replies and tombstones included
    pub fn comment_count(&self) -> usize {
        self.items
            .iter()
            .map(|c| 1 + c.replies.as_ref().map(|r| r.len()).unwrap_or(0))
            .sum()
    }

    pub fn replace(&mut self, page: Vec<Comment>) {
        self.items.clear();
        self.append(page);
    }

    pub fn append(&mut self, page: Vec<Comment>) {
        for c in page {
            self.add_comment_optimistic(c);
        }
    }

    /// Merges one realtime change into the thread
    pub fn apply(&mut self, e: ChangeEvent) {
        let id = e.comment_id();
        let known = match e {
            ChangeEvent::Insert(row) => {
                self.add_comment_optimistic(Comment::from(row));
                true
            }
            ChangeEvent::Update(row) => self.update_comment(&row.id, &CommentPatch::from(&row)),
            ChangeEvent::Delete(id) => self.remove_comment(&id),
        };
        if !known {
            tracing::debug!(?id, "ignoring change for a comment that is not loaded");
        }
    }
}
