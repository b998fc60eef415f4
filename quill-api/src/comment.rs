use std::collections::HashSet;

use chrono::Utc;
use uuid::Uuid;

use crate::{Author, ChapterId, Error, StoryId, Time, UserId, STUB_UUID};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentId(pub Uuid);

impl CommentId {
    pub fn stub() -> CommentId {
        CommentId(STUB_UUID)
    }
}

/// Only meaningful within one parent comment; replies are never addressed
/// without their parent's id.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ReplyId(pub Uuid);

impl ReplyId {
    pub fn stub() -> ReplyId {
        ReplyId(STUB_UUID)
    }
}

/// A user tag carried in a reply body, resolved to an id client-side and
/// persisted as a snapshot of the username at mention time.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Mention {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LikeStatus {
    pub likes: u64,
    pub has_liked: bool,
}

/// A comment thread: the comment itself plus its ordered, embedded replies.
/// The like count is derived from `liked_by`, so it cannot drift from the
/// set membership.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub author: Author,
    pub story_id: StoryId,
    /// `None` for a story-level comment.
    pub chapter_id: Option<ChapterId>,
    pub content: String,
    pub liked_by: HashSet<UserId>,
    /// Oldest first.
    pub replies: Vec<Reply>,
    pub created_at: Time,
}

impl Comment {
    pub fn new(
        author: Author,
        story_id: StoryId,
        chapter_id: Option<ChapterId>,
        content: String,
    ) -> Comment {
        Comment {
            id: CommentId(Uuid::new_v4()),
            author,
            story_id,
            chapter_id,
            content,
            liked_by: HashSet::new(),
            replies: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn likes(&self) -> u64 {
        self.liked_by.len() as u64
    }

    pub fn toggle_like(&mut self, user: UserId) -> LikeStatus {
        let has_liked = if self.liked_by.remove(&user) {
            false
        } else {
            self.liked_by.insert(user);
            true
        };
        LikeStatus {
            likes: self.likes(),
            has_liked,
        }
    }

    pub fn add_reply(&mut self, reply: Reply) {
        self.replies.push(reply);
    }

    pub fn reply(&self, id: ReplyId) -> Option<&Reply> {
        self.replies.iter().find(|r| r.id == id)
    }

    pub fn reply_mut(&mut self, id: ReplyId) -> Option<&mut Reply> {
        self.replies.iter_mut().find(|r| r.id == id)
    }

    pub fn remove_reply(&mut self, id: ReplyId) -> Option<Reply> {
        let idx = self.replies.iter().position(|r| r.id == id)?;
        Some(self.replies.remove(idx))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Reply {
    pub id: ReplyId,
    pub author: Author,
    pub content: String,
    pub mentions: Vec<Mention>,
    pub liked_by: HashSet<UserId>,
    pub created_at: Time,
}

impl Reply {
    pub fn new(author: Author, content: String, mentions: Vec<Mention>) -> Reply {
        Reply {
            id: ReplyId(Uuid::new_v4()),
            author,
            content,
            mentions,
            liked_by: HashSet::new(),
            created_at: Utc::now(),
        }
    }

    pub fn likes(&self) -> u64 {
        self.liked_by.len() as u64
    }

    pub fn toggle_like(&mut self, user: UserId) -> LikeStatus {
        let has_liked = if self.liked_by.remove(&user) {
            false
        } else {
            self.liked_by.insert(user);
            true
        };
        LikeStatus {
            likes: self.likes(),
            has_liked,
        }
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub story_id: StoryId,
    pub chapter_id: Option<ChapterId>,
    pub content: String,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), Error> {
        if self.content.trim().is_empty() {
            return Err(Error::EmptyContent);
        }
        crate::validate_string(&self.content)
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewReply {
    pub content: String,
    #[serde(default)]
    pub mentions: Vec<Mention>,
}

impl NewReply {
    pub fn validate(&self) -> Result<(), Error> {
        if self.content.trim().is_empty() {
            return Err(Error::EmptyContent);
        }
        crate::validate_string(&self.content)?;
        for m in &self.mentions {
            crate::validate_string(&m.username)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author(name: &str) -> Author {
        Author {
            id: UserId(Uuid::new_v4()),
            username: name.to_string(),
            avatar_url: None,
        }
    }

    fn comment() -> Comment {
        Comment::new(
            author("alice"),
            StoryId::stub(),
            None,
            String::from("first!"),
        )
    }

    #[test]
    fn like_count_tracks_set_membership() {
        let mut c = comment();
        let users: Vec<_> = (0..5).map(|_| UserId(Uuid::new_v4())).collect();
        for u in &users {
            let status = c.toggle_like(*u);
            assert!(status.has_liked);
            assert_eq!(c.likes(), c.liked_by.len() as u64);
        }
        assert_eq!(c.likes(), 5);
        for u in &users {
            let status = c.toggle_like(*u);
            assert!(!status.has_liked);
            assert_eq!(c.likes(), c.liked_by.len() as u64);
        }
        assert_eq!(c.likes(), 0);
    }

    #[test]
    fn double_toggle_restores_original_state() {
        let mut c = comment();
        let bystander = UserId(Uuid::new_v4());
        c.toggle_like(bystander);
        let user = UserId(Uuid::new_v4());

        let first = c.toggle_like(user);
        assert!(first.has_liked);
        assert_eq!(first.likes, 2);
        let second = c.toggle_like(user);
        assert!(!second.has_liked);
        assert_eq!(second.likes, 1);
        assert!(c.liked_by.contains(&bystander));
    }

    #[test]
    fn reply_toggle_never_goes_negative() {
        let mut r = Reply::new(author("bob"), String::from("hi"), Vec::new());
        let user = UserId(Uuid::new_v4());
        let on = r.toggle_like(user);
        assert!(on.has_liked);
        assert_eq!(on.likes, 1);
        let off = r.toggle_like(user);
        assert!(!off.has_liked);
        assert_eq!(off.likes, 0);
        let again = r.toggle_like(user);
        assert!(again.has_liked);
        assert_eq!(again.likes, 1);
    }

    #[test]
    fn replies_keep_insertion_order() {
        let mut c = comment();
        let first = Reply::new(author("bob"), String::from("one"), Vec::new());
        let second = Reply::new(author("carol"), String::from("two"), Vec::new());
        let (fid, sid) = (first.id, second.id);
        c.add_reply(first);
        c.add_reply(second);
        assert_eq!(c.replies[0].id, fid);
        assert_eq!(c.replies[1].id, sid);
        assert!(c.reply(fid).is_some());
        assert!(c.remove_reply(fid).is_some());
        assert!(c.reply(fid).is_none());
        assert_eq!(c.replies.len(), 1);
    }

    #[test]
    fn empty_content_is_rejected() {
        let new = NewComment {
            story_id: StoryId::stub(),
            chapter_id: None,
            content: String::from("   "),
        };
        assert_eq!(new.validate(), Err(Error::EmptyContent));

        let new = NewReply {
            content: String::from("ok"),
            mentions: vec![Mention {
                user_id: UserId::stub(),
                username: String::from("has\0null"),
            }],
        };
        assert!(matches!(
            new.validate(),
            Err(Error::NullByteInString(_))
        ));
    }
}
