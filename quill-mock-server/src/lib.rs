//! In-memory stand-in for the quill server, holding the whole platform
//! state in plain maps. Used by tests that exercise the comment and
//! notification semantics without a database.

use std::collections::{HashMap, HashSet};

use quill_api::{
    mention, notification, tier, AuthToken, Author, ChapterId, Comment, CommentId, ContactId,
    Error, FeedMessage, LikeStatus, MentionSuggestion, NewComment, NewReply, Notification,
    NotificationId, Reply, ReplyId, Role, StoryId, StoryRef, Tier, UserId, Uuid,
};
use tokio::sync::mpsc;

pub struct MockServer {
    users: HashMap<UserId, DirUser>,
    sessions: HashMap<AuthToken, UserId>,
    stories: HashMap<StoryId, StoryRef>,
    /// Insertion order is chronological.
    comments: Vec<Comment>,
    notifications: Vec<Notification>,
    feeds: HashMap<UserId, mpsc::UnboundedSender<FeedMessage>>,
}

#[derive(Debug)]
struct DirUser {
    author: Author,
    role: Role,
    points: i64,
    comment_count: i64,
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer {
            users: HashMap::new(),
            sessions: HashMap::new(),
            stories: HashMap::new(),
            comments: Vec::new(),
            notifications: Vec::new(),
            feeds: HashMap::new(),
        }
    }

    pub fn create_user(&mut self, username: &str, role: Role) -> UserId {
        let id = UserId(Uuid::new_v4());
        self.users.insert(
            id,
            DirUser {
                author: Author {
                    id,
                    username: username.to_string(),
                    avatar_url: None,
                },
                role,
                points: 0,
                comment_count: 0,
            },
        );
        id
    }

    pub fn open_session(&mut self, user: UserId) -> AuthToken {
        let tok = AuthToken(Uuid::new_v4());
        self.sessions.insert(tok, user);
        tok
    }

    pub fn add_story(&mut self, author: UserId, title: &str) -> StoryId {
        let id = StoryId(Uuid::new_v4());
        self.stories.insert(
            id,
            StoryRef {
                id,
                author_id: author,
                title: title.to_string(),
            },
        );
        id
    }

    pub fn test_points(&self, user: UserId) -> i64 {
        self.users[&user].points
    }

    pub fn test_tier(&self, user: UserId) -> Tier {
        Tier::for_points(self.users[&user].points)
    }

    pub fn test_comment_count(&self, user: UserId) -> i64 {
        self.users[&user].comment_count
    }

    fn resolve(&self, tok: AuthToken) -> Result<UserId, Error> {
        self.sessions.get(&tok).copied().ok_or(Error::PermissionDenied)
    }

    fn author(&self, user: UserId) -> Result<Author, Error> {
        self.users
            .get(&user)
            .map(|u| u.author.clone())
            .ok_or(Error::PermissionDenied)
    }

    fn role(&self, user: UserId) -> Result<Role, Error> {
        self.users
            .get(&user)
            .map(|u| u.role)
            .ok_or(Error::PermissionDenied)
    }

    fn comment_mut(&mut self, id: CommentId) -> Result<&mut Comment, Error> {
        self.comments
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(Error::CommentNotFound(id.0))
    }

    /// Persist first, then push to a connected recipient, like the real
    /// dispatcher.
    fn deliver(&mut self, batch: impl IntoIterator<Item = Notification>) {
        for n in batch {
            if let Some(feed) = self.feeds.get(&n.user_id) {
                let _ = feed.send(FeedMessage::Notification(n.clone()));
            }
            self.notifications.push(n);
        }
    }

    pub fn create_comment(&mut self, tok: AuthToken, data: NewComment) -> Result<Comment, Error> {
        data.validate()?;
        let user = self.resolve(tok)?;
        let author = self.author(user)?;
        let comment = Comment::new(author.clone(), data.story_id, data.chapter_id, data.content);
        {
            let u = self.users.get_mut(&user).expect("author resolved above");
            u.points += tier::COMMENT_AWARD;
            u.comment_count += 1;
        }
        self.comments.push(comment.clone());
        if let Some(story) = self.stories.get(&data.story_id).cloned() {
            self.deliver(Notification::for_new_comment(&story, &author, comment.id));
        }
        Ok(comment)
    }

    pub fn list_story_comments(&self, story: StoryId) -> Vec<Comment> {
        self.comments
            .iter()
            .rev()
            .filter(|c| c.story_id == story && c.chapter_id.is_none())
            .cloned()
            .collect()
    }

    pub fn list_chapter_comments(&self, story: StoryId, chapter: ChapterId) -> Vec<Comment> {
        self.comments
            .iter()
            .rev()
            .filter(|c| c.story_id == story && c.chapter_id == Some(chapter))
            .cloned()
            .collect()
    }

    pub fn toggle_comment_like(
        &mut self,
        tok: AuthToken,
        id: CommentId,
    ) -> Result<LikeStatus, Error> {
        let user = self.resolve(tok)?;
        let actor = self.author(user)?;
        let (status, comment_author, story_id) = {
            let c = self.comment_mut(id)?;
            (c.toggle_like(user), c.author.id, c.story_id)
        };
        if status.has_liked {
            self.deliver(Notification::for_comment_like(
                comment_author,
                story_id,
                id,
                &actor,
            ));
        }
        Ok(status)
    }

    pub fn add_reply(
        &mut self,
        tok: AuthToken,
        comment_id: CommentId,
        data: NewReply,
    ) -> Result<Comment, Error> {
        data.validate()?;
        let user = self.resolve(tok)?;
        let actor = self.author(user)?;
        let reply = Reply::new(actor.clone(), data.content, data.mentions);
        let (comment_author, story_id) = {
            let c = self.comment_mut(comment_id)?;
            let head = (c.author.id, c.story_id);
            c.add_reply(reply.clone());
            head
        };
        let mut batch = Vec::new();
        batch.extend(Notification::for_reply(
            comment_author,
            story_id,
            comment_id,
            &actor,
        ));
        batch.extend(Notification::for_mentions(
            &reply.mentions,
            &actor,
            story_id,
            comment_id,
        ));
        self.deliver(batch);
        Ok(self
            .comments
            .iter()
            .find(|c| c.id == comment_id)
            .cloned()
            .expect("comment updated above"))
    }

    pub fn toggle_reply_like(
        &mut self,
        tok: AuthToken,
        comment_id: CommentId,
        reply_id: ReplyId,
    ) -> Result<LikeStatus, Error> {
        let user = self.resolve(tok)?;
        let c = self.comment_mut(comment_id)?;
        let r = c
            .reply_mut(reply_id)
            .ok_or(Error::ReplyNotFound(reply_id.0))?;
        Ok(r.toggle_like(user))
    }

    pub fn delete_comment(&mut self, tok: AuthToken, id: CommentId) -> Result<(), Error> {
        let user = self.resolve(tok)?;
        let role = self.role(user)?;
        let idx = self
            .comments
            .iter()
            .position(|c| c.id == id)
            .ok_or(Error::CommentNotFound(id.0))?;
        let author = self.comments[idx].author.id;
        if author != user && role != Role::Admin {
            return Err(Error::PermissionDenied);
        }
        self.comments.remove(idx);
        if let Some(u) = self.users.get_mut(&author) {
            u.comment_count = (u.comment_count - 1).max(0);
        }
        Ok(())
    }

    pub fn delete_reply(
        &mut self,
        tok: AuthToken,
        comment_id: CommentId,
        reply_id: ReplyId,
    ) -> Result<(), Error> {
        let user = self.resolve(tok)?;
        let role = self.role(user)?;
        let c = self.comment_mut(comment_id)?;
        let r = c.reply(reply_id).ok_or(Error::ReplyNotFound(reply_id.0))?;
        if r.author.id != user && role != Role::Admin {
            return Err(Error::PermissionDenied);
        }
        c.remove_reply(reply_id);
        Ok(())
    }

    pub fn suggest_mentions(&self, query: &str, story: StoryId) -> Vec<MentionSuggestion> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for c in self.comments.iter().filter(|c| c.story_id == story) {
            if seen.insert(c.author.id) {
                candidates.push(c.author.clone());
                if candidates.len() as i64 == mention::CANDIDATE_POOL {
                    break;
                }
            }
        }
        mention::filter_suggestions(query, candidates)
    }

    pub fn notifications(
        &self,
        tok: AuthToken,
        read: Option<bool>,
    ) -> Result<Vec<Notification>, Error> {
        let user = self.resolve(tok)?;
        Ok(self
            .notifications
            .iter()
            .rev() // newest first
            .filter(|n| n.user_id == user && read.map_or(true, |r| n.read == r))
            .take(notification::LIST_CAP)
            .cloned()
            .collect())
    }

    pub fn unread_count(&self, tok: AuthToken) -> Result<usize, Error> {
        let user = self.resolve(tok)?;
        Ok(self
            .notifications
            .iter()
            .filter(|n| n.user_id == user && !n.read)
            .count())
    }

    pub fn mark_read(&mut self, tok: AuthToken, id: NotificationId) -> Result<(), Error> {
        let user = self.resolve(tok)?;
        let n = self
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user)
            .ok_or(Error::NotificationNotFound(id.0))?;
        n.read = true;
        Ok(())
    }

    pub fn mark_all_read(&mut self, tok: AuthToken) -> Result<(), Error> {
        let user = self.resolve(tok)?;
        for n in self.notifications.iter_mut().filter(|n| n.user_id == user) {
            n.read = true;
        }
        Ok(())
    }

    pub fn delete_notification(&mut self, tok: AuthToken, id: NotificationId) -> Result<(), Error> {
        let user = self.resolve(tok)?;
        let idx = self
            .notifications
            .iter()
            .position(|n| n.id == id && n.user_id == user)
            .ok_or(Error::NotificationNotFound(id.0))?;
        self.notifications.remove(idx);
        Ok(())
    }

    pub fn delete_read(&mut self, tok: AuthToken) -> Result<(), Error> {
        let user = self.resolve(tok)?;
        self.notifications
            .retain(|n| !(n.user_id == user && n.read));
        Ok(())
    }

    /// Subscribe the session's user to the live channel, replacing any
    /// previous subscription (last-writer-wins).
    pub fn notification_feed(
        &mut self,
        tok: AuthToken,
    ) -> Result<mpsc::UnboundedReceiver<FeedMessage>, Error> {
        let user = self.resolve(tok)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        self.feeds.insert(user, sender);
        Ok(receiver)
    }

    /// Collaborator event: an admin answered a contact-form message.
    pub fn contact_reply(&mut self, submitter: Option<UserId>, contact: ContactId) {
        self.deliver(Notification::for_contact_reply(submitter, contact));
    }

    /// Collaborator event: the catalog published a chapter; `recipients`
    /// is whatever audience it resolved (e.g. favoriters).
    pub fn publish_chapter(&mut self, story: StoryId, chapter_title: &str, recipients: &[UserId]) {
        if let Some(s) = self.stories.get(&story).cloned() {
            self.deliver(Notification::for_new_chapter(recipients, &s, chapter_title));
        }
    }
}
