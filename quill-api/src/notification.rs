use std::collections::HashSet;
use std::str::FromStr;

use chrono::Utc;
use uuid::Uuid;

use crate::{Author, CommentId, Mention, StoryId, StoryRef, Time, UserId, STUB_UUID};

/// Newest-first listings are capped at this many records.
pub const LIST_CAP: usize = 50;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NotificationId(pub Uuid);

impl NotificationId {
    pub fn stub() -> NotificationId {
        NotificationId(STUB_UUID)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ContactId(pub Uuid);

impl ContactId {
    pub fn stub() -> ContactId {
        ContactId(STUB_UUID)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewChapter,
    Mention,
    Reply,
    Like,
    Comment,
    ContactReply,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewChapter => "new_chapter",
            NotificationKind::Mention => "mention",
            NotificationKind::Reply => "reply",
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::ContactReply => "contact_reply",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<NotificationKind> {
        match s {
            "new_chapter" => Ok(NotificationKind::NewChapter),
            "mention" => Ok(NotificationKind::Mention),
            "reply" => Ok(NotificationKind::Reply),
            "like" => Ok(NotificationKind::Like),
            "comment" => Ok(NotificationKind::Comment),
            "contact_reply" => Ok(NotificationKind::ContactReply),
            _ => Err(anyhow::anyhow!("unknown notification kind {s:?}")),
        }
    }
}

/// One persisted notification. Immutable except for `read`, which only
/// ever goes false -> true. The message and the optional references are
/// snapshots taken at creation time, not live foreign keys, so a comment
/// or story deleted later leaves them stale but harmless.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Notification {
    pub id: NotificationId,
    /// Recipient.
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub message: String,
    pub story_id: Option<StoryId>,
    pub comment_id: Option<CommentId>,
    pub contact_id: Option<ContactId>,
    /// Actor that caused the notification, when there is one.
    pub triggered_by: Option<UserId>,
    pub read: bool,
    pub created_at: Time,
}

impl Notification {
    fn new(recipient: UserId, kind: NotificationKind, message: String) -> Notification {
        Notification {
            id: NotificationId(Uuid::new_v4()),
            user_id: recipient,
            kind,
            message,
            story_id: None,
            comment_id: None,
            contact_id: None,
            triggered_by: None,
            read: false,
            created_at: Utc::now(),
        }
    }

    /// A new comment notifies the story's author, unless they wrote the
    /// comment themselves.
    pub fn for_new_comment(
        story: &StoryRef,
        actor: &Author,
        comment_id: CommentId,
    ) -> Option<Notification> {
        if story.author_id == actor.id {
            return None;
        }
        let mut n = Notification::new(
            story.author_id,
            NotificationKind::Comment,
            format!(
                "{} commented on your story \"{}\"",
                actor.username, story.title
            ),
        );
        n.story_id = Some(story.id);
        n.comment_id = Some(comment_id);
        n.triggered_by = Some(actor.id);
        Some(n)
    }

    /// A reply notifies the parent comment's author, unless they replied
    /// to themselves.
    pub fn for_reply(
        comment_author: UserId,
        story_id: StoryId,
        comment_id: CommentId,
        actor: &Author,
    ) -> Option<Notification> {
        if comment_author == actor.id {
            return None;
        }
        let mut n = Notification::new(
            comment_author,
            NotificationKind::Reply,
            format!("{} replied to your comment", actor.username),
        );
        n.story_id = Some(story_id);
        n.comment_id = Some(comment_id);
        n.triggered_by = Some(actor.id);
        Some(n)
    }

    /// One notification per distinct mentioned user, skipping the actor.
    pub fn for_mentions(
        mentions: &[Mention],
        actor: &Author,
        story_id: StoryId,
        comment_id: CommentId,
    ) -> Vec<Notification> {
        let mut seen = HashSet::new();
        mentions
            .iter()
            .filter(|m| m.user_id != actor.id && seen.insert(m.user_id))
            .map(|m| {
                let mut n = Notification::new(
                    m.user_id,
                    NotificationKind::Mention,
                    format!("{} mentioned you in a reply", actor.username),
                );
                n.story_id = Some(story_id);
                n.comment_id = Some(comment_id);
                n.triggered_by = Some(actor.id);
                n
            })
            .collect()
    }

    /// Emitted on the like edge of the toggle only; unliking is silent,
    /// as is liking your own comment.
    pub fn for_comment_like(
        comment_author: UserId,
        story_id: StoryId,
        comment_id: CommentId,
        actor: &Author,
    ) -> Option<Notification> {
        if comment_author == actor.id {
            return None;
        }
        let mut n = Notification::new(
            comment_author,
            NotificationKind::Like,
            format!("{} liked your comment", actor.username),
        );
        n.story_id = Some(story_id);
        n.comment_id = Some(comment_id);
        n.triggered_by = Some(actor.id);
        Some(n)
    }

    /// Contact-form replies only reach submitters who were authenticated
    /// when they wrote in.
    pub fn for_contact_reply(
        submitter: Option<UserId>,
        contact_id: ContactId,
    ) -> Option<Notification> {
        let submitter = submitter?;
        let mut n = Notification::new(
            submitter,
            NotificationKind::ContactReply,
            String::from("You have a reply to your contact message"),
        );
        n.contact_id = Some(contact_id);
        Some(n)
    }

    /// Chapter publication fan-out; the catalog resolves the recipient
    /// list (e.g. favoriters) and the story's own author is skipped.
    pub fn for_new_chapter(
        recipients: &[UserId],
        story: &StoryRef,
        chapter_title: &str,
    ) -> Vec<Notification> {
        let mut seen = HashSet::new();
        recipients
            .iter()
            .filter(|u| **u != story.author_id && seen.insert(**u))
            .map(|u| {
                let mut n = Notification::new(
                    *u,
                    NotificationKind::NewChapter,
                    format!(
                        "New chapter \"{}\" published on \"{}\"",
                        chapter_title, story.title
                    ),
                );
                n.story_id = Some(story.id);
                n.triggered_by = Some(story.author_id);
                n
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author(id: UserId, name: &str) -> Author {
        Author {
            id,
            username: name.to_string(),
            avatar_url: None,
        }
    }

    fn story(author_id: UserId) -> StoryRef {
        StoryRef {
            id: StoryId(Uuid::new_v4()),
            author_id,
            title: String::from("The Long Road"),
        }
    }

    #[test]
    fn comment_notifies_story_author_but_not_self() {
        let writer = UserId(Uuid::new_v4());
        let commenter = author(UserId(Uuid::new_v4()), "bob");
        let s = story(writer);

        let n = Notification::for_new_comment(&s, &commenter, CommentId::stub())
            .expect("author should be notified");
        assert_eq!(n.user_id, writer);
        assert_eq!(n.kind, NotificationKind::Comment);
        assert_eq!(n.triggered_by, Some(commenter.id));
        assert!(!n.read);
        assert!(n.message.contains("bob"));
        assert!(n.message.contains("The Long Road"));

        let self_comment = Notification::for_new_comment(&s, &author(writer, "writer"), CommentId::stub());
        assert!(self_comment.is_none());
    }

    #[test]
    fn reply_to_own_comment_is_silent() {
        let actor = author(UserId(Uuid::new_v4()), "bob");
        assert!(Notification::for_reply(actor.id, StoryId::stub(), CommentId::stub(), &actor).is_none());
        let other = UserId(Uuid::new_v4());
        let n = Notification::for_reply(other, StoryId::stub(), CommentId::stub(), &actor).unwrap();
        assert_eq!(n.kind, NotificationKind::Reply);
        assert_eq!(n.user_id, other);
    }

    #[test]
    fn mentions_deduplicate_and_skip_actor() {
        let actor = author(UserId(Uuid::new_v4()), "bob");
        let friend = UserId(Uuid::new_v4());
        let mentions = vec![
            Mention {
                user_id: friend,
                username: String::from("carol"),
            },
            Mention {
                user_id: friend,
                username: String::from("carol"),
            },
            Mention {
                user_id: actor.id,
                username: String::from("bob"),
            },
        ];
        let out = Notification::for_mentions(&mentions, &actor, StoryId::stub(), CommentId::stub());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].user_id, friend);
        assert_eq!(out[0].kind, NotificationKind::Mention);
    }

    #[test]
    fn contact_reply_requires_authenticated_submitter() {
        assert!(Notification::for_contact_reply(None, ContactId::stub()).is_none());
        let submitter = UserId(Uuid::new_v4());
        let n = Notification::for_contact_reply(Some(submitter), ContactId::stub()).unwrap();
        assert_eq!(n.user_id, submitter);
        assert_eq!(n.contact_id, Some(ContactId::stub()));
    }

    #[test]
    fn new_chapter_skips_the_author() {
        let writer = UserId(Uuid::new_v4());
        let s = story(writer);
        let fans = vec![writer, UserId(Uuid::new_v4()), UserId(Uuid::new_v4())];
        let out = Notification::for_new_chapter(&fans, &s, "Chapter 12");
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|n| n.user_id != writer));
        assert!(out.iter().all(|n| n.kind == NotificationKind::NewChapter));
    }
}
