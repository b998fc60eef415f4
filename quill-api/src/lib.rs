pub use uuid::{uuid, Uuid};

pub type Time = chrono::DateTime<chrono::Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

mod auth;
mod comment;
mod error;
mod feed;
pub mod mention;
pub mod notification;
mod story;
pub mod tier;
mod user;

pub use auth::AuthToken;
pub use comment::{Comment, CommentId, LikeStatus, Mention, NewComment, NewReply, Reply, ReplyId};
pub use error::Error;
pub use feed::FeedMessage;
pub use mention::MentionSuggestion;
pub use notification::{ContactId, Notification, NotificationId, NotificationKind};
pub use story::{ChapterId, StoryId, StoryRef};
pub use tier::Tier;
pub use user::{Author, Role, UserId};

/// Postgres TEXT columns cannot hold null bytes, so reject them at the
/// boundary rather than letting the insert fail.
pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(s.to_string()));
    }
    Ok(())
}
