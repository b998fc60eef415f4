use crate::Notification;

/// Server-to-client frames on the live channel. There is no replay or
/// acknowledgment; missed pushes are recovered by polling the store.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub enum FeedMessage {
    Pong,
    Notification(Notification),
}
