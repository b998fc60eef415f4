use std::{collections::HashMap, sync::Arc};

use axum::extract::ws::Message;
use futures::{channel::mpsc, select, SinkExt, StreamExt};
use quill_api::{FeedMessage, Notification, UserId, Uuid};
use tokio::sync::RwLock;

/// Process-local presence registry: user id -> live socket. Nothing here
/// is persisted; a restart starts from empty and every user counts as
/// offline until their client reconnects.
#[derive(Clone, Debug)]
pub struct UserFeeds(Arc<RwLock<HashMap<UserId, Socket>>>);

#[derive(Debug)]
struct Socket {
    id: Uuid,
    sender: mpsc::UnboundedSender<FeedMessage>,
}

impl UserFeeds {
    pub fn new() -> UserFeeds {
        UserFeeds(Arc::new(RwLock::new(HashMap::new())))
    }

    pub async fn is_online(&self, user: UserId) -> bool {
        self.0.read().await.contains_key(&user)
    }

    /// Best-effort push to the recipient's socket; a no-op when they are
    /// offline (the persisted record is what they poll for later).
    pub async fn push(&self, n: &Notification) {
        if let Some(sock) = self.0.read().await.get(&n.user_id) {
            let _ = sock.sender.unbounded_send(FeedMessage::Notification(n.clone()));
        }
    }

    pub async fn add_for_user<W, R>(self, user: UserId, mut write: W, read: R)
    where
        W: 'static + Send + Unpin + futures::Sink<Message>,
        <W as futures::Sink<Message>>::Error: Send,
        R: 'static + Send + Unpin + futures::Stream<Item = Result<Message, axum::Error>>,
    {
        // Create relayer channel
        // Note: if this were bounded, there would be a deadlock between the write-lock to remove a socket and the read-lock to push an event
        let (sender, mut receiver) = mpsc::unbounded();
        let sock_id = Uuid::new_v4();

        // Last-writer-wins: a second login replaces the previous socket,
        // whose relay loop then exits on its dead receiver.
        self.0
            .write()
            .await
            .insert(user, Socket { id: sock_id, sender });

        // Start relayer queue
        let this = self.clone();
        let mut read = read.fuse();
        tokio::spawn(async move {
            macro_rules! remove_self {
                () => {{
                    let mut feeds = this.0.write().await;
                    // only remove the entry if it is still ours, not a newer login's
                    if feeds.get(&user).map_or(false, |s| s.id == sock_id) {
                        feeds.remove(&user);
                    }
                    return;
                }};
            }
            macro_rules! send_message {
                ( $msg:expr ) => {{
                    let msg: FeedMessage = $msg;
                    let json = match serde_json::to_vec(&msg) {
                        Ok(json) => json,
                        Err(err) => {
                            tracing::error!(?err, ?msg, "failed serializing message to json");
                            continue;
                        }
                    };
                    if let Err(_) = write.send(Message::Binary(json)).await {
                        remove_self!();
                    }
                }};
            }
            loop {
                select! {
                    msg = receiver.next() => match msg {
                        None => remove_self!(),
                        Some(msg) => send_message!(msg),
                    },
                    msg = read.next() => match msg {
                        None => remove_self!(),
                        Some(Ok(Message::Close(_))) => remove_self!(),
                        Some(Ok(Message::Text(msg))) => {
                            if msg != "ping" {
                                tracing::warn!("received unexpected message from client: {msg:?}");
                                remove_self!();
                            }
                            send_message!(FeedMessage::Pong);
                        }
                        Some(msg) => {
                            tracing::warn!("received unexpected message from client: {msg:?}");
                            remove_self!();
                        }
                    },
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use quill_api::{Author, CommentId, StoryId, StoryRef};

    use super::*;

    type ClientWrite = mpsc::UnboundedSender<Result<Message, axum::Error>>;
    type ClientRead = mpsc::UnboundedReceiver<Message>;

    async fn connect(feeds: &UserFeeds, user: UserId) -> (ClientWrite, ClientRead) {
        let (write, client_read) = mpsc::unbounded();
        let (client_write, read) = mpsc::unbounded();
        feeds.clone().add_for_user(user, write, read).await;
        (client_write, client_read)
    }

    fn notification_for(user: UserId) -> Notification {
        let story = StoryRef {
            id: StoryId(Uuid::new_v4()),
            author_id: user,
            title: String::from("The Long Road"),
        };
        let actor = Author {
            id: UserId(Uuid::new_v4()),
            username: String::from("bob"),
            avatar_url: None,
        };
        Notification::for_new_comment(&story, &actor, CommentId(Uuid::new_v4()))
            .expect("actor is not the story author")
    }

    async fn wait_offline(feeds: &UserFeeds, user: UserId) {
        for _ in 0..100 {
            if !feeds.is_online(user).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("user {user:?} never left the registry");
    }

    #[tokio::test]
    async fn push_reaches_the_connected_user() {
        let feeds = UserFeeds::new();
        let user = UserId(Uuid::new_v4());
        let (_client_write, mut client_read) = connect(&feeds, user).await;
        assert!(feeds.is_online(user).await);

        let n = notification_for(user);
        feeds.push(&n).await;
        match client_read.next().await {
            Some(Message::Binary(json)) => {
                let msg: FeedMessage =
                    serde_json::from_slice(&json).expect("deserializing feed message");
                match msg {
                    FeedMessage::Notification(got) => assert_eq!(got.id, n.id),
                    msg => panic!("expected notification, got {msg:?}"),
                }
            }
            msg => panic!("expected binary frame, got {msg:?}"),
        }
    }

    #[tokio::test]
    async fn push_to_offline_user_is_a_no_op() {
        let feeds = UserFeeds::new();
        let user = UserId(Uuid::new_v4());
        assert!(!feeds.is_online(user).await);
        feeds.push(&notification_for(user)).await;
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let feeds = UserFeeds::new();
        let user = UserId(Uuid::new_v4());
        let (mut client_write, mut client_read) = connect(&feeds, user).await;

        client_write
            .send(Ok(Message::Text(String::from("ping"))))
            .await
            .expect("sending ping");
        match client_read.next().await {
            Some(Message::Binary(json)) => {
                let msg: FeedMessage =
                    serde_json::from_slice(&json).expect("deserializing feed message");
                assert!(matches!(msg, FeedMessage::Pong));
            }
            msg => panic!("expected binary frame, got {msg:?}"),
        }
    }

    #[tokio::test]
    async fn close_removes_the_user_from_the_registry() {
        let feeds = UserFeeds::new();
        let user = UserId(Uuid::new_v4());
        let (mut client_write, _client_read) = connect(&feeds, user).await;
        assert!(feeds.is_online(user).await);

        client_write
            .send(Ok(Message::Close(None)))
            .await
            .expect("sending close");
        wait_offline(&feeds, user).await;
    }

    #[tokio::test]
    async fn unexpected_client_frames_drop_the_socket() {
        let feeds = UserFeeds::new();
        let user = UserId(Uuid::new_v4());
        let (mut client_write, _client_read) = connect(&feeds, user).await;

        client_write
            .send(Ok(Message::Text(String::from("spam"))))
            .await
            .expect("sending frame");
        wait_offline(&feeds, user).await;
    }

    #[tokio::test]
    async fn second_login_wins() {
        let feeds = UserFeeds::new();
        let user = UserId(Uuid::new_v4());
        let (_first_write, mut first_read) = connect(&feeds, user).await;
        let (_second_write, mut second_read) = connect(&feeds, user).await;

        // the first relay loop shuts down once its registry slot is taken over
        assert!(first_read.next().await.is_none());
        assert!(feeds.is_online(user).await);

        let n = notification_for(user);
        feeds.push(&n).await;
        match second_read.next().await {
            Some(Message::Binary(json)) => {
                let msg: FeedMessage =
                    serde_json::from_slice(&json).expect("deserializing feed message");
                assert!(matches!(msg, FeedMessage::Notification(got) if got.id == n.id));
            }
            msg => panic!("expected binary frame, got {msg:?}"),
        }
    }
}
