use quill_api::Notification;

use crate::{db, UserFeeds};

/// Best-effort fan-out: persist each notification (the durable source of
/// truth), then push it to the recipient if they are connected. A failed
/// write is logged and the record dropped; dispatch never fails the
/// action that triggered it.
pub async fn deliver(
    conn: &mut sqlx::PgConnection,
    feeds: &UserFeeds,
    batch: impl IntoIterator<Item = Notification>,
) {
    for n in batch {
        if let Err(err) = db::insert_notification(&mut *conn, &n).await {
            tracing::warn!(
                ?err,
                recipient = ?n.user_id,
                kind = ?n.kind,
                "failed persisting notification"
            );
            continue;
        }
        feeds.push(&n).await;
    }
}
