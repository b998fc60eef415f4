use anyhow::Context;
use axum::{
    extract::{ws::Message, Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    Json,
};
use futures::{SinkExt, StreamExt};
use quill_api::{
    mention, notification, tier, AuthToken, ChapterId, Comment, CommentId, LikeStatus,
    MentionSuggestion, NewComment, NewReply, Notification, NotificationId, Reply, ReplyId, Role,
    StoryId, Uuid,
};

use crate::{db, extractors::*, notify, Error, UserFeeds};

pub async fn create_comment(
    Auth(user): Auth,
    State(feeds): State<UserFeeds>,
    mut conn: PgConn,
    Json(data): Json<NewComment>,
) -> Result<(StatusCode, Json<Comment>), Error> {
    data.validate()?;
    let author = db::fetch_author(&mut *conn, user.id)
        .await
        .context("fetching comment author")?
        .ok_or_else(|| anyhow::anyhow!("user {:?} has a session but no directory entry", user.id))?;
    let comment = Comment::new(
        author.clone(),
        data.story_id,
        data.chapter_id,
        data.content.clone(),
    );
    db::insert_comment(&mut *conn, &comment)
        .await
        .context("inserting comment")?;
    db::award_points(&mut *conn, user.id, tier::COMMENT_AWARD)
        .await
        .context("awarding comment points")?;
    db::bump_comment_count(&mut *conn, user.id, 1)
        .await
        .context("bumping comment count")?;

    // notification side effects are best-effort from here on
    match db::fetch_story(&mut *conn, data.story_id).await {
        Ok(Some(story)) => {
            notify::deliver(
                &mut *conn,
                &feeds,
                Notification::for_new_comment(&story, &author, comment.id),
            )
            .await
        }
        // unknown story: the comment stands, there is just nobody to notify
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(?err, story = ?data.story_id, "failed resolving story for notification")
        }
    }

    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn list_story_comments(
    Path(story_id): Path<StoryId>,
    mut conn: PgConn,
) -> Result<Json<Vec<Comment>>, Error> {
    Ok(Json(
        db::list_comments(&mut *conn, story_id, None)
            .await
            .with_context(|| format!("listing comments for {story_id:?}"))?,
    ))
}

pub async fn list_chapter_comments(
    Path((story_id, chapter_id)): Path<(StoryId, ChapterId)>,
    mut conn: PgConn,
) -> Result<Json<Vec<Comment>>, Error> {
    Ok(Json(
        db::list_comments(&mut *conn, story_id, Some(chapter_id))
            .await
            .with_context(|| format!("listing comments for {story_id:?} {chapter_id:?}"))?,
    ))
}

pub async fn toggle_comment_like(
    Auth(user): Auth,
    State(feeds): State<UserFeeds>,
    mut conn: PgConn,
    Path(comment_id): Path<CommentId>,
) -> Result<Json<LikeStatus>, Error> {
    let head = db::comment_head(&mut *conn, comment_id)
        .await
        .context("fetching comment head")?
        .ok_or_else(|| Error::comment_not_found(comment_id))?;
    let status = db::toggle_comment_like(&mut *conn, comment_id, user.id)
        .await
        .context("toggling comment like")?;
    // only the like edge notifies; unliking stays silent
    if status.has_liked {
        match db::fetch_author(&mut *conn, user.id).await {
            Ok(Some(actor)) => {
                notify::deliver(
                    &mut *conn,
                    &feeds,
                    Notification::for_comment_like(head.author_id, head.story_id, comment_id, &actor),
                )
                .await
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(?err, "failed resolving actor for like notification"),
        }
    }
    Ok(Json(status))
}

pub async fn add_reply(
    Auth(user): Auth,
    State(feeds): State<UserFeeds>,
    mut conn: PgConn,
    Path(comment_id): Path<CommentId>,
    Json(data): Json<NewReply>,
) -> Result<Json<Comment>, Error> {
    data.validate()?;
    let head = db::comment_head(&mut *conn, comment_id)
        .await
        .context("fetching comment head")?
        .ok_or_else(|| Error::comment_not_found(comment_id))?;
    let author = db::fetch_author(&mut *conn, user.id)
        .await
        .context("fetching reply author")?
        .ok_or_else(|| anyhow::anyhow!("user {:?} has a session but no directory entry", user.id))?;
    let reply = Reply::new(author.clone(), data.content.clone(), data.mentions.clone());
    db::add_reply(&mut *conn, comment_id, &reply)
        .await
        .context("inserting reply")?;

    let mut batch = Vec::new();
    batch.extend(Notification::for_reply(
        head.author_id,
        head.story_id,
        comment_id,
        &author,
    ));
    batch.extend(Notification::for_mentions(
        &reply.mentions,
        &author,
        head.story_id,
        comment_id,
    ));
    notify::deliver(&mut *conn, &feeds, batch).await;

    Ok(Json(
        db::fetch_comment(&mut *conn, comment_id)
            .await
            .context("fetching updated comment")?
            .ok_or_else(|| Error::comment_not_found(comment_id))?,
    ))
}

pub async fn toggle_reply_like(
    Auth(user): Auth,
    mut conn: PgConn,
    Path((comment_id, reply_id)): Path<(CommentId, ReplyId)>,
) -> Result<Json<LikeStatus>, Error> {
    if db::comment_head(&mut *conn, comment_id)
        .await
        .context("fetching comment head")?
        .is_none()
    {
        return Err(Error::comment_not_found(comment_id));
    }
    Ok(Json(
        db::toggle_reply_like(&mut *conn, comment_id, reply_id, user.id)
            .await
            .context("toggling reply like")?
            .ok_or_else(|| Error::reply_not_found(reply_id))?,
    ))
}

pub async fn delete_comment(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(comment_id): Path<CommentId>,
) -> Result<(), Error> {
    let head = db::comment_head(&mut *conn, comment_id)
        .await
        .context("fetching comment head")?
        .ok_or_else(|| Error::comment_not_found(comment_id))?;
    if head.author_id != user.id && user.role != Role::Admin {
        return Err(Error::permission_denied());
    }
    db::delete_comment(&mut *conn, comment_id)
        .await
        .context("deleting comment")?;
    db::bump_comment_count(&mut *conn, head.author_id, -1)
        .await
        .context("updating comment count")?;
    Ok(())
}

pub async fn delete_reply(
    Auth(user): Auth,
    mut conn: PgConn,
    Path((comment_id, reply_id)): Path<(CommentId, ReplyId)>,
) -> Result<(), Error> {
    if db::comment_head(&mut *conn, comment_id)
        .await
        .context("fetching comment head")?
        .is_none()
    {
        return Err(Error::comment_not_found(comment_id));
    }
    let reply_author = db::reply_head(&mut *conn, comment_id, reply_id)
        .await
        .context("fetching reply head")?
        .ok_or_else(|| Error::reply_not_found(reply_id))?;
    if reply_author != user.id && user.role != Role::Admin {
        return Err(Error::permission_denied());
    }
    db::delete_reply(&mut *conn, comment_id, reply_id)
        .await
        .context("deleting reply")?;
    Ok(())
}

#[derive(serde::Deserialize)]
pub struct SuggestionParams {
    #[serde(default)]
    pub query: String,
    pub story_id: StoryId,
}

pub async fn mention_suggestions(
    Query(params): Query<SuggestionParams>,
    mut conn: PgConn,
) -> Result<Json<Vec<MentionSuggestion>>, Error> {
    let candidates = db::story_commenters(&mut *conn, params.story_id, mention::CANDIDATE_POOL)
        .await
        .context("listing story commenters")?;
    Ok(Json(mention::filter_suggestions(&params.query, candidates)))
}

#[derive(serde::Deserialize)]
pub struct NotificationListParams {
    pub read: Option<bool>,
}

pub async fn list_notifications(
    Auth(user): Auth,
    Query(params): Query<NotificationListParams>,
    mut conn: PgConn,
) -> Result<Json<Vec<Notification>>, Error> {
    Ok(Json(
        db::list_notifications(
            &mut *conn,
            user.id,
            params.read,
            notification::LIST_CAP as i64,
        )
        .await
        .with_context(|| format!("listing notifications for {:?}", user.id))?,
    ))
}

pub async fn unread_count(Auth(user): Auth, mut conn: PgConn) -> Result<Json<i64>, Error> {
    Ok(Json(
        db::unread_count(&mut *conn, user.id)
            .await
            .with_context(|| format!("counting unread notifications for {:?}", user.id))?,
    ))
}

pub async fn mark_read(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(notification_id): Path<NotificationId>,
) -> Result<(), Error> {
    if !db::mark_read(&mut *conn, user.id, notification_id)
        .await
        .context("marking notification read")?
    {
        return Err(Error::notification_not_found(notification_id));
    }
    Ok(())
}

pub async fn mark_all_read(Auth(user): Auth, mut conn: PgConn) -> Result<(), Error> {
    db::mark_all_read(&mut *conn, user.id)
        .await
        .context("marking all notifications read")?;
    Ok(())
}

pub async fn delete_notification(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(notification_id): Path<NotificationId>,
) -> Result<(), Error> {
    if !db::delete_notification(&mut *conn, user.id, notification_id)
        .await
        .context("deleting notification")?
    {
        return Err(Error::notification_not_found(notification_id));
    }
    Ok(())
}

pub async fn delete_read(Auth(user): Auth, mut conn: PgConn) -> Result<(), Error> {
    db::delete_read(&mut *conn, user.id)
        .await
        .context("deleting read notifications")?;
    Ok(())
}

pub async fn notification_feed(
    ws: WebSocketUpgrade,
    State(db): State<PgPool>,
    State(feeds): State<UserFeeds>,
) -> Result<axum::response::Response, Error> {
    Ok(ws.on_upgrade(move |sock| {
        let (write, read) = sock.split();
        notification_feed_impl(write, read, db, feeds)
    }))
}

/// The handshake authenticates the channel itself: the first text frame
/// must be a session token, and the socket only joins the registry for
/// the user that token resolves to.
pub async fn notification_feed_impl<W, R>(mut write: W, mut read: R, db: PgPool, feeds: UserFeeds)
where
    W: 'static + Send + Unpin + futures::Sink<Message>,
    <W as futures::Sink<Message>>::Error: Send,
    R: 'static + Send + Unpin + futures::Stream<Item = Result<Message, axum::Error>>,
{
    tracing::debug!("notification feed websocket connected");
    if let Some(Ok(Message::Text(token))) = read.next().await {
        if let Ok(token) = Uuid::try_from(&token as &str) {
            if let Ok(mut conn) = db.acquire().await {
                if let Ok(Some(user)) = db::recover_session(&mut *conn, AuthToken(token)).await {
                    if let Ok(_) = write.send(Message::Text(String::from("ok"))).await {
                        tracing::debug!(?user, "notification feed websocket auth success");
                        feeds.add_for_user(user.id, write, read).await;
                        return;
                    }
                }
            }
        }
        tracing::debug!(?token, "notification feed websocket auth failure");
        let _ = write
            .send(Message::Text(String::from("permission denied")))
            .await;
    }
}
