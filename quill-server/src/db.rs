use std::collections::{HashMap, HashSet};

use anyhow::Context;
use quill_api::{
    Author, AuthToken, ChapterId, Comment, CommentId, ContactId, LikeStatus, Mention,
    Notification, NotificationId, Reply, ReplyId, StoryId, StoryRef, Time, UserId, Uuid,
};
use sqlx::Row;

use crate::extractors::AuthedUser;

pub async fn recover_session(
    conn: &mut sqlx::PgConnection,
    token: AuthToken,
) -> anyhow::Result<Option<AuthedUser>> {
    let row = sqlx::query(
        "
            SELECT u.id, u.role
                FROM sessions s
            INNER JOIN users u
                ON u.id = s.user_id
            WHERE s.token = $1
        ",
    )
    .bind(token.0)
    .fetch_optional(&mut *conn)
    .await
    .context("querying sessions table")?;
    match row {
        None => Ok(None),
        Some(r) => {
            let role: String = r.try_get("role").context("retrieving the role field")?;
            Ok(Some(AuthedUser {
                id: UserId(r.try_get("id").context("retrieving the id field")?),
                role: role.parse()?,
            }))
        }
    }
}

pub async fn fetch_author(
    conn: &mut sqlx::PgConnection,
    user: UserId,
) -> anyhow::Result<Option<Author>> {
    let row = sqlx::query("SELECT id, username, avatar_url FROM users WHERE id = $1")
        .bind(user.0)
        .fetch_optional(conn)
        .await
        .context("querying users table")?;
    row.map(|r| author_from_row(&r)).transpose()
}

pub async fn fetch_story(
    conn: &mut sqlx::PgConnection,
    story: StoryId,
) -> anyhow::Result<Option<StoryRef>> {
    let row = sqlx::query("SELECT id, author_id, title FROM stories WHERE id = $1")
        .bind(story.0)
        .fetch_optional(conn)
        .await
        .context("querying stories table")?;
    match row {
        None => Ok(None),
        Some(r) => Ok(Some(StoryRef {
            id: StoryId(r.try_get("id").context("retrieving the id field")?),
            author_id: UserId(
                r.try_get("author_id")
                    .context("retrieving the author_id field")?,
            ),
            title: r.try_get("title").context("retrieving the title field")?,
        })),
    }
}

pub async fn award_points(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    amount: i64,
) -> anyhow::Result<()> {
    let res = sqlx::query("UPDATE users SET points = points + $2 WHERE id = $1")
        .bind(user.0)
        .bind(amount)
        .execute(conn)
        .await
        .context("updating user points")?;
    anyhow::ensure!(
        res.rows_affected() == 1,
        "points update for {:?} affected {} rows",
        user,
        res.rows_affected()
    );
    Ok(())
}

/// `delta` may be negative; the counter never drops below zero.
pub async fn bump_comment_count(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    delta: i64,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE users SET comment_count = GREATEST(comment_count + $2, 0) WHERE id = $1")
        .bind(user.0)
        .bind(delta)
        .execute(conn)
        .await
        .context("updating user comment count")?;
    Ok(())
}

pub async fn insert_comment(conn: &mut sqlx::PgConnection, c: &Comment) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO comments VALUES ($1, $2, $3, $4, $5, $6)")
        .bind(c.id.0)
        .bind(c.author.id.0)
        .bind(c.story_id.0)
        .bind(c.chapter_id.map(|c| c.0))
        .bind(&c.content)
        .bind(c.created_at)
        .execute(conn)
        .await
        .with_context(|| format!("inserting comment {:?}", c.id))?;
    Ok(())
}

pub struct CommentHead {
    pub author_id: UserId,
    pub story_id: StoryId,
}

pub async fn comment_head(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
) -> anyhow::Result<Option<CommentHead>> {
    let row = sqlx::query("SELECT author_id, story_id FROM comments WHERE id = $1")
        .bind(comment.0)
        .fetch_optional(conn)
        .await
        .context("querying comments table")?;
    match row {
        None => Ok(None),
        Some(r) => Ok(Some(CommentHead {
            author_id: UserId(
                r.try_get("author_id")
                    .context("retrieving the author_id field")?,
            ),
            story_id: StoryId(
                r.try_get("story_id")
                    .context("retrieving the story_id field")?,
            ),
        })),
    }
}

const COMMENT_COLUMNS: &str = "
    SELECT c.id, c.author_id, c.story_id, c.chapter_id, c.content, c.created_at,
           u.username, u.avatar_url
        FROM comments c
    INNER JOIN users u
        ON u.id = c.author_id
";

pub async fn fetch_comment(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
) -> anyhow::Result<Option<Comment>> {
    let rows = sqlx::query(&format!("{COMMENT_COLUMNS} WHERE c.id = $1"))
        .bind(comment.0)
        .fetch_all(&mut *conn)
        .await
        .context("querying comments table")?;
    Ok(assemble_comments(&mut *conn, rows).await?.pop())
}

pub async fn list_comments(
    conn: &mut sqlx::PgConnection,
    story: StoryId,
    chapter: Option<ChapterId>,
) -> anyhow::Result<Vec<Comment>> {
    let rows = match chapter {
        None => {
            sqlx::query(&format!(
                "{COMMENT_COLUMNS}
                WHERE c.story_id = $1
                AND c.chapter_id IS NULL
                ORDER BY c.created_at DESC"
            ))
            .bind(story.0)
            .fetch_all(&mut *conn)
            .await
        }
        Some(chapter) => {
            sqlx::query(&format!(
                "{COMMENT_COLUMNS}
                WHERE c.story_id = $1
                AND c.chapter_id = $2
                ORDER BY c.created_at DESC"
            ))
            .bind(story.0)
            .bind(chapter.0)
            .fetch_all(&mut *conn)
            .await
        }
    }
    .context("querying comments table")?;
    assemble_comments(&mut *conn, rows).await
}

fn author_from_row(r: &sqlx::postgres::PgRow) -> anyhow::Result<Author> {
    Ok(Author {
        id: UserId(r.try_get("id").context("retrieving the id field")?),
        username: r
            .try_get("username")
            .context("retrieving the username field")?,
        avatar_url: r
            .try_get("avatar_url")
            .context("retrieving the avatar_url field")?,
    })
}

/// Hydrates like sets and reply lists for a page of comment rows, keeping
/// the row order of `rows`.
async fn assemble_comments(
    conn: &mut sqlx::PgConnection,
    rows: Vec<sqlx::postgres::PgRow>,
) -> anyhow::Result<Vec<Comment>> {
    let mut comments = Vec::with_capacity(rows.len());
    for r in rows {
        comments.push(Comment {
            id: CommentId(r.try_get("id").context("retrieving the id field")?),
            author: Author {
                id: UserId(
                    r.try_get("author_id")
                        .context("retrieving the author_id field")?,
                ),
                username: r
                    .try_get("username")
                    .context("retrieving the username field")?,
                avatar_url: r
                    .try_get("avatar_url")
                    .context("retrieving the avatar_url field")?,
            },
            story_id: StoryId(
                r.try_get("story_id")
                    .context("retrieving the story_id field")?,
            ),
            chapter_id: r
                .try_get::<Option<Uuid>, _>("chapter_id")
                .context("retrieving the chapter_id field")?
                .map(ChapterId),
            content: r
                .try_get("content")
                .context("retrieving the content field")?,
            liked_by: HashSet::new(),
            replies: Vec::new(),
            created_at: r
                .try_get("created_at")
                .context("retrieving the created_at field")?,
        });
    }
    if comments.is_empty() {
        return Ok(comments);
    }
    let ids: Vec<Uuid> = comments.iter().map(|c| c.id.0).collect();
    let by_id: HashMap<Uuid, usize> = comments
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.0, i))
        .collect();

    let likes =
        sqlx::query("SELECT comment_id, user_id FROM comment_likes WHERE comment_id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *conn)
            .await
            .context("querying comment_likes table")?;
    for r in likes {
        let comment: Uuid = r
            .try_get("comment_id")
            .context("retrieving the comment_id field")?;
        if let Some(&i) = by_id.get(&comment) {
            comments[i].liked_by.insert(UserId(
                r.try_get("user_id")
                    .context("retrieving the user_id field")?,
            ));
        }
    }

    let replies = sqlx::query(
        "
            SELECT r.comment_id, r.id, r.author_id, r.content, r.mentions, r.created_at,
                   u.username, u.avatar_url
                FROM replies r
            INNER JOIN users u
                ON u.id = r.author_id
            WHERE r.comment_id = ANY($1)
            ORDER BY r.created_at
        ",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .context("querying replies table")?;
    for r in replies {
        let comment: Uuid = r
            .try_get("comment_id")
            .context("retrieving the comment_id field")?;
        if let Some(&i) = by_id.get(&comment) {
            comments[i].replies.push(Reply {
                id: ReplyId(r.try_get("id").context("retrieving the id field")?),
                author: Author {
                    id: UserId(
                        r.try_get("author_id")
                            .context("retrieving the author_id field")?,
                    ),
                    username: r
                        .try_get("username")
                        .context("retrieving the username field")?,
                    avatar_url: r
                        .try_get("avatar_url")
                        .context("retrieving the avatar_url field")?,
                },
                content: r
                    .try_get("content")
                    .context("retrieving the content field")?,
                mentions: r
                    .try_get::<sqlx::types::Json<Vec<Mention>>, _>("mentions")
                    .context("retrieving the mentions field")?
                    .0,
                liked_by: HashSet::new(),
                created_at: r
                    .try_get("created_at")
                    .context("retrieving the created_at field")?,
            });
        }
    }

    let reply_likes = sqlx::query(
        "SELECT comment_id, reply_id, user_id FROM reply_likes WHERE comment_id = ANY($1)",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .context("querying reply_likes table")?;
    for r in reply_likes {
        let comment: Uuid = r
            .try_get("comment_id")
            .context("retrieving the comment_id field")?;
        let reply = ReplyId(
            r.try_get("reply_id")
                .context("retrieving the reply_id field")?,
        );
        let user = UserId(
            r.try_get("user_id")
                .context("retrieving the user_id field")?,
        );
        if let Some(&i) = by_id.get(&comment) {
            if let Some(reply) = comments[i].reply_mut(reply) {
                reply.liked_by.insert(user);
            }
        }
    }

    Ok(comments)
}

pub async fn toggle_comment_like(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
    user: UserId,
) -> anyhow::Result<LikeStatus> {
    let liked: bool = sqlx::query(
        "SELECT EXISTS(SELECT 1 FROM comment_likes WHERE comment_id = $1 AND user_id = $2) AS liked",
    )
    .bind(comment.0)
    .bind(user.0)
    .fetch_one(&mut *conn)
    .await
    .context("checking current like state")?
    .try_get("liked")
    .context("retrieving the liked field")?;
    if liked {
        sqlx::query("DELETE FROM comment_likes WHERE comment_id = $1 AND user_id = $2")
            .bind(comment.0)
            .bind(user.0)
            .execute(&mut *conn)
            .await
            .context("removing comment like")?;
    } else {
        sqlx::query("INSERT INTO comment_likes VALUES ($1, $2)")
            .bind(comment.0)
            .bind(user.0)
            .execute(&mut *conn)
            .await
            .context("inserting comment like")?;
    }
    let likes: i64 = sqlx::query("SELECT COUNT(*) AS likes FROM comment_likes WHERE comment_id = $1")
        .bind(comment.0)
        .fetch_one(&mut *conn)
        .await
        .context("counting comment likes")?
        .try_get("likes")
        .context("retrieving the likes field")?;
    Ok(LikeStatus {
        likes: likes as u64,
        has_liked: !liked,
    })
}

pub async fn add_reply(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
    reply: &Reply,
) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO replies VALUES ($1, $2, $3, $4, $5, $6)")
        .bind(comment.0)
        .bind(reply.id.0)
        .bind(reply.author.id.0)
        .bind(&reply.content)
        .bind(sqlx::types::Json(&reply.mentions))
        .bind(reply.created_at)
        .execute(conn)
        .await
        .with_context(|| format!("inserting reply {:?} on comment {:?}", reply.id, comment))?;
    Ok(())
}

pub async fn reply_head(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
    reply: ReplyId,
) -> anyhow::Result<Option<UserId>> {
    let row = sqlx::query("SELECT author_id FROM replies WHERE comment_id = $1 AND id = $2")
        .bind(comment.0)
        .bind(reply.0)
        .fetch_optional(conn)
        .await
        .context("querying replies table")?;
    match row {
        None => Ok(None),
        Some(r) => Ok(Some(UserId(
            r.try_get("author_id")
                .context("retrieving the author_id field")?,
        ))),
    }
}

pub async fn toggle_reply_like(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
    reply: ReplyId,
    user: UserId,
) -> anyhow::Result<Option<LikeStatus>> {
    if reply_head(&mut *conn, comment, reply).await?.is_none() {
        return Ok(None);
    }
    let liked: bool = sqlx::query(
        "SELECT EXISTS(
            SELECT 1 FROM reply_likes WHERE comment_id = $1 AND reply_id = $2 AND user_id = $3
        ) AS liked",
    )
    .bind(comment.0)
    .bind(reply.0)
    .bind(user.0)
    .fetch_one(&mut *conn)
    .await
    .context("checking current like state")?
    .try_get("liked")
    .context("retrieving the liked field")?;
    if liked {
        sqlx::query(
            "DELETE FROM reply_likes WHERE comment_id = $1 AND reply_id = $2 AND user_id = $3",
        )
        .bind(comment.0)
        .bind(reply.0)
        .bind(user.0)
        .execute(&mut *conn)
        .await
        .context("removing reply like")?;
    } else {
        sqlx::query("INSERT INTO reply_likes VALUES ($1, $2, $3)")
            .bind(comment.0)
            .bind(reply.0)
            .bind(user.0)
            .execute(&mut *conn)
            .await
            .context("inserting reply like")?;
    }
    let likes: i64 = sqlx::query(
        "SELECT COUNT(*) AS likes FROM reply_likes WHERE comment_id = $1 AND reply_id = $2",
    )
    .bind(comment.0)
    .bind(reply.0)
    .fetch_one(&mut *conn)
    .await
    .context("counting reply likes")?
    .try_get("likes")
    .context("retrieving the likes field")?;
    Ok(Some(LikeStatus {
        likes: likes as u64,
        has_liked: !liked,
    }))
}

/// Cascades through the aggregate (likes, replies, reply likes) via the
/// schema; notifications referencing the comment are left alone.
pub async fn delete_comment(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(comment.0)
        .execute(conn)
        .await
        .with_context(|| format!("deleting comment {comment:?}"))?;
    Ok(res.rows_affected() == 1)
}

pub async fn delete_reply(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
    reply: ReplyId,
) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM replies WHERE comment_id = $1 AND id = $2")
        .bind(comment.0)
        .bind(reply.0)
        .execute(conn)
        .await
        .with_context(|| format!("deleting reply {reply:?} on comment {comment:?}"))?;
    Ok(res.rows_affected() == 1)
}

/// The first `limit` distinct users to have commented on the story, in
/// order of their earliest comment.
pub async fn story_commenters(
    conn: &mut sqlx::PgConnection,
    story: StoryId,
    limit: i64,
) -> anyhow::Result<Vec<Author>> {
    let rows = sqlx::query(
        "
            SELECT u.id, u.username, u.avatar_url
                FROM users u
            INNER JOIN (
                SELECT author_id, MIN(created_at) AS first_comment
                    FROM comments
                WHERE story_id = $1
                GROUP BY author_id
                ORDER BY first_comment
                LIMIT $2
            ) commenters
                ON commenters.author_id = u.id
            ORDER BY commenters.first_comment
        ",
    )
    .bind(story.0)
    .bind(limit)
    .fetch_all(conn)
    .await
    .context("querying story commenters")?;
    rows.iter().map(author_from_row).collect()
}

pub async fn insert_notification(
    conn: &mut sqlx::PgConnection,
    n: &Notification,
) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO notifications VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
        .bind(n.id.0)
        .bind(n.user_id.0)
        .bind(n.kind.as_str())
        .bind(&n.message)
        .bind(n.story_id.map(|s| s.0))
        .bind(n.comment_id.map(|c| c.0))
        .bind(n.contact_id.map(|c| c.0))
        .bind(n.triggered_by.map(|u| u.0))
        .bind(n.read)
        .bind(n.created_at)
        .execute(conn)
        .await
        .with_context(|| format!("inserting notification {:?}", n.id))?;
    Ok(())
}

fn notification_from_row(r: &sqlx::postgres::PgRow) -> anyhow::Result<Notification> {
    let kind: String = r.try_get("kind").context("retrieving the kind field")?;
    Ok(Notification {
        id: NotificationId(r.try_get("id").context("retrieving the id field")?),
        user_id: UserId(
            r.try_get("user_id")
                .context("retrieving the user_id field")?,
        ),
        kind: kind.parse()?,
        message: r
            .try_get("message")
            .context("retrieving the message field")?,
        story_id: r
            .try_get::<Option<Uuid>, _>("story_id")
            .context("retrieving the story_id field")?
            .map(StoryId),
        comment_id: r
            .try_get::<Option<Uuid>, _>("comment_id")
            .context("retrieving the comment_id field")?
            .map(CommentId),
        contact_id: r
            .try_get::<Option<Uuid>, _>("contact_id")
            .context("retrieving the contact_id field")?
            .map(ContactId),
        triggered_by: r
            .try_get::<Option<Uuid>, _>("triggered_by")
            .context("retrieving the triggered_by field")?
            .map(UserId),
        read: r.try_get("read").context("retrieving the read field")?,
        created_at: r
            .try_get::<Time, _>("created_at")
            .context("retrieving the created_at field")?,
    })
}

pub async fn list_notifications(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    read: Option<bool>,
    limit: i64,
) -> anyhow::Result<Vec<Notification>> {
    let rows = match read {
        None => {
            sqlx::query(
                "SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
            )
            .bind(user.0)
            .bind(limit)
            .fetch_all(conn)
            .await
        }
        Some(read) => {
            sqlx::query(
                "SELECT * FROM notifications
                WHERE user_id = $1 AND read = $2
                ORDER BY created_at DESC LIMIT $3",
            )
            .bind(user.0)
            .bind(read)
            .bind(limit)
            .fetch_all(conn)
            .await
        }
    }
    .context("querying notifications table")?;
    rows.iter().map(notification_from_row).collect()
}

pub async fn unread_count(conn: &mut sqlx::PgConnection, user: UserId) -> anyhow::Result<i64> {
    sqlx::query("SELECT COUNT(*) AS count FROM notifications WHERE user_id = $1 AND read = false")
        .bind(user.0)
        .fetch_one(conn)
        .await
        .context("counting unread notifications")?
        .try_get("count")
        .context("retrieving the count field")
}

pub async fn mark_read(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    notification: NotificationId,
) -> anyhow::Result<bool> {
    let res = sqlx::query("UPDATE notifications SET read = true WHERE id = $1 AND user_id = $2")
        .bind(notification.0)
        .bind(user.0)
        .execute(conn)
        .await
        .with_context(|| format!("marking notification {notification:?} read"))?;
    Ok(res.rows_affected() == 1)
}

pub async fn mark_all_read(conn: &mut sqlx::PgConnection, user: UserId) -> anyhow::Result<u64> {
    let res =
        sqlx::query("UPDATE notifications SET read = true WHERE user_id = $1 AND read = false")
            .bind(user.0)
            .execute(conn)
            .await
            .context("marking all notifications read")?;
    Ok(res.rows_affected())
}

pub async fn delete_notification(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    notification: NotificationId,
) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
        .bind(notification.0)
        .bind(user.0)
        .execute(conn)
        .await
        .with_context(|| format!("deleting notification {notification:?}"))?;
    Ok(res.rows_affected() == 1)
}

pub async fn delete_read(conn: &mut sqlx::PgConnection, user: UserId) -> anyhow::Result<u64> {
    let res = sqlx::query("DELETE FROM notifications WHERE user_id = $1 AND read = true")
        .bind(user.0)
        .execute(conn)
        .await
        .context("deleting read notifications")?;
    Ok(res.rows_affected())
}
