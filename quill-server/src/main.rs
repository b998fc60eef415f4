use anyhow::Context;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::net::SocketAddr;
use structopt::StructOpt;

mod db;
mod error;
mod extractors;
mod feeds;
mod handlers;
mod notify;

pub use error::Error;
pub use feeds::UserFeeds;

use extractors::AppState;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

#[derive(Debug, StructOpt)]
#[structopt(name = "quill-server")]
struct Opt {
    /// Address to listen on
    #[structopt(long, default_value = "0.0.0.0:3000")]
    bind: SocketAddr,
}

pub async fn create_sqlx_pool(url: &str) -> anyhow::Result<extractors::PgPool> {
    Ok(extractors::PgPool::new(
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .with_context(|| format!("opening database {url:?}"))?,
    ))
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/comments", post(handlers::create_comment))
        .route("/comments/story/:story_id", get(handlers::list_story_comments))
        .route(
            "/comments/story/:story_id/chapter/:chapter_id",
            get(handlers::list_chapter_comments),
        )
        .route("/comments/suggestions", get(handlers::mention_suggestions))
        .route("/comments/:comment_id", delete(handlers::delete_comment))
        .route("/comments/:comment_id/like", post(handlers::toggle_comment_like))
        .route("/comments/:comment_id/replies", post(handlers::add_reply))
        .route(
            "/comments/:comment_id/replies/:reply_id",
            delete(handlers::delete_reply),
        )
        .route(
            "/comments/:comment_id/replies/:reply_id/like",
            post(handlers::toggle_reply_like),
        )
        .route("/notifications", get(handlers::list_notifications))
        .route("/notifications/unread-count", get(handlers::unread_count))
        .route("/notifications/mark-all-read", put(handlers::mark_all_read))
        .route("/notifications/delete-read", delete(handlers::delete_read))
        .route("/notifications/:notification_id/read", put(handlers::mark_read))
        .route(
            "/notifications/:notification_id",
            delete(handlers::delete_notification),
        )
        .route("/feed", get(handlers::notification_feed))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();
    tracing_subscriber::fmt::init();

    let db_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = create_sqlx_pool(&db_url).await?;
    MIGRATOR
        .run(&mut *db.acquire().await?)
        .await
        .context("applying migrations")?;

    let state = AppState {
        db,
        feeds: UserFeeds::new(),
    };

    tracing::info!("listening on {}", opt.bind);
    axum::Server::bind(&opt.bind)
        .serve(app(state).into_make_service())
        .await
        .context("serving axum webserver")
}
