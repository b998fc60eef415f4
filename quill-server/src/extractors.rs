use std::ops::{Deref, DerefMut};

use anyhow::Context;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{self, request},
};
use quill_api::{AuthToken, Role, UserId, Uuid};

use crate::{db, Error, UserFeeds};

#[derive(Clone, axum::extract::FromRef)]
pub struct AppState {
    pub db: PgPool,
    pub feeds: UserFeeds,
}

#[derive(Clone)]
pub struct PgPool(sqlx::PgPool);

impl PgPool {
    pub fn new(pool: sqlx::PgPool) -> PgPool {
        PgPool(pool)
    }

    pub async fn acquire(&self) -> Result<PgConn, Error> {
        Ok(PgConn(
            self.0.acquire().await.context("acquiring db connection")?,
        ))
    }
}

pub struct PgConn(sqlx::pool::PoolConnection<sqlx::Postgres>);

#[async_trait]
impl FromRequestParts<AppState> for PgConn {
    type Rejection = Error;

    async fn from_request_parts(
        _req: &mut request::Parts,
        state: &AppState,
    ) -> Result<PgConn, Error> {
        state.db.acquire().await
    }
}

impl Deref for PgConn {
    type Target = sqlx::PgConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PgConn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

pub struct PreAuth(pub AuthToken);

#[async_trait]
impl<S: Sync> FromRequestParts<S> for PreAuth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, _state: &S) -> Result<PreAuth, Error> {
        match req.headers.get(http::header::AUTHORIZATION) {
            None => Err(Error::permission_denied()),
            Some(auth) => {
                let auth = auth.to_str().map_err(|_| Error::permission_denied())?;
                let mut auth = auth.split(' ');
                if !auth
                    .next()
                    .ok_or(Error::permission_denied())?
                    .eq_ignore_ascii_case("bearer")
                {
                    return Err(Error::permission_denied());
                }
                let token = auth.next().ok_or(Error::permission_denied())?;
                if !auth.next().is_none() {
                    return Err(Error::permission_denied());
                }
                let token = Uuid::try_from(token).map_err(|_| Error::permission_denied())?;
                Ok(PreAuth(AuthToken(token)))
            }
        }
    }
}

/// The session's user plus the role the delete authorization rules need.
#[derive(Clone, Copy, Debug)]
pub struct AuthedUser {
    pub id: UserId,
    pub role: Role,
}

pub struct Auth(pub AuthedUser);

#[async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &AppState) -> Result<Auth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        let mut conn = PgConn::from_request_parts(req, state).await?;
        Ok(Auth(
            db::recover_session(&mut *conn, token)
                .await
                .context("recovering session")?
                .ok_or_else(Error::permission_denied)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn parse(header: Option<&str>) -> Result<AuthToken, Error> {
        let mut builder = Request::builder().uri("/");
        if let Some(h) = header {
            builder = builder.header(http::header::AUTHORIZATION, h);
        }
        let (mut parts, ()) = builder.body(()).expect("building request").into_parts();
        PreAuth::from_request_parts(&mut parts, &())
            .await
            .map(|p| p.0)
    }

    #[tokio::test]
    async fn bearer_header_is_parsed_case_insensitively() {
        let token = Uuid::new_v4();
        for scheme in ["Bearer", "bearer", "BEARER"] {
            let parsed = parse(Some(&format!("{scheme} {token}")))
                .await
                .expect("valid header rejected");
            assert_eq!(parsed, AuthToken(token));
        }
    }

    #[tokio::test]
    async fn malformed_headers_are_rejected() {
        let token = Uuid::new_v4();
        let bad = [
            None,
            Some(format!("Bearer")),
            Some(format!("Basic {token}")),
            Some(format!("Bearer not-a-uuid")),
            Some(format!("Bearer {token} extra")),
        ];
        for h in bad {
            assert!(parse(h.as_deref()).await.is_err());
        }
    }
}
