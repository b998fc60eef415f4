use std::str::FromStr;

use anyhow::{anyhow, Context};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Comment not found {0}")]
    CommentNotFound(Uuid),

    #[error("Reply not found {0}")]
    ReplyNotFound(Uuid),

    #[error("Notification not found {0}")]
    NotificationNotFound(Uuid),

    #[error("Content must not be empty")]
    EmptyContent,

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::CommentNotFound(_) => StatusCode::NOT_FOUND,
            Error::ReplyNotFound(_) => StatusCode::NOT_FOUND,
            Error::NotificationNotFound(_) => StatusCode::NOT_FOUND,
            Error::EmptyContent => StatusCode::BAD_REQUEST,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::PermissionDenied => json!({
                "message": "permission denied",
                "type": "permission-denied",
            }),
            Error::CommentNotFound(id) => json!({
                "message": "comment not found",
                "type": "comment-not-found",
                "id": id,
            }),
            Error::ReplyNotFound(id) => json!({
                "message": "reply not found",
                "type": "reply-not-found",
                "id": id,
            }),
            Error::NotificationNotFound(id) => json!({
                "message": "notification not found",
                "type": "notification-not-found",
                "id": id,
            }),
            Error::EmptyContent => json!({
                "message": "content must not be empty",
                "type": "empty-content",
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
        })
        .expect("serializing error contents")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let id = |data: &serde_json::Value| -> anyhow::Result<Uuid> {
            data.get("id")
                .and_then(|id| id.as_str())
                .and_then(|id| Uuid::from_str(id).ok())
                .ok_or_else(|| anyhow!("error is missing a proper id"))
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(String::from(
                    data.get("message")
                        .and_then(|msg| msg.as_str())
                        .unwrap_or(""),
                )),
                "permission-denied" => Error::PermissionDenied,
                "comment-not-found" => Error::CommentNotFound(id(&data)?),
                "reply-not-found" => Error::ReplyNotFound(id(&data)?),
                "notification-not-found" => Error::NotificationNotFound(id(&data)?),
                "empty-content" => Error::EmptyContent,
                "null-byte" => Error::NullByteInString(String::from(
                    data.get("string").and_then(|s| s.as_str()).ok_or_else(|| {
                        anyhow!("error is a null-byte-in-string without a string")
                    })?,
                )),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_round_trip_through_json() {
        let errors = vec![
            Error::Unknown(String::from("boom")),
            Error::PermissionDenied,
            Error::CommentNotFound(Uuid::new_v4()),
            Error::ReplyNotFound(Uuid::new_v4()),
            Error::NotificationNotFound(Uuid::new_v4()),
            Error::EmptyContent,
            Error::NullByteInString(String::from("a\0b")),
        ];
        for e in errors {
            let parsed = Error::parse(&e.contents()).expect("parsing error body");
            assert_eq!(parsed, e);
        }
    }

    #[test]
    fn status_codes_match_taxonomy() {
        use http::StatusCode;
        assert_eq!(Error::PermissionDenied.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            Error::CommentNotFound(Uuid::nil()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(Error::EmptyContent.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::Unknown(String::new()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
