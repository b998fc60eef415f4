use uuid::Uuid;

use crate::STUB_UUID;

/// Session token issued by the auth subsystem. This crate only ever
/// recovers it (bearer header on REST calls, first text frame on the
/// live channel); issuance lives elsewhere.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub Uuid);

impl AuthToken {
    pub fn stub() -> AuthToken {
        AuthToken(STUB_UUID)
    }
}
