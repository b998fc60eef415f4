use uuid::Uuid;

use crate::{UserId, STUB_UUID};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StoryId(pub Uuid);

impl StoryId {
    pub fn stub() -> StoryId {
        StoryId(STUB_UUID)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ChapterId(pub Uuid);

impl ChapterId {
    pub fn stub() -> ChapterId {
        ChapterId(STUB_UUID)
    }
}

/// Read-only view of a story from the catalog, enough to resolve
/// notification recipients and compose messages.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StoryRef {
    pub id: StoryId,
    pub author_id: UserId,
    pub title: String,
}
