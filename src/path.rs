//! Typed attribute paths into the remote user-data tree.
//!
//! The remote service stores per-user state under
//! `users/<uid>/<collection>/<item>`. Building those addresses from an enum
//! plus a validated identifier keeps malformed paths out of the queue and the
//! shadow cache entirely, instead of surfacing as runtime write errors.

use std::fmt::{Display, Formatter};

use crate::error::{invalid_argument, SyncResult};

/// Remote collections holding per-user companion-app state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Bookmarked sessions (`{in_schedule, timestamp}` per session id).
    MySessions,
    /// Sessions the user has submitted survey feedback for.
    Feedback,
    /// Session videos the user has watched.
    ViewedVideos,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::MySessions => "my_sessions",
            Collection::Feedback => "feedback",
            Collection::ViewedVideos => "viewed_videos",
        }
    }

    pub const ALL: [Collection; 3] = [
        Collection::MySessions,
        Collection::Feedback,
        Collection::ViewedVideos,
    ];
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated session/video identifier usable as a single path segment.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(raw: impl Into<String>) -> SyncResult<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(invalid_argument("Item id cannot be empty"));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(invalid_argument(format!(
                "Item id '{raw}' contains characters outside [A-Za-z0-9_-]"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The per-user root of the remote tree, `users/<uid>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserScope {
    user_id: String,
}

impl UserScope {
    pub fn new(user_id: impl Into<String>) -> SyncResult<Self> {
        let user_id = user_id.into();
        if user_id.is_empty() {
            return Err(invalid_argument("User id cannot be empty"));
        }
        if user_id.contains('/') {
            return Err(invalid_argument("User id cannot contain '/'"));
        }
        Ok(Self { user_id })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Remote path of one of this user's collections, e.g.
    /// `users/alice/my_sessions`.
    pub fn collection_path(&self, collection: Collection) -> String {
        format!("users/{}/{}", self.user_id, collection.as_str())
    }

    pub fn attribute(&self, collection: Collection, item: ItemId) -> AttributePath {
        AttributePath {
            scope: self.clone(),
            collection,
            item,
        }
    }
}

/// A fully scoped logical address for a single queued or cached value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributePath {
    scope: UserScope,
    collection: Collection,
    item: ItemId,
}

impl AttributePath {
    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn item(&self) -> &ItemId {
        &self.item
    }

    /// Renders the slash-delimited remote address. This string is also the
    /// queue key, so two writes to the same attribute coalesce (last write
    /// wins) while distinct attributes never collide.
    pub fn render(&self) -> String {
        format!(
            "{}/{}",
            self.scope.collection_path(self.collection),
            self.item
        )
    }
}

impl Display for AttributePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}
