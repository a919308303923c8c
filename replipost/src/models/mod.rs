use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Publish,
    Pending,
    Private,
}

impl PostStatus {
    pub const ALL: [PostStatus; 4] = [PostStatus::Draft, PostStatus::Publish, PostStatus::Pending, PostStatus::Private];

    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Publish => "publish",
            PostStatus::Pending => "pending",
            PostStatus::Private => "private",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PostStatus::Draft => "Draft",
            PostStatus::Publish => "Published",
            PostStatus::Pending => "Pending",
            PostStatus::Private => "Private",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PostStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown post status '{}'", s))
    }
}

/// Comment and ping policy of a record.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    Open,
    Closed,
}

impl Default for CommentStatus {
    fn default() -> Self {
        CommentStatus::Open
    }
}

/// Everything about a record except its id, body and timestamps.
/// This is the JSON document stored in the `records` table.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PostRecord {
    pub post_type: String,
    pub author_id: i64,
    pub title: String,
    pub excerpt: String,
    pub slug: String,
    pub parent_id: Option<String>,
    pub password: Option<String>,
    pub status: PostStatus,
    pub comment_status: CommentStatus,
    pub ping_status: CommentStatus,
    #[serde(default)]
    pub to_ping: String,
    #[serde(default)]
    pub menu_order: i32,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub content: String,
    #[serde(flatten)]
    pub record: PostRecord,
}

/// A record that does not exist yet. The store assigns the id and timestamps.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NewPost {
    pub post_type: String,
    #[serde(default)]
    pub author_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub status: PostStatus,
    #[serde(default)]
    pub comment_status: CommentStatus,
    #[serde(default)]
    pub ping_status: CommentStatus,
    #[serde(default)]
    pub to_ping: String,
    #[serde(default)]
    pub menu_order: i32,
}

/// Fields an editor may change from the edit view.
#[derive(Debug, Clone)]
pub struct PostUpdate {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub status: PostStatus,
}

/// One entry of a record's attribute multimap.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PostMeta {
    pub key: String,
    pub value: String,
}

impl PostMeta {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        PostMeta { key: key.into(), value: value.into() }
    }
}

#[derive(Serialize, Clone)]
pub struct PostSummary {
    pub id: String,
    pub title: String,
    pub post_type: String,
    pub status: PostStatus,
    pub author_id: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&Post> for PostSummary {
    fn from(post: &Post) -> Self {
        PostSummary {
            id: post.id.clone(),
            title: post.record.title.clone(),
            post_type: post.record.post_type.clone(),
            status: post.record.status,
            author_id: post.record.author_id,
            created_at: post.record.created_at,
        }
    }
}

/// Settings of the duplicate feature, persisted in the `settings` table.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DuplicationSettings {
    pub post_types: Vec<String>,
    pub title_suffix: String,
    pub default_status: PostStatus,
}

impl DuplicationSettings {
    pub const DEFAULT_POST_TYPES: [&'static str; 2] = ["post", "page"];
    pub const DEFAULT_TITLE_SUFFIX: &'static str = "(Copy)";
    pub const DEFAULT_STATUS: PostStatus = PostStatus::Draft;
    pub const MAX_SUFFIX_CHARS: usize = 50;

    pub fn is_eligible(&self, post_type: &str) -> bool {
        self.post_types.iter().any(|t| t == post_type)
    }

    pub fn default_post_types() -> Vec<String> {
        Self::DEFAULT_POST_TYPES.iter().map(|s| s.to_string()).collect()
    }
}

impl Default for DuplicationSettings {
    fn default() -> Self {
        DuplicationSettings {
            post_types: Self::default_post_types(),
            title_suffix: Self::DEFAULT_TITLE_SUFFIX.to_string(),
            default_status: Self::DEFAULT_STATUS,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub is_active: bool,
    pub can_edit_posts: bool,
    pub last_login_time: Option<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    /// The capability required to duplicate content.
    pub fn has_edit_capability(&self) -> bool {
        self.is_active && (self.is_admin() || self.can_edit_posts)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub message: String,
    pub r#type: String, // 'success' or 'error'
}

pub mod content_types;
pub mod db_operations;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_its_key() {
        for status in PostStatus::ALL {
            assert_eq!(status.as_str().parse::<PostStatus>(), Ok(status));
        }
        assert!("archived".parse::<PostStatus>().is_err());
        assert!("Draft".parse::<PostStatus>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&PostStatus::Publish).unwrap(), "\"publish\"");
    }

    #[test]
    fn edit_capability() {
        let mut user = User {
            id: 1,
            username: "sam".into(),
            role: "author".into(),
            is_active: true,
            can_edit_posts: false,
            last_login_time: None,
        };
        assert!(!user.has_edit_capability());
        user.can_edit_posts = true;
        assert!(user.has_edit_capability());
        user.is_active = false;
        assert!(!user.has_edit_capability());
        user.is_active = true;
        user.can_edit_posts = false;
        user.role = "admin".into();
        assert!(user.has_edit_capability());
    }
}
