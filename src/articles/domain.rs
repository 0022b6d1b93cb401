// Domain types - pure, no database access
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::db::models::Author;

/// Characters of content read per minute for the read-time estimate.
pub const CHARS_PER_MINUTE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArticleError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field cannot be empty: {0}")]
    EmptyField(&'static str),

    #[error("Invalid category: {0}")]
    InvalidCategory(String),

    #[error("Invalid publishedAt timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("No fields to update")]
    NothingToUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArticleId(pub String);

impl ArticleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("article_{}", uuid::Uuid::now_v7().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    News,
    #[serde(rename = "Deep Dive")]
    DeepDive,
    Tutorial,
    Opinion,
    Research,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::News,
        Category::DeepDive,
        Category::Tutorial,
        Category::Opinion,
        Category::Research,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::News => "News",
            Category::DeepDive => "Deep Dive",
            Category::Tutorial => "Tutorial",
            Category::Opinion => "Opinion",
            Category::Research => "Research",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ArticleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ArticleError::InvalidCategory(s.to_string()))
    }
}

/// Optional SEO metadata carried alongside an article.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_image: Option<String>,
}

/// An article as read back from storage, joined with its author and tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub category: Category,
    pub author: Author,
    pub published_at: DateTime<Utc>,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub read_time_minutes: u32,
    pub is_top_story: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    #[serde(flatten)]
    pub seo: SeoFields,
}

/// Filter for listing articles. `None` means "don't filter on this".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleFilter {
    pub category: Option<Category>,
    pub search: Option<String>,
}

impl ArticleFilter {
    /// Case-insensitive substring match against title or summary.
    pub fn matches_search(&self, title: &str, summary: &str) -> bool {
        match self.search.as_deref() {
            None => true,
            Some(term) => {
                let needle = term.to_lowercase();
                title.to_lowercase().contains(&needle) || summary.to_lowercase().contains(&needle)
            }
        }
    }
}

/// Reference to an author as the frontend sends it inside a full article.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorRef {
    pub id: String,
}

/// Create request body, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDraft {
    pub id: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    #[serde(alias = "author_id")]
    pub author_id: Option<String>,
    pub author: Option<AuthorRef>,
    pub published_at: Option<String>,
    pub image_url: Option<String>,
    pub read_time_minutes: Option<u32>,
    pub is_top_story: Option<bool>,
    pub ai_summary: Option<String>,
    pub tags: Option<Vec<String>>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub slug: Option<String>,
    pub thumbnail_url: Option<String>,
    pub og_image: Option<String>,
}

/// A draft that passed validation with every default filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArticle {
    pub id: ArticleId,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub category: Category,
    pub author_id: String,
    pub published_at: DateTime<Utc>,
    pub image_url: Option<String>,
    pub read_time_minutes: u32,
    pub is_top_story: bool,
    pub ai_summary: Option<String>,
    pub seo: SeoFields,
    pub tags: Vec<String>,
}

impl ArticleDraft {
    pub fn validate(self, now: DateTime<Utc>) -> Result<NewArticle, ArticleError> {
        let author_id = self.author_id.or(self.author.map(|a| a.id));

        let title = required("title", self.title)?;
        let summary = required("summary", self.summary)?;
        let content = required("content", self.content)?;
        let category = required("category", self.category)?.parse::<Category>()?;
        let author_id = required("authorId", author_id)?;

        let id = non_blank(self.id)
            .map(ArticleId::new)
            .unwrap_or_else(ArticleId::generate);
        let published_at = match non_blank(self.published_at) {
            Some(raw) => parse_timestamp(&raw)?,
            None => now,
        };
        let read_time_minutes = self
            .read_time_minutes
            .unwrap_or_else(|| estimate_read_time(&content));

        Ok(NewArticle {
            id,
            title,
            summary,
            content,
            category,
            author_id,
            published_at,
            image_url: non_blank(self.image_url),
            read_time_minutes,
            is_top_story: self.is_top_story.unwrap_or(false),
            ai_summary: non_blank(self.ai_summary),
            seo: SeoFields {
                meta_title: non_blank(self.meta_title),
                meta_description: non_blank(self.meta_description),
                meta_keywords: non_blank(self.meta_keywords),
                slug: non_blank(self.slug),
                thumbnail_url: non_blank(self.thumbnail_url),
                og_image: non_blank(self.og_image),
            },
            tags: normalize_tags(self.tags.unwrap_or_default()),
        })
    }
}

/// Treat a present-but-null JSON value as `Some(None)`, and an absent one
/// as `None` (via `#[serde(default)]`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Update request body. Outer `None` = field absent, leave it alone.
/// `Some(None)` = explicit null, clear it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePatch {
    #[serde(default, deserialize_with = "present")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub summary: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub content: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub category: Option<Option<String>>,
    #[serde(default, alias = "author_id", deserialize_with = "present")]
    pub author_id: Option<Option<String>>,
    #[serde(default)]
    pub author: Option<AuthorRef>,
    #[serde(default, deserialize_with = "present")]
    pub published_at: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub image_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub read_time_minutes: Option<Option<u32>>,
    #[serde(default, deserialize_with = "present")]
    pub is_top_story: Option<Option<bool>>,
    #[serde(default, deserialize_with = "present")]
    pub ai_summary: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub tags: Option<Option<Vec<String>>>,
    #[serde(default, deserialize_with = "present")]
    pub meta_title: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub meta_description: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub meta_keywords: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub slug: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub thumbnail_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub og_image: Option<Option<String>>,
}

/// How the read-time column should change on update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadTimeChange {
    Set(u32),
    /// Recompute from whatever content the row ends up with.
    Recompute,
}

/// A validated patch. Every `Option` is "touch this column or not".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleUpdate {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub category: Option<Category>,
    pub author_id: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub image_url: Option<Option<String>>,
    pub read_time_minutes: Option<ReadTimeChange>,
    pub is_top_story: Option<bool>,
    pub ai_summary: Option<Option<String>>,
    pub meta_title: Option<Option<String>>,
    pub meta_description: Option<Option<String>>,
    pub meta_keywords: Option<Option<String>>,
    pub slug: Option<Option<String>>,
    pub thumbnail_url: Option<Option<String>>,
    pub og_image: Option<Option<String>>,
    /// Present means "replace the whole tag set", even when empty.
    pub tags: Option<Vec<String>>,
}

impl ArticlePatch {
    pub fn validate(self) -> Result<ArticleUpdate, ArticleError> {
        let author_id = match self.author_id {
            Some(value) => Some(value),
            None => self.author.map(|a| Some(a.id)),
        };

        let category = match required_if_present("category", self.category)? {
            Some(raw) => Some(raw.parse::<Category>()?),
            None => None,
        };
        let published_at = match required_if_present("publishedAt", self.published_at)? {
            Some(raw) => Some(parse_timestamp(&raw)?),
            None => None,
        };

        let update = ArticleUpdate {
            title: required_if_present("title", self.title)?,
            summary: required_if_present("summary", self.summary)?,
            content: required_if_present("content", self.content)?,
            category,
            author_id: required_if_present("authorId", author_id)?,
            published_at,
            image_url: self.image_url.map(non_blank),
            read_time_minutes: self.read_time_minutes.map(|value| match value {
                Some(minutes) => ReadTimeChange::Set(minutes),
                None => ReadTimeChange::Recompute,
            }),
            is_top_story: self.is_top_story.map(|value| value.unwrap_or(false)),
            ai_summary: self.ai_summary.map(non_blank),
            meta_title: self.meta_title.map(non_blank),
            meta_description: self.meta_description.map(non_blank),
            meta_keywords: self.meta_keywords.map(non_blank),
            slug: self.slug.map(non_blank),
            thumbnail_url: self.thumbnail_url.map(non_blank),
            og_image: self.og_image.map(non_blank),
            tags: self
                .tags
                .map(|value| normalize_tags(value.unwrap_or_default())),
        };

        if update.is_empty() {
            return Err(ArticleError::NothingToUpdate);
        }
        Ok(update)
    }
}

impl ArticleUpdate {
    /// True when neither a column nor the tag set would change.
    pub fn is_empty(&self) -> bool {
        !self.has_column_changes() && self.tags.is_none()
    }

    pub fn has_column_changes(&self) -> bool {
        self.title.is_some()
            || self.summary.is_some()
            || self.content.is_some()
            || self.category.is_some()
            || self.author_id.is_some()
            || self.published_at.is_some()
            || self.image_url.is_some()
            || self.read_time_minutes.is_some()
            || self.is_top_story.is_some()
            || self.ai_summary.is_some()
            || self.meta_title.is_some()
            || self.meta_description.is_some()
            || self.meta_keywords.is_some()
            || self.slug.is_some()
            || self.thumbnail_url.is_some()
            || self.og_image.is_some()
    }
}

fn required(field: &'static str, value: Option<String>) -> Result<String, ArticleError> {
    non_blank(value).ok_or(ArticleError::MissingField(field))
}

fn required_if_present(
    field: &'static str,
    value: Option<Option<String>>,
) -> Result<Option<String>, ArticleError> {
    match value {
        None => Ok(None),
        Some(inner) => non_blank(inner)
            .map(Some)
            .ok_or(ArticleError::EmptyField(field)),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Minutes to read, rounded up. Counts characters, not bytes.
pub fn estimate_read_time(content: &str) -> u32 {
    let chars = content.chars().count();
    chars.div_ceil(CHARS_PER_MINUTE) as u32
}

/// Trim names and drop empty ones. Duplicates are left for the tag table's
/// uniqueness constraint to fold together.
pub fn normalize_tags(names: Vec<String>) -> Vec<String> {
    names
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM` and bare dates.
/// Anything without an offset is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ArticleError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(ArticleError::InvalidTimestamp(raw.to_string()))
}

/// Storage format. Fixed width, so string order is chronological order.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}
