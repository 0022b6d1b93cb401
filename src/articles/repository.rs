// Repository pattern - isolates all database side effects
use crate::articles::domain::*;
use crate::db::models::Author;
use crate::state::DbPool;
use async_trait::async_trait;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error(transparent)]
    Invalid(#[from] ArticleError),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),
}

impl RepositoryError {
    fn article_not_found() -> Self {
        RepositoryError::NotFound("Article not found".to_string())
    }
}

/// Repository trait - all article reads and writes
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Every article matching the filter, newest first
    async fn list(&self, filter: &ArticleFilter) -> Result<Vec<Article>, RepositoryError>;

    async fn get(&self, id: &ArticleId) -> Result<Article, RepositoryError>;

    async fn get_by_slug(&self, slug: &str) -> Result<Article, RepositoryError>;

    /// Insert the article and its tags atomically, then read it back
    async fn create(&self, article: NewArticle) -> Result<Article, RepositoryError>;

    /// Apply only the columns present in the update; a present tag list
    /// replaces the existing one
    async fn update(
        &self,
        id: &ArticleId,
        update: ArticleUpdate,
    ) -> Result<Article, RepositoryError>;

    async fn delete(&self, id: &ArticleId) -> Result<(), RepositoryError>;
}

/// SQLite implementation
pub struct SqliteArticleRepository {
    pool: DbPool,
}

impl SqliteArticleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SELECT_ARTICLE: &str = "
    SELECT a.id, a.title, a.summary, a.content, a.category, a.published_at,
           a.image_url, a.read_time_minutes, a.is_top_story, a.ai_summary,
           a.meta_title, a.meta_description, a.meta_keywords, a.slug,
           a.thumbnail_url, a.og_image,
           au.id, au.name, au.avatar_url, au.role
    FROM articles a
    JOIN authors au ON au.id = a.author_id";

/// SQLite's default cap on bound parameters is 999 on older builds.
const TAG_LOOKUP_CHUNK: usize = 500;

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

/// Map one row of `SELECT_ARTICLE`. Tags are filled in separately.
fn article_from_row(row: &Row<'_>) -> rusqlite::Result<Article> {
    let category: String = row.get(4)?;
    let category = category
        .parse::<Category>()
        .map_err(|e| conversion_error(4, e))?;
    let published_at: String = row.get(5)?;
    let published_at = parse_timestamp(&published_at).map_err(|e| conversion_error(5, e))?;

    Ok(Article {
        id: row.get(0)?,
        title: row.get(1)?,
        summary: row.get(2)?,
        content: row.get(3)?,
        category,
        published_at,
        image_url: row.get(6)?,
        read_time_minutes: row.get(7)?,
        is_top_story: row.get(8)?,
        ai_summary: row.get(9)?,
        seo: SeoFields {
            meta_title: row.get(10)?,
            meta_description: row.get(11)?,
            meta_keywords: row.get(12)?,
            slug: row.get(13)?,
            thumbnail_url: row.get(14)?,
            og_image: row.get(15)?,
        },
        author: Author {
            id: row.get(16)?,
            name: row.get(17)?,
            avatar_url: row.get(18)?,
            role: row.get(19)?,
        },
        tags: Vec::new(),
    })
}

fn tags_for(conn: &Connection, article_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT t.name FROM article_tags at
         JOIN tags t ON t.id = at.tag_id
         WHERE at.article_id = ?1
         ORDER BY t.name",
    )?;
    let tags = stmt
        .query_map(params![article_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(tags)
}

/// Fill in the tag list of every article with one query per chunk.
fn attach_tags(conn: &Connection, articles: &mut [Article]) -> rusqlite::Result<()> {
    let mut by_article: HashMap<String, Vec<String>> = HashMap::new();

    for chunk in articles.chunks(TAG_LOOKUP_CHUNK) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "SELECT at.article_id, t.name FROM article_tags at
             JOIN tags t ON t.id = at.tag_id
             WHERE at.article_id IN ({placeholders})
             ORDER BY t.name"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk.iter().map(|a| &a.id)), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (article_id, name) = row?;
            by_article.entry(article_id).or_default().push(name);
        }
    }

    for article in articles.iter_mut() {
        article.tags = by_article.remove(&article.id).unwrap_or_default();
    }
    Ok(())
}

fn fetch_one(
    conn: &Connection,
    column: &str,
    value: &str,
) -> Result<Option<Article>, RepositoryError> {
    let sql = format!("{SELECT_ARTICLE} WHERE a.{column} = ?1");
    let article = conn
        .query_row(&sql, params![value], article_from_row)
        .optional()?;

    match article {
        Some(mut article) => {
            article.tags = tags_for(conn, &article.id)?;
            Ok(Some(article))
        }
        None => Ok(None),
    }
}

fn article_exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM articles WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )
}

fn ensure_author(conn: &Connection, author_id: &str) -> Result<(), RepositoryError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM authors WHERE id = ?1)",
        params![author_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(RepositoryError::Validation(format!(
            "Unknown author: {author_id}"
        )))
    }
}

/// Fails with Conflict when another article already owns the slug.
fn ensure_slug_free(conn: &Connection, slug: &str, owner: &str) -> Result<(), RepositoryError> {
    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM articles WHERE slug = ?1 AND id != ?2)",
        params![slug, owner],
        |row| row.get(0),
    )?;
    if taken {
        Err(RepositoryError::Conflict(format!(
            "Slug already in use: {slug}"
        )))
    } else {
        Ok(())
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Upsert each tag by name and link it to the article. Both inserts are
/// conflict-tolerant, so repeated names and concurrent writers never create
/// duplicate rows.
fn link_tags(conn: &Connection, article_id: &str, tags: &[String]) -> rusqlite::Result<()> {
    let mut insert_tag =
        conn.prepare_cached("INSERT INTO tags (name) VALUES (?1) ON CONFLICT(name) DO NOTHING")?;
    let mut find_tag = conn.prepare_cached("SELECT id FROM tags WHERE name = ?1")?;
    let mut link = conn.prepare_cached(
        "INSERT OR IGNORE INTO article_tags (article_id, tag_id) VALUES (?1, ?2)",
    )?;

    for name in tags {
        insert_tag.execute(params![name])?;
        let tag_id: i64 = find_tag.query_row(params![name], |row| row.get(0))?;
        link.execute(params![article_id, tag_id])?;
    }
    Ok(())
}

/// Column assignments for a partial UPDATE, with their bound values.
#[derive(Default)]
struct Assignments {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Assignments {
    fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.clauses.push(format!("{column} = ?"));
        self.values.push(value.into());
    }

    fn set_if<T: Into<Value>>(&mut self, column: &str, value: Option<T>) {
        if let Some(value) = value {
            self.set(column, value);
        }
    }

    fn set_expr(&mut self, column: &str, expr: &str) {
        self.clauses.push(format!("{column} = {expr}"));
    }

    fn from_update(update: &ArticleUpdate) -> Self {
        let mut a = Self::default();
        a.set_if("title", update.title.clone());
        a.set_if("summary", update.summary.clone());
        a.set_if("content", update.content.clone());
        a.set_if("category", update.category.map(|c| c.as_str().to_string()));
        a.set_if("author_id", update.author_id.clone());
        a.set_if(
            "published_at",
            update.published_at.as_ref().map(format_timestamp),
        );
        a.set_if("image_url", update.image_url.clone());
        match update.read_time_minutes {
            Some(ReadTimeChange::Set(minutes)) => a.set("read_time_minutes", minutes),
            Some(ReadTimeChange::Recompute) => match &update.content {
                Some(content) => a.set("read_time_minutes", estimate_read_time(content)),
                None => a.set_expr(
                    "read_time_minutes",
                    &format!(
                        "(length(content) + {}) / {CHARS_PER_MINUTE}",
                        CHARS_PER_MINUTE - 1
                    ),
                ),
            },
            None => {}
        }
        a.set_if("is_top_story", update.is_top_story);
        a.set_if("ai_summary", update.ai_summary.clone());
        a.set_if("meta_title", update.meta_title.clone());
        a.set_if("meta_description", update.meta_description.clone());
        a.set_if("meta_keywords", update.meta_keywords.clone());
        a.set_if("slug", update.slug.clone());
        a.set_if("thumbnail_url", update.thumbnail_url.clone());
        a.set_if("og_image", update.og_image.clone());
        a
    }
}

#[async_trait]
impl ArticleRepository for SqliteArticleRepository {
    async fn list(&self, filter: &ArticleFilter) -> Result<Vec<Article>, RepositoryError> {
        let mut conn = self.pool.get()?;
        // Rows and tags come from one snapshot, so a concurrent write is
        // seen whole or not at all.
        let tx = conn.transaction()?;

        let mut sql = SELECT_ARTICLE.to_string();
        let mut values: Vec<&str> = Vec::new();
        if let Some(category) = filter.category {
            sql.push_str(" WHERE a.category = ?1");
            values.push(category.as_str());
        }
        sql.push_str(" ORDER BY a.published_at DESC, a.id");

        let mut articles = {
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values), article_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        // Search runs here rather than in SQL so case folding covers
        // non-ASCII text and `%`/`_` in the term are taken literally.
        articles.retain(|a| filter.matches_search(&a.title, &a.summary));

        attach_tags(&tx, &mut articles)?;
        tx.commit()?;
        Ok(articles)
    }

    async fn get(&self, id: &ArticleId) -> Result<Article, RepositoryError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let article = fetch_one(&tx, "id", id.as_str())?;
        tx.commit()?;
        article.ok_or_else(RepositoryError::article_not_found)
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Article, RepositoryError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let article = fetch_one(&tx, "slug", slug)?;
        tx.commit()?;
        article.ok_or_else(RepositoryError::article_not_found)
    }

    async fn create(&self, article: NewArticle) -> Result<Article, RepositoryError> {
        let mut conn = self.pool.get()?;

        // IMMEDIATE takes the write lock up front, so the existence checks
        // below cannot race another writer. Dropping `tx` rolls back.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = article.id.as_str();

        if article_exists(&tx, id)? {
            return Err(RepositoryError::Conflict(format!(
                "Article already exists: {id}"
            )));
        }
        ensure_author(&tx, &article.author_id)?;
        if let Some(slug) = &article.seo.slug {
            ensure_slug_free(&tx, slug, id)?;
        }

        tx.execute(
            "INSERT INTO articles (
                id, title, summary, content, category, author_id,
                published_at, image_url, read_time_minutes, is_top_story, ai_summary,
                meta_title, meta_description, meta_keywords, slug, thumbnail_url, og_image
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                id,
                article.title,
                article.summary,
                article.content,
                article.category.as_str(),
                article.author_id,
                format_timestamp(&article.published_at),
                article.image_url,
                article.read_time_minutes,
                article.is_top_story,
                article.ai_summary,
                article.seo.meta_title,
                article.seo.meta_description,
                article.seo.meta_keywords,
                article.seo.slug,
                article.seo.thumbnail_url,
                article.seo.og_image,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepositoryError::Conflict(format!("Article already exists: {id}"))
            } else {
                e.into()
            }
        })?;

        link_tags(&tx, id, &article.tags)?;

        let created = fetch_one(&tx, "id", id)?.ok_or_else(RepositoryError::article_not_found)?;
        tx.commit()?;

        tracing::info!(article_id = %id, tags = created.tags.len(), "Article created");
        Ok(created)
    }

    async fn update(
        &self,
        id: &ArticleId,
        update: ArticleUpdate,
    ) -> Result<Article, RepositoryError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = id.as_str();

        if !article_exists(&tx, id)? {
            return Err(RepositoryError::article_not_found());
        }
        if let Some(author_id) = &update.author_id {
            ensure_author(&tx, author_id)?;
        }
        if let Some(Some(slug)) = &update.slug {
            ensure_slug_free(&tx, slug, id)?;
        }

        if update.has_column_changes() {
            let mut assignments = Assignments::from_update(&update);
            assignments.set_expr("updated_at", "datetime('now')");
            assignments.values.push(Value::from(id.to_string()));

            let sql = format!(
                "UPDATE articles SET {} WHERE id = ?",
                assignments.clauses.join(", ")
            );
            tx.execute(&sql, params_from_iter(assignments.values.iter()))?;
        }

        if let Some(tags) = &update.tags {
            tx.execute(
                "DELETE FROM article_tags WHERE article_id = ?1",
                params![id],
            )?;
            link_tags(&tx, id, tags)?;
        }

        let updated = fetch_one(&tx, "id", id)?.ok_or_else(RepositoryError::article_not_found)?;
        tx.commit()?;

        tracing::info!(article_id = %id, "Article updated");
        Ok(updated)
    }

    async fn delete(&self, id: &ArticleId) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;

        // article_tags rows go with it through ON DELETE CASCADE
        let rows = conn.execute("DELETE FROM articles WHERE id = ?1", params![id.as_str()])?;
        if rows == 0 {
            return Err(RepositoryError::article_not_found());
        }

        tracing::info!(article_id = %id, "Article deleted");
        Ok(())
    }
}

/// Type alias for Arc-wrapped repository (for AppState)
pub type DynArticleRepository = Arc<dyn ArticleRepository>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn create_test_repo() -> (SqliteArticleRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = db::create_pool(&db_path).unwrap();
        db::run_migrations(&pool).unwrap();

        (SqliteArticleRepository::new(pool), temp_dir)
    }

    fn draft(title: &str, category: &str) -> ArticleDraft {
        ArticleDraft {
            title: Some(title.into()),
            summary: Some(format!("{title} summary")),
            content: Some("<p>body</p>".into()),
            category: Some(category.into()),
            author_id: Some("2".into()),
            ..Default::default()
        }
    }

    fn new_article(draft: ArticleDraft) -> NewArticle {
        draft.validate(Utc::now()).unwrap()
    }

    fn patch(json: &str) -> ArticleUpdate {
        serde_json::from_str::<ArticlePatch>(json)
            .unwrap()
            .validate()
            .unwrap()
    }

    fn tag_rows(repo: &SqliteArticleRepository) -> Vec<String> {
        let conn = repo.pool.get().unwrap();
        let mut stmt = conn.prepare("SELECT name FROM tags ORDER BY name").unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<String>, _>>()
            .unwrap()
    }

    fn link_count(repo: &SqliteArticleRepository) -> i64 {
        let conn = repo.pool.get().unwrap();
        conn.query_row("SELECT COUNT(*) FROM article_tags", [], |row| row.get(0))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_then_get_round_trips() {
        let (repo, _temp) = create_test_repo();

        let mut d = draft("Reasoning models", "Deep Dive");
        d.tags = Some(vec!["llm".into(), "reasoning".into()]);
        d.image_url = Some("/uploads/img_1.png".into());
        d.ai_summary = Some("short".into());
        d.slug = Some("reasoning-models".into());

        let created = repo.create(new_article(d)).await.unwrap();
        let fetched = repo.get(&ArticleId::new(created.id.clone())).await.unwrap();

        assert_eq!(created, fetched);
        assert_eq!(fetched.author.name, "David Miller");
        assert_eq!(fetched.category, Category::DeepDive);
        assert_eq!(fetched.tags, vec!["llm", "reasoning"]);
        assert_eq!(fetched.seo.slug.as_deref(), Some("reasoning-models"));

        let by_slug = repo.get_by_slug("reasoning-models").await.unwrap();
        assert_eq!(by_slug, fetched);
    }

    #[tokio::test]
    async fn test_create_normalizes_tags() {
        let (repo, _temp) = create_test_repo();

        let mut d = draft("A", "News");
        d.tags = Some(vec!["ai".into(), " AI ".into(), "ml".into(), "  ".into()]);
        let created = repo.create(new_article(d)).await.unwrap();

        assert_eq!(created.tags, vec!["ai", "ml"]);
        assert_eq!(tag_rows(&repo), vec!["ai", "ml"]);
        assert_eq!(link_count(&repo), 2);
    }

    #[tokio::test]
    async fn test_tag_upsert_reuses_rows_across_articles() {
        let (repo, _temp) = create_test_repo();

        let mut first = draft("First", "News");
        first.tags = Some(vec!["rust".into(), "db".into()]);
        let mut second = draft("Second", "News");
        second.tags = Some(vec!["rust".into(), "web".into()]);

        let first = repo.create(new_article(first)).await.unwrap();
        repo.create(new_article(second)).await.unwrap();

        assert_eq!(tag_rows(&repo), vec!["db", "rust", "web"]);

        // Re-applying an overlapping set adds no duplicate links
        repo.update(
            &ArticleId::new(first.id.clone()),
            patch(r#"{"tags": ["rust", "rust", "db"]}"#),
        )
        .await
        .unwrap();
        assert_eq!(tag_rows(&repo), vec!["db", "rust", "web"]);
        assert_eq!(link_count(&repo), 4);
    }

    #[tokio::test]
    async fn test_create_duplicate_id_conflicts_without_mutation() {
        let (repo, _temp) = create_test_repo();

        let mut d = draft("Original", "News");
        d.id = Some("fixed-id".into());
        repo.create(new_article(d)).await.unwrap();

        let mut dup = draft("Impostor", "Opinion");
        dup.id = Some("fixed-id".into());
        dup.tags = Some(vec!["sneaky".into()]);
        let result = repo.create(new_article(dup)).await;
        assert!(matches!(result, Err(RepositoryError::Conflict(_))));

        let kept = repo.get(&ArticleId::new("fixed-id")).await.unwrap();
        assert_eq!(kept.title, "Original");
        assert!(tag_rows(&repo).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_with_same_id_yield_one_row() {
        let (repo, _temp) = create_test_repo();
        let repo = Arc::new(repo);
        let start = Arc::new(tokio::sync::Barrier::new(8));

        let mut handles = Vec::new();
        for i in 0..8 {
            let repo = repo.clone();
            let start = start.clone();
            handles.push(tokio::spawn(async move {
                let mut d = draft(&format!("Racer {i}"), "News");
                d.id = Some("race".into());
                d.tags = Some(vec![format!("racer-{i}")]);
                start.wait().await;
                repo.create(new_article(d)).await
            }));
        }

        let mut ok = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(RepositoryError::Conflict(_)) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((ok, conflicts), (1, 7));

        let conn = repo.pool.get().unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM articles WHERE id = 'race'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(rows, 1);
        // Losers left no tags behind
        assert_eq!(tag_rows(&repo).len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reads_never_mix_two_writes() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let (repo, _temp) = create_test_repo();
        let repo = Arc::new(repo);

        let mut d = draft("AB", "News");
        d.id = Some("flip".into());
        d.tags = Some(vec!["a".into(), "b".into()]);
        repo.create(new_article(d)).await.unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let writer = {
            let repo = repo.clone();
            let done = done.clone();
            tokio::spawn(async move {
                let id = ArticleId::new("flip");
                for i in 0..500 {
                    let body = if i % 2 == 0 {
                        r#"{"title": "CD", "tags": ["c", "d"]}"#
                    } else {
                        r#"{"title": "AB", "tags": ["a", "b"]}"#
                    };
                    repo.update(&id, patch(body)).await.unwrap();
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let reader = {
            let repo = repo.clone();
            let done = done.clone();
            tokio::spawn(async move {
                let id = ArticleId::new("flip");
                let mut mixed = Vec::new();
                while !done.load(Ordering::SeqCst) {
                    let article = repo.get(&id).await.unwrap();
                    let expected = match article.title.as_str() {
                        "AB" => vec!["a", "b"],
                        _ => vec!["c", "d"],
                    };
                    if article.tags != expected {
                        mixed.push((article.title.clone(), article.tags.clone()));
                    }
                    let listed = repo.list(&ArticleFilter::default()).await.unwrap();
                    let row = &listed[0];
                    let expected = if row.title == "AB" { ["a", "b"] } else { ["c", "d"] };
                    if row.tags != expected {
                        mixed.push((row.title.clone(), row.tags.clone()));
                    }
                }
                mixed
            })
        };

        writer.await.unwrap();
        let mixed = reader.await.unwrap();
        assert!(mixed.is_empty(), "reads saw half-applied writes: {mixed:?}");
    }

    #[tokio::test]
    async fn test_create_unknown_author_is_validation_error() {
        let (repo, _temp) = create_test_repo();

        let mut d = draft("Ghost", "News");
        d.author_id = Some("999".into());
        d.tags = Some(vec!["orphan".into()]);
        let result = repo.create(new_article(d)).await;

        assert!(matches!(result, Err(RepositoryError::Validation(ref m)) if m == "Unknown author: 999"));
        assert!(tag_rows(&repo).is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_slug_conflicts() {
        let (repo, _temp) = create_test_repo();

        let mut a = draft("A", "News");
        a.slug = Some("same".into());
        repo.create(new_article(a)).await.unwrap();

        let mut b = draft("B", "News");
        b.slug = Some("same".into());
        let result = repo.create(new_article(b)).await;
        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_list_orders_newest_first_and_filters() {
        let (repo, _temp) = create_test_repo();

        let mut old = draft("Old news about Rust", "News");
        old.published_at = Some("2023-01-01T00:00:00Z".into());
        let mut mid = draft("Tutorial: async", "Tutorial");
        mid.published_at = Some("2023-06-01T00:00:00Z".into());
        mid.summary = Some("Learn RUST futures".into());
        let mut new = draft("Fresh news", "News");
        new.published_at = Some("2024-01-01T00:00:00Z".into());

        for d in [old, mid, new] {
            repo.create(new_article(d)).await.unwrap();
        }

        let all = repo.list(&ArticleFilter::default()).await.unwrap();
        let titles: Vec<_> = all.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Fresh news", "Tutorial: async", "Old news about Rust"]);

        let news = repo
            .list(&ArticleFilter {
                category: Some(Category::News),
                search: None,
            })
            .await
            .unwrap();
        assert!(news.iter().all(|a| a.category == Category::News));
        assert_eq!(news.len(), 2);

        let rust = repo
            .list(&ArticleFilter {
                category: None,
                search: Some("rust".into()),
            })
            .await
            .unwrap();
        let titles: Vec<_> = rust.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Tutorial: async", "Old news about Rust"]);

        let both = repo
            .list(&ArticleFilter {
                category: Some(Category::News),
                search: Some("rust".into()),
            })
            .await
            .unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].title, "Old news about Rust");

        let none = repo
            .list(&ArticleFilter {
                category: Some(Category::Research),
                search: None,
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_list_search_treats_wildcards_literally() {
        let (repo, _temp) = create_test_repo();
        repo.create(new_article(draft("100% coverage", "Opinion")))
            .await
            .unwrap();
        repo.create(new_article(draft("Plain title", "Opinion")))
            .await
            .unwrap();

        let hits = repo
            .list(&ArticleFilter {
                category: None,
                search: Some("%".into()),
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "100% coverage");
    }

    #[tokio::test]
    async fn test_list_attaches_tags_per_article() {
        let (repo, _temp) = create_test_repo();

        let mut a = draft("A", "News");
        a.tags = Some(vec!["x".into()]);
        a.published_at = Some("2024-01-02T00:00:00Z".into());
        let mut b = draft("B", "News");
        b.tags = Some(vec!["y".into(), "x".into()]);
        b.published_at = Some("2024-01-01T00:00:00Z".into());
        repo.create(new_article(a)).await.unwrap();
        repo.create(new_article(b)).await.unwrap();

        let all = repo.list(&ArticleFilter::default()).await.unwrap();
        assert_eq!(all[0].tags, vec!["x"]);
        assert_eq!(all[1].tags, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_update_touches_only_present_fields() {
        let (repo, _temp) = create_test_repo();

        let mut d = draft("Before", "News");
        d.tags = Some(vec!["keep".into()]);
        d.image_url = Some("/uploads/a.png".into());
        d.ai_summary = Some("ai".into());
        d.read_time_minutes = Some(9);
        let created = repo.create(new_article(d)).await.unwrap();
        let id = ArticleId::new(created.id.clone());

        let updated = repo
            .update(&id, patch(r#"{"title": "After", "imageUrl": null}"#))
            .await
            .unwrap();

        assert_eq!(updated.title, "After");
        assert_eq!(updated.image_url, None);
        assert_eq!(updated.summary, created.summary);
        assert_eq!(updated.content, created.content);
        assert_eq!(updated.ai_summary.as_deref(), Some("ai"));
        assert_eq!(updated.read_time_minutes, 9);
        assert_eq!(updated.tags, vec!["keep"]);
        assert_eq!(updated.published_at, created.published_at);
    }

    #[tokio::test]
    async fn test_update_with_empty_tags_clears_them() {
        let (repo, _temp) = create_test_repo();

        let mut d = draft("Tagged", "Research");
        d.tags = Some(vec!["x".into(), "y".into()]);
        let created = repo.create(new_article(d)).await.unwrap();
        let id = ArticleId::new(created.id.clone());

        let updated = repo.update(&id, patch(r#"{"tags": []}"#)).await.unwrap();
        assert!(updated.tags.is_empty());
        assert!(repo.get(&id).await.unwrap().tags.is_empty());
        assert_eq!(updated.title, "Tagged");
    }

    #[tokio::test]
    async fn test_update_replaces_tag_set() {
        let (repo, _temp) = create_test_repo();

        let mut d = draft("Tagged", "Research");
        d.tags = Some(vec!["x".into(), "y".into()]);
        let created = repo.create(new_article(d)).await.unwrap();
        let id = ArticleId::new(created.id.clone());

        let updated = repo
            .update(&id, patch(r#"{"tags": ["y", "z"]}"#))
            .await
            .unwrap();
        assert_eq!(updated.tags, vec!["y", "z"]);
    }

    #[tokio::test]
    async fn test_update_recomputes_read_time_from_stored_content() {
        let (repo, _temp) = create_test_repo();

        let mut d = draft("Long", "Deep Dive");
        d.content = Some("x".repeat(2500));
        d.read_time_minutes = Some(1);
        let created = repo.create(new_article(d)).await.unwrap();
        let id = ArticleId::new(created.id.clone());

        let updated = repo
            .update(&id, patch(r#"{"readTimeMinutes": null}"#))
            .await
            .unwrap();
        assert_eq!(updated.read_time_minutes, 3);
    }

    #[tokio::test]
    async fn test_update_missing_article_is_not_found() {
        let (repo, _temp) = create_test_repo();

        let result = repo
            .update(&ArticleId::new("nope"), patch(r#"{"tags": ["x"]}"#))
            .await;
        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
        assert!(tag_rows(&repo).is_empty());
    }

    #[tokio::test]
    async fn test_update_rolls_back_on_failure() {
        let (repo, _temp) = create_test_repo();

        let mut a = draft("A", "News");
        a.slug = Some("taken".into());
        repo.create(new_article(a)).await.unwrap();
        let b = repo.create(new_article(draft("B", "News"))).await.unwrap();
        let id = ArticleId::new(b.id.clone());

        let result = repo
            .update(
                &id,
                patch(r#"{"title": "B2", "slug": "taken", "tags": ["new"]}"#),
            )
            .await;
        assert!(matches!(result, Err(RepositoryError::Conflict(_))));

        let unchanged = repo.get(&id).await.unwrap();
        assert_eq!(unchanged.title, "B");
        assert!(unchanged.tags.is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_explicit_published_at() {
        let (repo, _temp) = create_test_repo();
        let created = repo.create(new_article(draft("A", "News"))).await.unwrap();
        let id = ArticleId::new(created.id.clone());

        let updated = repo
            .update(&id, patch(r#"{"publishedAt": "2020-05-05 10:00:00"}"#))
            .await
            .unwrap();
        assert_eq!(
            updated.published_at,
            Utc.with_ymd_and_hms(2020, 5, 5, 10, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_delete_removes_article_and_links() {
        let (repo, _temp) = create_test_repo();

        let mut d = draft("Doomed", "Opinion");
        d.tags = Some(vec!["gone".into()]);
        let created = repo.create(new_article(d)).await.unwrap();
        let id = ArticleId::new(created.id.clone());

        repo.delete(&id).await.unwrap();
        assert!(matches!(
            repo.get(&id).await,
            Err(RepositoryError::NotFound(_))
        ));
        assert_eq!(link_count(&repo), 0);

        // Deleting again is NotFound
        assert!(matches!(
            repo.delete(&id).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_nonexistent_leaves_others_alone() {
        let (repo, _temp) = create_test_repo();
        repo.create(new_article(draft("Survivor", "News")))
            .await
            .unwrap();

        let result = repo.delete(&ArticleId::new("missing")).await;
        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
        assert_eq!(repo.list(&ArticleFilter::default()).await.unwrap().len(), 1);
    }
}
