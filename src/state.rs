use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::articles::{DynArticleRepository, SqliteArticleRepository};
use crate::auth::SessionStore;
use crate::config::Config;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub articles: DynArticleRepository,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let articles: DynArticleRepository = Arc::new(SqliteArticleRepository::new(db.clone()));
        let sessions = SessionStore::new(db.clone(), config.auth.session_hours);
        Self {
            db,
            config,
            articles,
            sessions,
        }
    }
}
