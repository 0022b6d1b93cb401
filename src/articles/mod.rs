pub mod domain;
pub mod repository;

pub use domain::{
    Article, ArticleDraft, ArticleError, ArticleFilter, ArticleId, ArticlePatch, ArticleUpdate,
    Category, NewArticle,
};
pub use repository::{
    ArticleRepository, DynArticleRepository, RepositoryError, SqliteArticleRepository,
};
