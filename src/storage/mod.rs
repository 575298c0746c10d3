//! SQLite-backed store for feeds and articles.
//!
//! The only shared mutable resource in the process. Every operation is a short,
//! independent statement; the `articles.guid` uniqueness constraint is what keeps
//! overlapping fetches from inserting duplicates.

mod articles;
mod feeds;
mod schema;
mod types;

pub use schema::Database;
pub use types::{
    Article, ArticleQuery, DatabaseError, Feed, FeedUpdate, NewArticle, NewFeed, Stats,
    DEFAULT_FETCH_INTERVAL,
};
