//! Blog schema shared by the unit tests

use crate::schema::{EntityDef, Schema};
use crate::storage::Session;

/// Tables for the blog registry, laid out by the naming conventions
pub const BLOG_DDL: &str = r#"
CREATE TABLE "section" (
    "section_id" INTEGER PRIMARY KEY AUTOINCREMENT,
    "section_title" TEXT,
    "section_created" TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    "section_updated" TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE "category" (
    "category_id" INTEGER PRIMARY KEY AUTOINCREMENT,
    "category_title" TEXT,
    "section_id" INTEGER
);
CREATE TABLE "post" (
    "post_id" INTEGER PRIMARY KEY AUTOINCREMENT,
    "post_content" TEXT,
    "post_title" TEXT,
    "category_id" INTEGER,
    "post_created" TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    "post_updated" TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE "comment" (
    "comment_id" INTEGER PRIMARY KEY AUTOINCREMENT,
    "comment_text" TEXT,
    "post_id" INTEGER,
    "user_id" INTEGER
);
CREATE TABLE "tag" (
    "tag_id" INTEGER PRIMARY KEY AUTOINCREMENT,
    "tag_name" TEXT UNIQUE
);
CREATE TABLE "user" (
    "user_id" INTEGER PRIMARY KEY AUTOINCREMENT,
    "user_name" TEXT,
    "user_email" TEXT,
    "user_age" INTEGER
);
CREATE TABLE "post__tag" (
    "post_id" INTEGER NOT NULL,
    "tag_id" INTEGER NOT NULL,
    PRIMARY KEY ("post_id", "tag_id")
);
"#;

pub fn blog_schema() -> Schema {
    Schema::builder()
        .entity(
            EntityDef::new("Section")
                .column("title")
                .child("categories", "Category")
                .timestamps(),
        )
        .entity(
            EntityDef::new("Category")
                .column("title")
                .parent("section")
                .child("posts", "Post"),
        )
        .entity(
            EntityDef::new("Post")
                .columns(["content", "title"])
                .parent("category")
                .child("comments", "Comment")
                .sibling("tags", "Tag")
                .timestamps(),
        )
        .entity(
            EntityDef::new("Comment")
                .column("text")
                .parent("post")
                .parent("user"),
        )
        .entity(EntityDef::new("Tag").column("name").sibling("posts", "Post"))
        .entity(
            EntityDef::new("User")
                .columns(["name", "email", "age"])
                .child("comments", "Comment"),
        )
        .build()
        .unwrap()
}

/// In-memory session with the blog tables created
pub fn blog_session() -> Session {
    let session = Session::open_in_memory(blog_schema()).unwrap();
    session.execute_batch(BLOG_DDL).unwrap();
    session
}
