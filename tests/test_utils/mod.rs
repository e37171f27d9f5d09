//! Test utilities for database testing.
//!
//! This module provides fixture entities and an in-memory SQLite database with
//! their tables created from the entity definitions.

#![allow(dead_code)]

use anyhow::Result;
use relay_repository::{Attributes, Repository};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema, Set,
};
use serde_json::Value as Json;
use std::sync::Arc;

pub mod user {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "users")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub name: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::post::Entity")]
        Post,
    }

    impl Related<super::post::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Post.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod post {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "posts")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub title: String,
        pub status: i32,
        #[sea_orm(default_value = 0)]
        pub views: i32,
        pub author: Option<String>,
        pub user_id: Option<i32>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::user::Entity",
            from = "Column::UserId",
            to = "super::user::Column::Id"
        )]
        User,
    }

    impl Related<super::user::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::User.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod tag {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "tags")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub slug: String,
        pub label: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Sets up an in-memory SQLite database with the fixture tables created.
///
/// # Returns
///
/// Returns a Result containing the database connection
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    // One connection: every `sqlite::memory:` connection is its own database.
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;

    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    db.execute(backend.build(&schema.create_table_from_entity(user::Entity)))
        .await?;
    db.execute(backend.build(&schema.create_table_from_entity(post::Entity)))
        .await?;
    db.execute(backend.build(&schema.create_table_from_entity(tag::Entity)))
        .await?;

    Ok(db)
}

/// Sets up the test database and returns it behind an Arc.
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    let db = setup_test_db().await?;
    Ok(Arc::new(db))
}

/// Repository over the `posts` fixture table.
pub fn post_repository(db: Arc<DatabaseConnection>) -> Repository<post::Entity> {
    Repository::new(db).named("PostRepository")
}

/// Inserts `count` posts with ids `1..=count`.
///
/// Post `i` has title `post {i}`, status `i % 2` and `i` views.
pub async fn seed_posts(db: &DatabaseConnection, count: i32) -> Result<()> {
    if count == 0 {
        return Ok(());
    }
    let rows = (1..=count).map(|i| post::ActiveModel {
        id: Set(i),
        title: Set(format!("post {i}")),
        status: Set(i % 2),
        views: Set(i),
        ..Default::default()
    });
    post::Entity::insert_many(rows).exec(db).await?;
    Ok(())
}

/// Inserts a user and returns its id.
pub async fn seed_user(db: &DatabaseConnection, name: &str) -> Result<i32> {
    let user = user::ActiveModel {
        name: Set(name.to_string()),
        ..Default::default()
    };
    let inserted = user::Entity::insert(user).exec(db).await?;
    Ok(inserted.last_insert_id)
}

/// Inserts a tag keyed by `slug`.
pub async fn seed_tag(db: &DatabaseConnection, slug: &str, label: &str) -> Result<()> {
    let tag = tag::ActiveModel {
        slug: Set(slug.to_string()),
        label: Set(label.to_string()),
    };
    tag::Entity::insert(tag).exec_without_returning(db).await?;
    Ok(())
}

/// Attribute map from a JSON object literal.
pub fn attributes(value: Json) -> Attributes {
    match value {
        Json::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Fetch a post directly, bypassing any repository.
pub async fn find_post(db: &DatabaseConnection, id: i32) -> Result<Option<post::Model>> {
    Ok(post::Entity::find_by_id(id).one(db).await?)
}
