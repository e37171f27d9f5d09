//! Integration tests for the generic Repository over the posts fixture table.

use anyhow::Result;
use relay_repository::config::RepositoryConfig;
use relay_repository::{Operator, Repository, RepositoryError};
use sea_orm::sea_query::{Expr, SelectStatement};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, Order, QueryFilter, QuerySelect, QueryTrait,
    RelationTrait,
};
use serde_json::json;

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{
    attributes, find_post, post, post_repository, seed_posts, seed_tag, seed_user,
    setup_test_db_arc, tag, user,
};

#[tokio::test]
async fn create_persists_only_fillable_attributes() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let mut repo = post_repository(db.clone()).with_fillable(["title", "status"]);

    let created = repo
        .create(attributes(json!({
            "title": "Hello",
            "status": 1,
            "views": 99,
            "author": "ann",
        })))
        .await?;

    assert_eq!(created.title, "Hello");
    assert_eq!(created.status, 1);
    assert_eq!(created.views, 0);
    assert_eq!(created.author, None);

    let stored = find_post(&db, created.id).await?.expect("row persisted");
    assert_eq!(stored, created);
    Ok(())
}

#[tokio::test]
async fn empty_fillable_passes_data_through() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let mut repo = post_repository(db.clone());

    let created = repo
        .create(attributes(json!({
            "title": "Open",
            "status": 0,
            "views": 7,
            "author": "bo",
        })))
        .await?;
    assert_eq!(created.views, 7);
    assert_eq!(created.author.as_deref(), Some("bo"));

    let updated = repo
        .update(attributes(json!({"views": 8, "author": null})), created.id)
        .await?;
    assert_eq!(updated.views, 8);
    assert_eq!(updated.author, None);
    Ok(())
}

#[test]
fn fillable_filter_keeps_input_order() {
    let db = std::sync::Arc::new(sea_orm::DatabaseConnection::Disconnected);
    let repo = post_repository(db).with_fillable(["status", "title"]);

    let filtered = repo.filter_fillable(attributes(json!({
        "author": "ann",
        "title": "t",
        "views": 3,
        "status": 1,
    })));

    let keys: Vec<_> = filtered.keys().cloned().collect();
    assert_eq!(keys, ["title", "status"]);
}

#[tokio::test]
async fn create_failure_is_a_store_error() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let mut repo = post_repository(db);

    // title and status are NOT NULL
    let error = repo
        .create(attributes(json!({"views": 1})))
        .await
        .unwrap_err();
    assert!(matches!(error, RepositoryError::Store(_)), "{error:?}");

    let unknown = repo
        .create(attributes(json!({"title": "t", "status": 1, "rating": 5})))
        .await
        .unwrap_err();
    assert!(matches!(unknown, RepositoryError::Store(_)), "{unknown:?}");
    Ok(())
}

#[tokio::test]
async fn null_for_required_column_is_rejected() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 1).await?;
    let mut repo = post_repository(db.clone());

    let error = repo
        .create(attributes(json!({"title": null, "status": 1})))
        .await
        .unwrap_err();
    assert!(matches!(error, RepositoryError::Store(_)), "{error:?}");
    assert_eq!(repo.count().await?, 1);

    let error = repo
        .update(attributes(json!({"status": null})), 1)
        .await
        .unwrap_err();
    assert!(matches!(error, RepositoryError::Update(_)), "{error:?}");
    assert_eq!(find_post(&db, 1).await?.expect("post 1").status, 1);

    // author is nullable
    let cleared = repo
        .update(attributes(json!({"author": null, "title": "kept"})), 1)
        .await?;
    assert_eq!((cleared.author, cleared.title.as_str()), (None, "kept"));
    Ok(())
}

#[tokio::test]
async fn update_respects_fillable() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 2).await?;
    let mut repo = post_repository(db.clone()).with_fillable(["title"]);

    let updated = repo
        .update(attributes(json!({"title": "renamed", "views": 500})), 1)
        .await?;
    assert_eq!(updated.title, "renamed");
    assert_eq!(updated.views, 1);

    // Nothing fillable left: record comes back untouched.
    let untouched = repo.update(attributes(json!({"views": 500})), 2).await?;
    assert_eq!(untouched.views, 2);
    assert_eq!(find_post(&db, 2).await?.expect("post 2").views, 2);
    Ok(())
}

#[tokio::test]
async fn update_missing_record_is_not_found_without_write() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 3).await?;
    let mut repo = post_repository(db.clone());

    let error = repo
        .update(attributes(json!({"title": "ghost"})), 999)
        .await
        .unwrap_err();
    assert_eq!(error, RepositoryError::NotFound);

    assert_eq!(repo.one_by(post::Column::Title, "ghost").await?, None);
    assert_eq!(repo.count().await?, 3);
    Ok(())
}

#[tokio::test]
async fn update_by_int_and_type_errors() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 1).await?;
    let mut repo = post_repository(db);

    let updated = repo
        .update_by_int(attributes(json!({"status": 5})), 1)
        .await?;
    assert_eq!(updated.status, 5);

    let error = repo
        .update_by_int(attributes(json!({"status": "high"})), 1)
        .await
        .unwrap_err();
    assert!(matches!(error, RepositoryError::Update(_)), "{error:?}");
    Ok(())
}

#[tokio::test]
async fn update_by_str_targets_string_keys() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_tag(&db, "rust", "Rust").await?;
    seed_tag(&db, "go", "Go").await?;
    let mut tags: Repository<tag::Entity> = Repository::new(db).named("TagRepository");

    let updated = tags
        .update_by_str(attributes(json!({"label": "Rust lang"})), "rust")
        .await?;
    assert_eq!(updated.label, "Rust lang");
    assert_eq!(
        tags.by_id_or_fail("go".to_string()).await?.label,
        "Go".to_string()
    );

    let error = tags
        .update_by_str(attributes(json!({"label": "Zig"})), "zig")
        .await
        .unwrap_err();
    assert_eq!(error, RepositoryError::NotFound);
    Ok(())
}

#[tokio::test]
async fn delete_is_scoped_by_chain_and_resets_relay() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 3).await?;
    let mut repo = post_repository(db.clone());

    // Post 1 has status 1, so the scoped delete matches nothing.
    let removed = repo.where_eq(post::Column::Status, 0).delete(1).await?;
    assert_eq!(removed, 0);
    assert!(repo.query().is_fresh());

    let removed = repo.delete(1).await?;
    assert_eq!(removed, 1);
    assert!(find_post(&db, 1).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn delete_failure_still_resets_relay() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 3).await?;
    let mut repo = post_repository(db.clone());

    repo.where_eq(post::Column::Status, 1).order_by(post::Column::Id);
    assert!(!repo.query().is_fresh());

    db.execute_unprepared("DROP TABLE posts").await?;

    let error = repo.delete(1).await.unwrap_err();
    assert!(matches!(error, RepositoryError::Delete(_)), "{error:?}");
    assert!(repo.query().is_fresh());
    assert!(repo.query().where_condition().is_none());
    assert!(!repo.query().is_ordered());
    Ok(())
}

#[tokio::test]
async fn delete_honours_limit_of_chain() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 3).await?;
    let mut repo = post_repository(db.clone());

    // Newest post only: id 3.
    let removed = repo.order_by(post::Column::Id).take(1).delete(1).await?;
    assert_eq!(removed, 0);
    assert!(find_post(&db, 1).await?.is_some());

    let removed = repo.order_by(post::Column::Id).take(1).delete(3).await?;
    assert_eq!(removed, 1);
    assert_eq!(repo.count().await?, 2);
    Ok(())
}

#[tokio::test]
async fn delete_by_ids_reports_affected_rows() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 3).await?;
    let mut repo = post_repository(db);

    assert_eq!(repo.delete_by_ids([100, 200]).await?, 0);
    assert_eq!(repo.delete_by_ids(Vec::<i32>::new()).await?, 0);
    assert_eq!(repo.delete_by_ids([1, 2, 42]).await?, 2);
    assert_eq!(repo.count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn delete_by_ids_failure_is_a_delete_error() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 3).await?;
    let mut repo = post_repository(db.clone());

    repo.where_eq(post::Column::Status, 1);
    db.execute_unprepared("DROP TABLE posts").await?;

    let error = repo.delete_by_ids([1, 2]).await.unwrap_err();
    assert!(matches!(error, RepositoryError::Delete(_)), "{error:?}");
    assert!(repo.query().is_fresh());
    Ok(())
}

#[tokio::test]
async fn or_fail_variants_mirror_plain_lookups() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 3).await?;
    let mut repo = post_repository(db);

    let found = repo.by_id(2).await?.expect("post 2");
    assert_eq!(repo.by_id_or_fail(2).await?, found);
    assert_eq!(repo.by_id_or_fail(99).await.unwrap_err(), RepositoryError::NotFound);

    let by_title = repo.one_by(post::Column::Title, "post 3").await?;
    assert_eq!(
        Some(repo.one_by_or_fail(post::Column::Title, "post 3").await?),
        by_title
    );
    assert!(
        repo.one_by_or_fail(post::Column::Title, "missing")
            .await
            .unwrap_err()
            .is_not_found()
    );

    repo.where_eq(post::Column::Status, 42);
    assert_eq!(repo.first_or_fail().await.unwrap_err(), RepositoryError::NotFound);

    // The failed lookup reset the chain.
    let first = repo.order_by_with(post::Column::Id, Order::Asc).first_or_fail().await?;
    assert_eq!(first.id, 1);
    Ok(())
}

#[tokio::test]
async fn all_ignores_chain_but_get_honours_it() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 4).await?;
    let mut repo = post_repository(db);

    repo.where_eq(post::Column::Status, 1).take(1);
    assert_eq!(repo.all().await?.len(), 4);
    assert!(repo.query().is_fresh());

    let odd = repo.where_eq(post::Column::Status, 1).get().await?;
    assert_eq!(odd.len(), 2);
    assert!(odd.iter().all(|post| post.status == 1));
    assert!(repo.query().is_fresh());
    Ok(())
}

#[tokio::test]
async fn chained_predicates_are_conjunctive() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 40).await?;
    let mut repo = post_repository(db);

    let rows = repo
        .where_eq(post::Column::Status, 1)
        .where_op(post::Column::Views, Operator::Gt, 18)
        .get()
        .await?;

    let mut ids: Vec<_> = rows.iter().map(|post| post.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (19..=39).step_by(2).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn or_where_widens_the_match() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 6).await?;
    let mut repo = post_repository(db);

    let count = repo
        .where_eq(post::Column::Status, 1)
        .or_where_eq(post::Column::Id, 2)
        .count()
        .await?;
    assert_eq!(count, 4);

    let none = repo
        .when(false, |q| q.where_eq(post::Column::Id, 1))
        .count()
        .await?;
    assert_eq!(none, 6);
    Ok(())
}

#[tokio::test]
async fn increment_by_one_touches_matching_rows_and_resets() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 3).await?;
    let mut repo = post_repository(db.clone());

    let changed = repo
        .where_eq(post::Column::Status, 1)
        .increment_by_one(post::Column::Views)
        .await?;
    assert_eq!(changed, 2);
    assert!(repo.query().is_fresh());

    let views = repo
        .order_by_with(post::Column::Id, Order::Asc)
        .pluck::<i32, _>(post::Column::Views)
        .await?;
    assert_eq!(views, vec![2, 2, 4]);
    Ok(())
}

#[tokio::test]
async fn increment_with_extra_columns_and_decrement() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 2).await?;
    let mut repo = post_repository(db.clone());

    let changed = repo
        .increment(post::Column::Views, 10, attributes(json!({"author": "bot"})))
        .await?;
    assert_eq!(changed, 2);

    repo.where_eq(post::Column::Id, 2)
        .decrement(post::Column::Views, 5, Default::default())
        .await?;

    let first = find_post(&db, 1).await?.expect("post 1");
    let second = find_post(&db, 2).await?.expect("post 2");
    assert_eq!((first.views, first.author.as_deref()), (11, Some("bot")));
    assert_eq!(second.views, 7);
    Ok(())
}

#[tokio::test]
async fn increment_honours_limit_and_offset() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 5).await?;
    let mut repo = post_repository(db);

    let changed = repo
        .order_by_with(post::Column::Id, Order::Asc)
        .take(1)
        .increment_by_one(post::Column::Views)
        .await?;
    assert_eq!(changed, 1);

    let changed = repo
        .order_by_with(post::Column::Id, Order::Asc)
        .skip(1)
        .take(2)
        .increment(post::Column::Views, 10, Default::default())
        .await?;
    assert_eq!(changed, 2);

    let views = repo
        .order_by_with(post::Column::Id, Order::Asc)
        .pluck::<i32, _>(post::Column::Views)
        .await?;
    assert_eq!(views, vec![2, 12, 13, 4, 5]);
    Ok(())
}

#[tokio::test]
async fn increment_through_join_touches_related_rows_only() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let ada = seed_user(&db, "ada").await?;
    let bob = seed_user(&db, "bob").await?;
    let mut repo = post_repository(db);

    for (title, owner) in [("a1", ada), ("b1", bob)] {
        repo.create(attributes(json!({"title": title, "status": 1, "user_id": owner})))
            .await?;
    }

    let changed = repo
        .join(post::Relation::User.def())
        .filter(user::Column::Name.eq("ada"))
        .increment_by_one(post::Column::Views)
        .await?;
    assert_eq!(changed, 1);

    let views = repo
        .order_by_with(post::Column::Id, Order::Asc)
        .pluck::<i32, _>(post::Column::Views)
        .await?;
    assert_eq!(views, vec![1, 0]);
    Ok(())
}

#[tokio::test]
async fn decrement_rejects_unrepresentable_amount() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 1).await?;
    let mut repo = post_repository(db.clone());

    let error = repo
        .where_eq(post::Column::Id, 1)
        .decrement(post::Column::Views, i64::MIN, Default::default())
        .await
        .unwrap_err();
    assert!(
        matches!(error, RepositoryError::InvalidArgument { ref method, .. } if method == "decrement"),
        "{error:?}"
    );
    assert!(repo.query().is_fresh());
    assert_eq!(find_post(&db, 1).await?.expect("post 1").views, 1);
    Ok(())
}

#[tokio::test]
async fn paginate_forty_rows_by_fifteen() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 40).await?;
    let mut repo = post_repository(db);

    let mut pages = Vec::new();
    for page in 1..=3 {
        pages.push(repo.paginate(page).await?);
    }

    let sizes: Vec<_> = pages.iter().map(|page| page.items.len()).collect();
    assert_eq!(sizes, vec![15, 15, 10]);

    let ids: Vec<_> = pages
        .iter()
        .flat_map(|page| page.items.iter().map(|post| post.id))
        .collect();
    assert_eq!(ids, (1..=40).rev().collect::<Vec<_>>());

    let first = &pages[0];
    assert_eq!((first.total, first.per_page, first.last_page), (40, 15, 3));
    assert!(first.has_more_pages());
    assert!(!pages[2].has_more_pages());
    assert!(repo.query().is_fresh());
    Ok(())
}

#[tokio::test]
async fn paginate_honours_chain_and_config() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 40).await?;
    let config = RepositoryConfig {
        per_page: 10,
        max_per_page: 12,
    };
    let mut repo = post_repository(db).with_config(&config);

    let odd = repo.where_eq(post::Column::Status, 1).paginate(2).await?;
    assert_eq!(odd.total, 20);
    assert_eq!(odd.items.len(), 10);
    assert_eq!(odd.items[0].id, 19);

    let clamped = repo.paginate_with(1, 500).await?;
    assert_eq!(clamped.per_page, 12);
    assert_eq!(clamped.items.len(), 12);
    Ok(())
}

#[tokio::test]
async fn chunk_walks_in_key_order_and_can_stop() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 10).await?;
    let mut repo = post_repository(db);

    let mut seen = Vec::new();
    let completed = repo
        .chunk(4, |rows| {
            seen.push(rows.iter().map(|post| post.id).collect::<Vec<_>>());
            true
        })
        .await?;
    assert!(completed);
    assert_eq!(seen, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8], vec![9, 10]]);

    let mut calls = 0;
    let completed = repo
        .where_eq(post::Column::Status, 0)
        .chunk(2, |_| {
            calls += 1;
            false
        })
        .await?;
    assert!(!completed);
    assert_eq!(calls, 1);
    assert!(repo.query().is_fresh());

    let error = repo.chunk(0, |_| true).await.unwrap_err();
    assert!(matches!(error, RepositoryError::InvalidArgument { .. }));
    Ok(())
}

#[tokio::test]
async fn aggregates_follow_the_chain() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 4).await?;
    let mut repo = post_repository(db);

    assert_eq!(repo.max::<i32, _>(post::Column::Views).await?, Some(4));
    assert_eq!(repo.sum::<i64, _>(post::Column::Views).await?, Some(10));
    assert_eq!(repo.avg::<f64, _>(post::Column::Views).await?, Some(2.5));
    assert_eq!(repo.count().await?, 4);
    assert_eq!(repo.count_column(post::Column::Author).await?, 0);

    let odd = repo
        .where_eq(post::Column::Status, 1)
        .sum::<i64, _>(post::Column::Views)
        .await?;
    assert_eq!(odd, Some(4));

    let empty = repo
        .where_eq(post::Column::Status, 7)
        .max::<i32, _>(post::Column::Views)
        .await?;
    assert_eq!(empty, None);

    let title = repo
        .where_eq(post::Column::Id, 2)
        .value::<String, _>(post::Column::Title)
        .await?;
    assert_eq!(title.as_deref(), Some("post 2"));
    Ok(())
}

#[tokio::test]
async fn aggregate_failures_are_query_errors() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let mut repo = post_repository(db);

    let error = repo
        .where_raw("no_such_column = ?", [1])
        .count()
        .await
        .unwrap_err();
    assert!(matches!(error, RepositoryError::Query(_)), "{error:?}");
    assert!(repo.query().is_fresh());
    Ok(())
}

#[tokio::test]
async fn join_filters_on_related_table() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let ada = seed_user(&db, "ada").await?;
    let bob = seed_user(&db, "bob").await?;
    let mut repo = post_repository(db);

    for (title, owner) in [("a1", ada), ("b1", bob), ("a2", ada)] {
        repo.create(attributes(json!({
            "title": title,
            "status": 1,
            "user_id": owner,
        })))
        .await?;
    }

    let titles = repo
        .join(post::Relation::User.def())
        .filter(user::Column::Name.eq("ada"))
        .order_by_with(post::Column::Id, Order::Asc)
        .pluck::<String, _>(post::Column::Title)
        .await?;
    assert_eq!(titles, vec!["a1".to_string(), "a2".to_string()]);
    Ok(())
}

fn owned_by_existing_user() -> SelectStatement {
    user::Entity::find()
        .select_only()
        .column(user::Column::Id)
        .filter(
            Expr::col((user::Entity, user::Column::Id))
                .equals((post::Entity, post::Column::UserId)),
        )
        .into_query()
}

#[tokio::test]
async fn exists_distinct_and_grouping_execute() -> Result<()> {
    let db = setup_test_db_arc().await?;
    seed_posts(&db, 4).await?;
    let ada = seed_user(&db, "ada").await?;
    let mut repo = post_repository(db);

    for id in [1, 2] {
        repo.update(attributes(json!({"user_id": ada})), id).await?;
    }

    let owned = repo.where_exists(owned_by_existing_user()).count().await?;
    assert_eq!(owned, 2);
    let orphaned = repo.where_not_exists(owned_by_existing_user()).count().await?;
    assert_eq!(orphaned, 2);

    let statuses = repo
        .select([post::Column::Status])
        .distinct()
        .order_by_with(post::Column::Status, Order::Asc)
        .pluck::<i32, _>(post::Column::Status)
        .await?;
    assert_eq!(statuses, vec![0, 1]);

    let grouped = repo
        .group_by(post::Column::Status)
        .order_by_with(post::Column::Status, Order::Desc)
        .pluck::<i32, _>(post::Column::Status)
        .await?;
    assert_eq!(grouped, vec![1, 0]);
    Ok(())
}

#[tokio::test]
async fn default_name_is_derived_from_table() -> Result<()> {
    let db = setup_test_db_arc().await?;
    let repo: Repository<post::Entity> = Repository::new(db);

    assert_eq!(repo.name(), "PostsRepository");
    assert_eq!(repo.model().table_name(), "posts");
    assert_eq!(repo.model().primary_key_name(), "id");
    assert_eq!(repo.per_page(), 15);
    Ok(())
}
