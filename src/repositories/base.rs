//! Generic repository over a SeaORM entity
//!
//! This module provides the [`Repository`] struct which pairs a live
//! [`QueryRelay`] with named read, write and aggregate operations. Builder
//! calls made on the repository accumulate on the relay; every terminal
//! operation executes against whatever the relay holds and leaves a fresh
//! relay behind, whether it succeeds, fails or is dropped mid-flight.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use sea_orm::sea_query::{
    Condition, DynIden, Expr, Func, IntoCondition, JoinType, SelectStatement, SimpleExpr,
};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    Order, PaginatorTrait, QueryFilter, QuerySelect, QueryTrait, RelationDef, Select,
    TryGetable, Value,
};

use crate::config::RepositoryConfig;
use crate::error::{RepositoryError, RepositoryResult};
use crate::events::{self, EventBus, EventRegistry, LifecycleEvent, LifecycleHandler, RepositoryEvent};
use crate::model::{Attributes, ModelHandle, PrimaryKeyValue};
use crate::pagination::Page;
use crate::relay::{Operator, QueryMagic, QueryRelay};

/// Rows per page when no size is configured.
pub const DEFAULT_PER_PAGE: u64 = 15;
/// Upper bound applied to requested page sizes.
pub const DEFAULT_MAX_PER_PAGE: u64 = 100;

const AGGREGATE_ALIAS: &str = "aggregate";

/// Repository for entity `E`
pub struct Repository<E: EntityTrait> {
    /// Database connection pool
    db: Arc<DatabaseConnection>,
    name: String,
    model: OnceLock<ModelHandle<E>>,
    fillable: Vec<String>,
    relay: QueryRelay<E>,
    events: EventRegistry,
    bus: Option<Arc<dyn EventBus>>,
    per_page: u64,
    max_per_page: u64,
}

impl<E: EntityTrait> fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.name)
            .field("fillable", &self.fillable)
            .field("events", &self.events)
            .field("has_event_bus", &self.bus.is_some())
            .field("per_page", &self.per_page)
            .finish_non_exhaustive()
    }
}

impl<E: EntityTrait> Repository<E> {
    /// Creates a new Repository instance
    ///
    /// # Arguments
    ///
    /// * `db` - Database connection pool
    ///
    /// # Returns
    ///
    /// Returns a repository with no fillable restriction, no lifecycle
    /// handlers and a fresh relay
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        let name = format!("{}Repository", pascal_case(E::default().table_name()));
        Self {
            db,
            name,
            model: OnceLock::new(),
            fillable: Vec::new(),
            relay: QueryRelay::new(E::find()),
            events: EventRegistry::new(),
            bus: None,
            per_page: DEFAULT_PER_PAGE,
            max_per_page: DEFAULT_MAX_PER_PAGE,
        }
    }

    /// Name reported in errors and lifecycle events.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Restrict mutating input to the given attribute names.
    pub fn with_fillable<S, I>(mut self, fillable: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        self.fillable = fillable.into_iter().map(Into::into).collect();
        self
    }

    /// Register the handler for one lifecycle event, replacing any previous one.
    pub fn with_event<H>(mut self, kind: LifecycleEvent, handler: H) -> Self
    where
        H: LifecycleHandler + 'static,
    {
        self.events.register(kind, Arc::new(handler));
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_per_page(mut self, per_page: u64) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    /// Apply pagination defaults from configuration.
    pub fn with_config(mut self, config: &RepositoryConfig) -> Self {
        self.max_per_page = config.max_per_page.max(1);
        self.per_page = config.per_page.clamp(1, self.max_per_page);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn db(&self) -> &Arc<DatabaseConnection> {
        &self.db
    }

    pub fn fillable(&self) -> &[String] {
        &self.fillable
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    /// Table metadata, resolved on first access.
    pub fn model(&self) -> &ModelHandle<E> {
        self.model.get_or_init(ModelHandle::new)
    }

    /// The live relay.
    pub fn query(&self) -> &QueryRelay<E> {
        &self.relay
    }

    /// Discard everything accumulated on the live relay.
    pub fn reset_query(&mut self) -> &mut Self {
        self.take_relay();
        self
    }

    /// Apply builder calls to the live relay.
    pub fn chain<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(QueryRelay<E>) -> QueryRelay<E>,
    {
        let relay = self.take_relay();
        self.relay = f(relay);
        self
    }

    /// Keep only fillable keys, in input order. An empty allow-list keeps all.
    pub fn filter_fillable(&self, data: Attributes) -> Attributes {
        if self.fillable.is_empty() {
            return data;
        }
        data.into_iter()
            .filter(|(key, _)| self.fillable.iter().any(|name| name == key))
            .collect()
    }

    /// Fire a lifecycle event.
    ///
    /// Returns `false` when the registered handler or the event bus vetoed.
    pub fn fire_event(&self, kind: LifecycleEvent) -> bool {
        let event = RepositoryEvent {
            kind,
            repository: self.name.clone(),
            table: self.model().table_name().to_string(),
        };
        events::dispatch(&self.events, self.bus.as_deref(), &event)
    }

    fn take_relay(&mut self) -> QueryRelay<E> {
        let fresh = QueryRelay::new(self.model().query());
        std::mem::replace(&mut self.relay, fresh)
    }

    /// Run one terminal operation against the accumulated relay.
    ///
    /// The live relay is replaced before `op` is polled, so it is fresh on
    /// every exit path including cancellation.
    async fn terminal<T, F, Fut>(&mut self, operation: &'static str, op: F) -> RepositoryResult<T>
    where
        F: FnOnce(QueryRelay<E>, Arc<DatabaseConnection>) -> Fut,
        Fut: Future<Output = RepositoryResult<T>>,
    {
        let relay = self.take_relay();
        let table = self.model().table_name();

        if tracing::enabled!(tracing::Level::DEBUG) {
            let sql = relay.get_query().build(self.db.get_database_backend()).to_string();
            tracing::debug!(table, operation, %sql, "Executing repository operation");
        }

        let result = op(relay, self.db.clone()).await;
        if let Err(error) = &result {
            tracing::warn!(table, operation, error = %error, "Repository operation failed");
        }
        result
    }

    // -- forwarded builder calls ---------------------------------------------

    /// Replace the relay's builder, discarding accumulated clauses.
    pub fn set_query(&mut self, select: Select<E>) -> &mut Self {
        self.relay.set_query(select);
        self
    }

    pub fn select<C, I>(&mut self, columns: I) -> &mut Self
    where
        C: ColumnTrait,
        I: IntoIterator<Item = C>,
    {
        self.chain(|q| q.select(columns))
    }

    pub fn select_raw(&mut self, sql: &str, alias: &str) -> &mut Self {
        self.chain(|q| q.select_raw(sql, alias))
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.chain(|q| q.distinct())
    }

    pub fn filter(&mut self, condition: impl IntoCondition) -> &mut Self {
        self.chain(|q| q.filter(condition))
    }

    pub fn or_filter(&mut self, condition: impl IntoCondition) -> &mut Self {
        self.chain(|q| q.or_filter(condition))
    }

    pub fn where_eq<C: ColumnTrait>(&mut self, column: C, value: impl Into<Value>) -> &mut Self {
        self.chain(|q| q.where_eq(column, value))
    }

    pub fn where_op<C: ColumnTrait>(
        &mut self,
        column: C,
        op: Operator,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.chain(|q| q.where_op(column, op, value))
    }

    pub fn or_where_eq<C: ColumnTrait>(&mut self, column: C, value: impl Into<Value>) -> &mut Self {
        self.chain(|q| q.or_where_eq(column, value))
    }

    pub fn or_where_op<C: ColumnTrait>(
        &mut self,
        column: C,
        op: Operator,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.chain(|q| q.or_where_op(column, op, value))
    }

    pub fn where_between<C, V>(&mut self, column: C, low: V, high: V) -> &mut Self
    where
        C: ColumnTrait,
        V: Into<Value>,
    {
        self.chain(|q| q.where_between(column, low, high))
    }

    pub fn where_not_between<C, V>(&mut self, column: C, low: V, high: V) -> &mut Self
    where
        C: ColumnTrait,
        V: Into<Value>,
    {
        self.chain(|q| q.where_not_between(column, low, high))
    }

    pub fn where_in<C, V, I>(&mut self, column: C, values: I) -> &mut Self
    where
        C: ColumnTrait,
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.chain(|q| q.where_in(column, values))
    }

    pub fn where_not_in<C, V, I>(&mut self, column: C, values: I) -> &mut Self
    where
        C: ColumnTrait,
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.chain(|q| q.where_not_in(column, values))
    }

    pub fn where_null<C: ColumnTrait>(&mut self, column: C) -> &mut Self {
        self.chain(|q| q.where_null(column))
    }

    pub fn where_not_null<C: ColumnTrait>(&mut self, column: C) -> &mut Self {
        self.chain(|q| q.where_not_null(column))
    }

    pub fn where_exists(&mut self, subquery: SelectStatement) -> &mut Self {
        self.chain(|q| q.where_exists(subquery))
    }

    pub fn where_not_exists(&mut self, subquery: SelectStatement) -> &mut Self {
        self.chain(|q| q.where_not_exists(subquery))
    }

    pub fn where_raw<V, I>(&mut self, sql: &str, values: I) -> &mut Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.chain(|q| q.where_raw(sql, values))
    }

    pub fn or_where_raw<V, I>(&mut self, sql: &str, values: I) -> &mut Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.chain(|q| q.or_where_raw(sql, values))
    }

    pub fn join(&mut self, relation: RelationDef) -> &mut Self {
        self.chain(|q| q.join(relation))
    }

    pub fn left_join(&mut self, relation: RelationDef) -> &mut Self {
        self.chain(|q| q.left_join(relation))
    }

    pub fn right_join(&mut self, relation: RelationDef) -> &mut Self {
        self.chain(|q| q.right_join(relation))
    }

    pub fn join_on<F>(&mut self, join: JoinType, relation: RelationDef, on: F) -> &mut Self
    where
        F: Fn(DynIden, DynIden) -> Condition + Send + Sync + 'static,
    {
        self.chain(|q| q.join_on(join, relation, on))
    }

    pub fn group_by<C: ColumnTrait>(&mut self, column: C) -> &mut Self {
        self.chain(|q| q.group_by(column))
    }

    /// Order by `column`, descending.
    pub fn order_by<C: ColumnTrait>(&mut self, column: C) -> &mut Self {
        self.chain(|q| q.order_by(column))
    }

    pub fn order_by_with<C: ColumnTrait>(&mut self, column: C, order: Order) -> &mut Self {
        self.chain(|q| q.order_by_with(column, order))
    }

    pub fn order_by_raw(&mut self, sql: &str, order: Order) -> &mut Self {
        self.chain(|q| q.order_by_raw(sql, order))
    }

    pub fn skip(&mut self, offset: u64) -> &mut Self {
        self.chain(|q| q.skip(offset))
    }

    pub fn take(&mut self, limit: u64) -> &mut Self {
        self.chain(|q| q.take(limit))
    }

    pub fn with<S, I>(&mut self, relations: I) -> &mut Self
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        self.chain(|q| q.with(relations))
    }

    pub fn without<S, I>(&mut self, relations: I) -> &mut Self
    where
        S: AsRef<str>,
        I: IntoIterator<Item = S>,
    {
        self.chain(|q| q.without(relations))
    }

    pub fn union(&mut self, other: QueryRelay<E>) -> &mut Self {
        self.chain(|q| q.union(other))
    }

    pub fn union_all(&mut self, other: QueryRelay<E>) -> &mut Self {
        self.chain(|q| q.union_all(other))
    }

    pub fn when<F>(&mut self, condition: bool, then: F) -> &mut Self
    where
        F: FnOnce(QueryRelay<E>) -> QueryRelay<E>,
    {
        self.chain(|q| q.when(condition, then))
    }

    pub fn when_else<F, G>(&mut self, condition: bool, then: F, otherwise: G) -> &mut Self
    where
        F: FnOnce(QueryRelay<E>) -> QueryRelay<E>,
        G: FnOnce(QueryRelay<E>) -> QueryRelay<E>,
    {
        self.chain(|q| q.when_else(condition, then, otherwise))
    }

    pub fn when_multiple<F, I>(&mut self, conditions: &[bool], callbacks: I) -> &mut Self
    where
        F: FnOnce(QueryRelay<E>) -> QueryRelay<E>,
        I: IntoIterator<Item = F>,
    {
        self.chain(|q| q.when_multiple(conditions, callbacks))
    }

    pub fn magic(&mut self, magic: Option<&dyn QueryMagic<E>>) -> &mut Self {
        self.chain(|q| q.magic(magic))
    }
}

impl<E> Repository<E>
where
    E: EntityTrait,
    E::ActiveModel: Send,
    E::Model: IntoActiveModel<E::ActiveModel> + Send + Sync,
{
    // -- writes --------------------------------------------------------------

    /// Creates a new record
    ///
    /// # Arguments
    ///
    /// * `data` - Attribute map; keys outside the fillable list are dropped
    ///
    /// # Returns
    ///
    /// Returns the persisted record, or [`RepositoryError::Store`]
    pub async fn create(&mut self, data: Attributes) -> RepositoryResult<E::Model> {
        let attributes = self.filter_fillable(data);
        let model = self.model().clone();

        self.terminal("create", move |_, db| async move {
            let record = model.new_record(attributes).map_err(RepositoryError::store)?;
            model
                .create(db.as_ref(), record)
                .await
                .map_err(RepositoryError::store)
        })
        .await
    }

    /// Updates the record with primary key `id`
    ///
    /// # Arguments
    ///
    /// * `data` - Attribute map; keys outside the fillable list are dropped
    /// * `id` - Primary key of the record to update
    ///
    /// # Returns
    ///
    /// Returns the updated record. A missing record yields
    /// [`RepositoryError::NotFound`] without any write; other failures yield
    /// [`RepositoryError::Update`].
    pub async fn update<K>(&mut self, data: Attributes, id: K) -> RepositoryResult<E::Model>
    where
        K: Into<PrimaryKeyValue<E>>,
    {
        let attributes = self.filter_fillable(data);
        let record = self.by_id_or_fail(id).await.map_err(|error| match error {
            RepositoryError::Query(message) => RepositoryError::Update(message),
            other => other,
        })?;
        if attributes.is_empty() {
            return Ok(record);
        }

        let model = self.model().clone();
        self.terminal("update", move |_, db| async move {
            let mut record = model.edit(record);
            model
                .assign(&mut record, attributes)
                .map_err(RepositoryError::update)?;
            model
                .save(db.as_ref(), record)
                .await
                .map_err(RepositoryError::update)
        })
        .await
    }

    /// [`Repository::update`] for integer keys.
    pub async fn update_by_int<K>(&mut self, data: Attributes, id: K) -> RepositoryResult<E::Model>
    where
        K: Into<PrimaryKeyValue<E>> + Into<i64>,
    {
        self.update(data, id).await
    }

    /// [`Repository::update`] for string keys.
    pub async fn update_by_str(
        &mut self,
        data: Attributes,
        id: impl Into<String>,
    ) -> RepositoryResult<E::Model>
    where
        String: Into<PrimaryKeyValue<E>>,
    {
        self.update(data, id.into()).await
    }

    /// Deletes the record with primary key `id`, scoped by any accumulated
    /// predicates.
    ///
    /// Returns the number of rows removed.
    pub async fn delete<K>(&mut self, id: K) -> RepositoryResult<u64>
    where
        K: Into<PrimaryKeyValue<E>>,
    {
        let key = self.model().key_condition(id);
        let primary_key = self.model().primary_key();

        self.terminal("delete", move |relay, db| async move {
            let scope = match primary_key.and_then(|column| relay.key_scope(column)) {
                Some(chain) => Condition::all().add(key).add(chain),
                None => key,
            };
            E::delete_many()
                .filter(scope)
                .exec(db.as_ref())
                .await
                .map(|result| result.rows_affected)
                .map_err(RepositoryError::delete)
        })
        .await
    }

    /// Deletes every record whose primary key is in `ids` with one statement.
    ///
    /// Missing keys are not an error; returns the number of rows removed.
    pub async fn delete_by_ids<V, I>(&mut self, ids: I) -> RepositoryResult<u64>
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let key = self.model().primary_key();
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();

        self.terminal("delete_by_ids", move |_, db| async move {
            let key = key.ok_or_else(|| RepositoryError::delete("entity declares no primary key"))?;
            E::delete_many()
                .filter(key.is_in(ids))
                .exec(db.as_ref())
                .await
                .map(|result| result.rows_affected)
                .map_err(RepositoryError::delete)
        })
        .await
    }

    // -- reads ---------------------------------------------------------------

    pub async fn by_id<K>(&mut self, id: K) -> RepositoryResult<Option<E::Model>>
    where
        K: Into<PrimaryKeyValue<E>>,
    {
        let key = self.model().key_condition(id);

        self.terminal("by_id", move |relay, db| async move {
            relay
                .filter(key)
                .into_query()
                .one(db.as_ref())
                .await
                .map_err(RepositoryError::query)
        })
        .await
    }

    pub async fn by_id_or_fail<K>(&mut self, id: K) -> RepositoryResult<E::Model>
    where
        K: Into<PrimaryKeyValue<E>>,
    {
        self.by_id(id).await?.ok_or(RepositoryError::NotFound)
    }

    /// First record where `column = value`.
    pub async fn one_by<C, V>(&mut self, column: C, value: V) -> RepositoryResult<Option<E::Model>>
    where
        C: ColumnTrait,
        V: Into<Value>,
    {
        let value = value.into();

        self.terminal("one_by", move |relay, db| async move {
            relay
                .where_eq(column, value)
                .into_query()
                .one(db.as_ref())
                .await
                .map_err(RepositoryError::query)
        })
        .await
    }

    pub async fn one_by_or_fail<C, V>(&mut self, column: C, value: V) -> RepositoryResult<E::Model>
    where
        C: ColumnTrait,
        V: Into<Value>,
    {
        self.one_by(column, value).await?.ok_or(RepositoryError::NotFound)
    }

    pub async fn first(&mut self) -> RepositoryResult<Option<E::Model>> {
        self.terminal("first", |relay, db| async move {
            relay
                .into_query()
                .one(db.as_ref())
                .await
                .map_err(RepositoryError::query)
        })
        .await
    }

    pub async fn first_or_fail(&mut self) -> RepositoryResult<E::Model> {
        self.first().await?.ok_or(RepositoryError::NotFound)
    }

    /// Every record in the table, ignoring anything accumulated on the relay.
    pub async fn all(&mut self) -> RepositoryResult<Vec<E::Model>> {
        let select = self.model().query();
        self.relay.set_query(select);
        self.get().await
    }

    /// Every record matching the accumulated relay.
    pub async fn get(&mut self) -> RepositoryResult<Vec<E::Model>> {
        self.terminal("get", |relay, db| async move {
            relay
                .into_query()
                .all(db.as_ref())
                .await
                .map_err(RepositoryError::query)
        })
        .await
    }

    // -- aggregates ----------------------------------------------------------

    /// One column's values across matching rows.
    pub async fn pluck<V, C>(&mut self, column: C) -> RepositoryResult<Vec<V>>
    where
        V: TryGetable,
        C: ColumnTrait,
    {
        self.terminal("pluck", move |relay, db| async move {
            relay
                .into_query()
                .select_only()
                .column(column)
                .into_tuple::<V>()
                .all(db.as_ref())
                .await
                .map_err(RepositoryError::query)
        })
        .await
    }

    /// One column of the first matching row.
    pub async fn value<V, C>(&mut self, column: C) -> RepositoryResult<Option<V>>
    where
        V: TryGetable,
        C: ColumnTrait,
    {
        self.terminal("value", move |relay, db| async move {
            relay
                .into_query()
                .select_only()
                .column(column)
                .into_tuple::<V>()
                .one(db.as_ref())
                .await
                .map_err(RepositoryError::query)
        })
        .await
    }

    pub async fn max<V, C>(&mut self, column: C) -> RepositoryResult<Option<V>>
    where
        V: TryGetable,
        C: ColumnTrait,
    {
        let expr = SimpleExpr::from(Func::max(qualified(column)));
        self.aggregate("max", expr).await
    }

    pub async fn sum<V, C>(&mut self, column: C) -> RepositoryResult<Option<V>>
    where
        V: TryGetable,
        C: ColumnTrait,
    {
        let expr = SimpleExpr::from(Func::sum(qualified(column)));
        self.aggregate("sum", expr).await
    }

    pub async fn avg<V, C>(&mut self, column: C) -> RepositoryResult<Option<V>>
    where
        V: TryGetable,
        C: ColumnTrait,
    {
        let expr = SimpleExpr::from(Func::avg(qualified(column)));
        self.aggregate("avg", expr).await
    }

    /// `COUNT(*)` over matching rows.
    pub async fn count(&mut self) -> RepositoryResult<u64> {
        self.terminal("count", |relay, db| async move {
            relay
                .into_query()
                .count(db.as_ref())
                .await
                .map_err(RepositoryError::query)
        })
        .await
    }

    /// `COUNT(column)`, skipping nulls.
    pub async fn count_column<C: ColumnTrait>(&mut self, column: C) -> RepositoryResult<u64> {
        let expr = SimpleExpr::from(Func::count(qualified(column)));
        let count: Option<i64> = self.aggregate("count_column", expr).await?;
        Ok(count.map_or(0, |n| n.max(0) as u64))
    }

    async fn aggregate<V>(&mut self, operation: &'static str, expr: SimpleExpr) -> RepositoryResult<Option<V>>
    where
        V: TryGetable,
    {
        self.terminal(operation, move |relay, db| async move {
            relay
                .into_query()
                .select_only()
                .column_as(expr, AGGREGATE_ALIAS)
                .into_tuple::<Option<V>>()
                .one(db.as_ref())
                .await
                .map(Option::flatten)
                .map_err(RepositoryError::query)
        })
        .await
    }

    /// Add `amount` to `column` on every matching row, optionally setting
    /// `extra` columns in the same statement.
    ///
    /// Returns the number of rows changed.
    pub async fn increment<C: ColumnTrait>(
        &mut self,
        column: C,
        amount: i64,
        extra: Attributes,
    ) -> RepositoryResult<u64> {
        let model = self.model().clone();
        let primary_key = model.primary_key();

        self.terminal("increment", move |relay, db| async move {
            let mut update = E::update_many().col_expr(column, Expr::col(column).add(amount));
            for (name, value) in extra {
                let (extra_column, value) = model
                    .column_value(&name, value)
                    .map_err(RepositoryError::query)?;
                update = update.col_expr(extra_column, SimpleExpr::Value(value));
            }
            if let Some(scope) = primary_key.and_then(|key| relay.key_scope(key)) {
                update = update.filter(scope);
            }
            update
                .exec(db.as_ref())
                .await
                .map(|result| result.rows_affected)
                .map_err(RepositoryError::query)
        })
        .await
    }

    pub async fn increment_by_one<C: ColumnTrait>(&mut self, column: C) -> RepositoryResult<u64> {
        self.increment(column, 1, Attributes::new()).await
    }

    pub async fn decrement<C: ColumnTrait>(
        &mut self,
        column: C,
        amount: i64,
        extra: Attributes,
    ) -> RepositoryResult<u64> {
        let Some(amount) = amount.checked_neg() else {
            self.take_relay();
            return Err(RepositoryError::invalid_argument("decrement", "amount out of range"));
        };
        self.increment(column, amount, extra).await
    }

    pub async fn decrement_by_one<C: ColumnTrait>(&mut self, column: C) -> RepositoryResult<u64> {
        self.decrement(column, 1, Attributes::new()).await
    }

    /// Feed matching rows to `callback` in pages of `size`.
    ///
    /// Rows are walked in primary key order unless the relay is already
    /// ordered. Returns `false` when the callback stopped the walk by
    /// returning `false`.
    pub async fn chunk<F>(&mut self, size: u64, callback: F) -> RepositoryResult<bool>
    where
        F: FnMut(Vec<E::Model>) -> bool,
    {
        if size == 0 {
            self.take_relay();
            return Err(RepositoryError::invalid_argument("chunk", "chunk size must be positive"));
        }
        let key = self.model().primary_key();

        self.terminal("chunk", move |relay, db| async move {
            let mut callback = callback;
            let relay = match key {
                Some(key) if !relay.is_ordered() => relay.order_by_with(key, Order::Asc),
                _ => relay,
            };
            let mut pages = relay.into_query().paginate(db.as_ref(), size);
            while let Some(rows) = pages.fetch_and_next().await.map_err(RepositoryError::query)? {
                if !callback(rows) {
                    return Ok(false);
                }
            }
            Ok(true)
        })
        .await
    }

    /// Page `page` (1-based) using the configured page size.
    pub async fn paginate(&mut self, page: u64) -> RepositoryResult<Page<E::Model>> {
        let per_page = self.per_page;
        self.paginate_with(page, per_page).await
    }

    /// Page `page` (1-based) of `per_page` rows, newest primary key first.
    pub async fn paginate_with(&mut self, page: u64, per_page: u64) -> RepositoryResult<Page<E::Model>> {
        let per_page = per_page.clamp(1, self.max_per_page);
        let current_page = page.max(1);
        let key = self.model().primary_key();

        self.terminal("paginate", move |relay, db| async move {
            let relay = match key {
                Some(key) => relay.order_by_with(key, Order::Desc),
                None => relay,
            };
            let paginator = relay.into_query().paginate(db.as_ref(), per_page);
            let totals = paginator
                .num_items_and_pages()
                .await
                .map_err(RepositoryError::query)?;
            let items = paginator
                .fetch_page(current_page - 1)
                .await
                .map_err(RepositoryError::query)?;

            Ok(Page {
                items,
                total: totals.number_of_items,
                per_page,
                current_page,
                last_page: totals.number_of_pages.max(1),
            })
        })
        .await
    }
}

fn qualified<C: ColumnTrait>(column: C) -> Expr {
    Expr::col((column.entity_name(), column))
}

fn pascal_case(table: &str) -> String {
    table
        .split(|c: char| c == '_' || c == '-' || c == '.')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
