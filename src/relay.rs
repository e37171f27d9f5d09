//! # Query Relay
//!
//! [`QueryRelay`] is a chainable proxy over a SeaORM [`Select`] builder. Every
//! builder call consumes the relay and returns it with one more clause applied,
//! so calls compose left to right and are applied in call order. The relay has
//! no terminal reads of its own: [`QueryRelay::get_query`] hands the assembled
//! builder to whoever executes it.
//!
//! `WHERE` predicates are kept in an ordered list tagged AND / OR instead of
//! being pushed into the builder immediately. `DELETE` and `UPDATE`
//! statements are scoped through [`QueryRelay::key_scope`], which keeps
//! limits, offsets and joins of the chain intact.
//!
//! ```rust,ignore
//! let query = QueryRelay::<post::Entity>::new(post::Entity::find())
//!     .where_eq(post::Column::Status, 1)
//!     .where_op(post::Column::Views, Operator::Gt, 18)
//!     .order_by(post::Column::Id)
//!     .take(10)
//!     .get_query();
//! ```

use std::fmt;
use std::str::FromStr;

use sea_orm::sea_query::{
    BinOper, Condition, DynIden, Expr, IntoCondition, JoinType, SelectStatement, SimpleExpr,
    UnionType,
};
use sea_orm::{
    ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder, QuerySelect, QueryTrait,
    RelationDef, Select, Value,
};

/// Comparison operators accepted by [`QueryRelay::where_op`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
}

impl Operator {
    fn bin_oper(self) -> BinOper {
        match self {
            Operator::Eq => BinOper::Equal,
            Operator::Ne => BinOper::NotEqual,
            Operator::Lt => BinOper::SmallerThan,
            Operator::Lte => BinOper::SmallerThanOrEqual,
            Operator::Gt => BinOper::GreaterThan,
            Operator::Gte => BinOper::GreaterThanOrEqual,
            Operator::Like => BinOper::Like,
            Operator::NotLike => BinOper::NotLike,
        }
    }
}

/// Error returned when parsing an unknown operator token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperator(pub String);

impl fmt::Display for UnknownOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown comparison operator '{}'", self.0)
    }
}

impl std::error::Error for UnknownOperator {}

impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Ne),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Gte),
            "like" => Ok(Operator::Like),
            "not like" => Ok(Operator::NotLike),
            other => Err(UnknownOperator(other.to_string())),
        }
    }
}

/// How a predicate joins the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

/// A reusable bundle of builder calls applied through [`QueryRelay::magic`].
pub trait QueryMagic<E: EntityTrait> {
    fn apply(&self, relay: QueryRelay<E>) -> QueryRelay<E>;
}

impl<E, F> QueryMagic<E> for F
where
    E: EntityTrait,
    F: Fn(QueryRelay<E>) -> QueryRelay<E>,
{
    fn apply(&self, relay: QueryRelay<E>) -> QueryRelay<E> {
        self(relay)
    }
}

/// Chainable query state for entity `E`.
#[derive(Debug, Clone)]
pub struct QueryRelay<E: EntityTrait> {
    select: Select<E>,
    wheres: Vec<(Connective, Condition)>,
    eager: Vec<String>,
    ordered: bool,
    touched: bool,
}

impl<E: EntityTrait> QueryRelay<E> {
    /// Wrap a builder.
    pub fn new(select: Select<E>) -> Self {
        Self {
            select,
            wheres: Vec::new(),
            eager: Vec::new(),
            ordered: false,
            touched: false,
        }
    }

    /// Replace the builder wholesale, discarding every accumulated clause.
    pub fn set_query(&mut self, select: Select<E>) {
        *self = Self::new(select);
    }

    /// The assembled builder: the wrapped select plus the folded predicate.
    pub fn get_query(&self) -> Select<E> {
        self.clone().into_query()
    }

    /// Consume the relay, yielding the assembled builder.
    pub fn into_query(self) -> Select<E> {
        match fold(&self.wheres) {
            Some(condition) => self.select.filter(condition),
            None => self.select,
        }
    }

    /// The accumulated `WHERE` predicate, if any.
    pub fn where_condition(&self) -> Option<Condition> {
        fold(&self.wheres)
    }

    /// `key IN (SELECT key FROM <chain>)`, or `None` for an untouched relay.
    pub fn key_scope<C: ColumnTrait>(self, key: C) -> Option<Condition> {
        if self.is_fresh() {
            return None;
        }
        let subquery = QueryTrait::into_query(self.into_query().select_only().column(key));
        Some(Condition::all().add(key.in_subquery(subquery)))
    }

    /// Relation names requested through [`QueryRelay::with`].
    pub fn eager_loads(&self) -> &[String] {
        &self.eager
    }

    /// Whether an ordering clause has been applied.
    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    /// True until the first builder call.
    pub fn is_fresh(&self) -> bool {
        !self.touched
    }

    fn map_select(mut self, f: impl FnOnce(Select<E>) -> Select<E>) -> Self {
        self.select = f(self.select);
        self.touched = true;
        self
    }

    fn push(mut self, connective: Connective, condition: impl IntoCondition) -> Self {
        self.wheres.push((connective, condition.into_condition()));
        self.touched = true;
        self
    }

    // -- selection ---------------------------------------------------------

    /// Restrict the selected columns.
    pub fn select<C, I>(self, columns: I) -> Self
    where
        C: ColumnTrait,
        I: IntoIterator<Item = C>,
    {
        self.map_select(|select| select.select_only().columns(columns))
    }

    /// Add a raw select expression under an alias.
    pub fn select_raw(self, sql: &str, alias: &str) -> Self {
        let expr = Expr::cust(sql.to_string());
        self.map_select(|select| select.column_as(expr, alias))
    }

    pub fn distinct(self) -> Self {
        self.map_select(|select| select.distinct())
    }

    // -- predicates --------------------------------------------------------

    /// AND an arbitrary condition.
    pub fn filter(self, condition: impl IntoCondition) -> Self {
        self.push(Connective::And, condition)
    }

    /// OR an arbitrary condition.
    pub fn or_filter(self, condition: impl IntoCondition) -> Self {
        self.push(Connective::Or, condition)
    }

    /// `column = value`.
    pub fn where_eq<C: ColumnTrait>(self, column: C, value: impl Into<Value>) -> Self {
        self.filter(column.eq(value))
    }

    /// `column <op> value`.
    pub fn where_op<C: ColumnTrait>(self, column: C, op: Operator, value: impl Into<Value>) -> Self {
        self.filter(compare(column, op, value.into()))
    }

    pub fn or_where_eq<C: ColumnTrait>(self, column: C, value: impl Into<Value>) -> Self {
        self.or_filter(column.eq(value))
    }

    pub fn or_where_op<C: ColumnTrait>(
        self,
        column: C,
        op: Operator,
        value: impl Into<Value>,
    ) -> Self {
        self.or_filter(compare(column, op, value.into()))
    }

    pub fn where_between<C, V>(self, column: C, low: V, high: V) -> Self
    where
        C: ColumnTrait,
        V: Into<Value>,
    {
        self.filter(column.between(low, high))
    }

    pub fn where_not_between<C, V>(self, column: C, low: V, high: V) -> Self
    where
        C: ColumnTrait,
        V: Into<Value>,
    {
        self.filter(column.not_between(low, high))
    }

    pub fn where_in<C, V, I>(self, column: C, values: I) -> Self
    where
        C: ColumnTrait,
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.filter(column.is_in(values))
    }

    pub fn where_not_in<C, V, I>(self, column: C, values: I) -> Self
    where
        C: ColumnTrait,
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.filter(column.is_not_in(values))
    }

    pub fn where_null<C: ColumnTrait>(self, column: C) -> Self {
        self.filter(column.is_null())
    }

    pub fn where_not_null<C: ColumnTrait>(self, column: C) -> Self {
        self.filter(column.is_not_null())
    }

    /// `EXISTS (subquery)`.
    pub fn where_exists(self, subquery: SelectStatement) -> Self {
        self.filter(Expr::exists(subquery))
    }

    /// `NOT EXISTS (subquery)`.
    pub fn where_not_exists(self, subquery: SelectStatement) -> Self {
        self.filter(Expr::exists(subquery).not())
    }

    /// AND a raw SQL fragment with bound values.
    pub fn where_raw<V, I>(self, sql: &str, values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.filter(Expr::cust_with_values(sql.to_string(), values))
    }

    /// OR a raw SQL fragment with bound values.
    pub fn or_where_raw<V, I>(self, sql: &str, values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.or_filter(Expr::cust_with_values(sql.to_string(), values))
    }

    // -- joins -------------------------------------------------------------

    pub fn join(self, relation: RelationDef) -> Self {
        self.map_select(|select| select.join(JoinType::InnerJoin, relation))
    }

    pub fn left_join(self, relation: RelationDef) -> Self {
        self.map_select(|select| select.join(JoinType::LeftJoin, relation))
    }

    pub fn right_join(self, relation: RelationDef) -> Self {
        self.map_select(|select| select.join(JoinType::RightJoin, relation))
    }

    /// Join with an extra `ON` predicate built from the left and right table
    /// identifiers.
    pub fn join_on<F>(self, join: JoinType, relation: RelationDef, on: F) -> Self
    where
        F: Fn(DynIden, DynIden) -> Condition + Send + Sync + 'static,
    {
        let relation = relation.on_condition(on);
        self.map_select(|select| select.join(join, relation))
    }

    // -- grouping, ordering, windows ----------------------------------------

    pub fn group_by<C: ColumnTrait>(self, column: C) -> Self {
        self.map_select(|select| select.group_by(column))
    }

    /// Order by `column`, descending.
    pub fn order_by<C: ColumnTrait>(self, column: C) -> Self {
        self.order_by_with(column, Order::Desc)
    }

    pub fn order_by_with<C: ColumnTrait>(mut self, column: C, order: Order) -> Self {
        self.ordered = true;
        self.map_select(|select| select.order_by(column, order))
    }

    pub fn order_by_raw(mut self, sql: &str, order: Order) -> Self {
        self.ordered = true;
        let expr = Expr::cust(sql.to_string());
        self.map_select(|select| select.order_by(expr, order))
    }

    /// `OFFSET n`.
    pub fn skip(self, offset: u64) -> Self {
        self.map_select(|select| select.offset(offset))
    }

    /// `LIMIT n`.
    pub fn take(self, limit: u64) -> Self {
        self.map_select(|select| select.limit(limit))
    }

    // -- eager loading -----------------------------------------------------

    /// Request relations to be loaded alongside the results.
    pub fn with<S, I>(mut self, relations: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        for relation in relations {
            let relation = relation.into();
            if !self.eager.contains(&relation) {
                self.eager.push(relation);
            }
        }
        self.touched = true;
        self
    }

    /// Drop previously requested relations.
    pub fn without<S, I>(mut self, relations: I) -> Self
    where
        S: AsRef<str>,
        I: IntoIterator<Item = S>,
    {
        for relation in relations {
            self.eager.retain(|name| name != relation.as_ref());
        }
        self.touched = true;
        self
    }

    // -- composition -------------------------------------------------------

    pub fn union(self, other: QueryRelay<E>) -> Self {
        self.union_with(UnionType::Distinct, other)
    }

    pub fn union_all(self, other: QueryRelay<E>) -> Self {
        self.union_with(UnionType::All, other)
    }

    fn union_with(self, kind: UnionType, other: QueryRelay<E>) -> Self {
        let statement = other.into_query().into_query();
        self.map_select(|mut select| {
            QueryTrait::query(&mut select).union(kind, statement);
            select
        })
    }

    /// Apply `then` only when `condition` holds.
    pub fn when<F>(self, condition: bool, then: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        if condition { then(self) } else { self }
    }

    /// Apply `then` when `condition` holds, `otherwise` when it does not.
    pub fn when_else<F, G>(self, condition: bool, then: F, otherwise: G) -> Self
    where
        F: FnOnce(Self) -> Self,
        G: FnOnce(Self) -> Self,
    {
        if condition { then(self) } else { otherwise(self) }
    }

    /// Pair conditions with callbacks by position and apply each callback
    /// whose condition holds. Unpaired entries are ignored.
    pub fn when_multiple<F, I>(self, conditions: &[bool], callbacks: I) -> Self
    where
        F: FnOnce(Self) -> Self,
        I: IntoIterator<Item = F>,
    {
        conditions
            .iter()
            .zip(callbacks)
            .fold(self, |relay, (condition, callback)| {
                if *condition { callback(relay) } else { relay }
            })
    }

    /// Apply a reusable predicate bundle when one is supplied.
    pub fn magic(self, magic: Option<&dyn QueryMagic<E>>) -> Self {
        match magic {
            Some(magic) => magic.apply(self),
            None => self,
        }
    }
}

fn compare<C: ColumnTrait>(column: C, op: Operator, value: Value) -> SimpleExpr {
    Expr::col((column.entity_name(), column)).binary(op.bin_oper(), value)
}

/// Fold predicates in reading order: `a AND b OR c` is `(a AND b) OR c`.
fn fold(wheres: &[(Connective, Condition)]) -> Option<Condition> {
    let mut iter = wheres.iter().cloned();
    let (mut current, first) = iter.next()?;
    let mut folded = group(current).add(first);
    for (connective, condition) in iter {
        folded = if connective == current {
            folded.add(condition)
        } else {
            group(connective).add(folded).add(condition)
        };
        current = connective;
    }
    Some(folded)
}

fn group(connective: Connective) -> Condition {
    match connective {
        Connective::And => Condition::all(),
        Connective::Or => Condition::any(),
    }
}
