//! # Model Handle
//!
//! A [`ModelHandle`] describes one persisted entity type: its table, primary
//! key and columns. It converts loosely-typed attribute maps into SeaORM
//! active models, choosing the `Value` variant from each column's declared
//! type so that assignment never mismatches the generated field type.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use sea_orm::sea_query::{ColumnType, Nullable};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, IdenStatic,
    IntoActiveModel, Iterable, ModelTrait, PrimaryKeyToColumn, PrimaryKeyTrait, Select, Value,
};
use serde_json::{Map, Value as Json};
use thiserror::Error;
use uuid::Uuid;

/// Attribute map used for mutating input. Key order is preserved.
pub type Attributes = Map<String, Json>;

/// Primary key value type of an entity.
pub type PrimaryKeyValue<E> = <<E as EntityTrait>::PrimaryKey as PrimaryKeyTrait>::ValueType;

/// Errors raised while turning attributes into column values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttributeError {
    #[error("unknown attribute `{attribute}` for table {table}")]
    UnknownAttribute { table: String, attribute: String },
    #[error("attribute `{attribute}` expects {expected}, got {actual}")]
    TypeMismatch {
        attribute: String,
        expected: &'static str,
        actual: String,
    },
    #[error("attribute `{attribute}` has unsupported column type {column_type}")]
    UnsupportedColumn {
        attribute: String,
        column_type: String,
    },
}

/// Table metadata and attribute conversion for entity `E`.
#[derive(Debug, Clone)]
pub struct ModelHandle<E: EntityTrait> {
    table: String,
    primary_key: Vec<E::Column>,
    columns: Vec<E::Column>,
}

impl<E: EntityTrait> Default for ModelHandle<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EntityTrait> ModelHandle<E> {
    /// Resolve table, key and column metadata for `E`.
    pub fn new() -> Self {
        Self {
            table: E::default().table_name().to_string(),
            primary_key: E::PrimaryKey::iter().map(|key| key.into_column()).collect(),
            columns: E::Column::iter().collect(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Name of the (first) primary key column.
    pub fn primary_key_name(&self) -> &str {
        self.primary_key
            .first()
            .map(|column| column.as_str())
            .unwrap_or("id")
    }

    /// The (first) primary key column.
    ///
    /// SeaORM entities always declare at least one primary key column.
    pub fn primary_key(&self) -> Option<E::Column> {
        self.primary_key.first().copied()
    }

    pub fn columns(&self) -> &[E::Column] {
        &self.columns
    }

    /// Look up a column by its database name.
    pub fn column(&self, name: &str) -> Option<E::Column> {
        self.columns.iter().copied().find(|column| column.as_str() == name)
    }

    /// A brand-new, unconstrained builder for this entity.
    pub fn query(&self) -> Select<E> {
        E::find()
    }

    /// `key = id` across every primary key column.
    pub fn key_condition<K>(&self, id: K) -> Condition
    where
        K: Into<PrimaryKeyValue<E>>,
    {
        use sea_orm::sea_query::IntoValueTuple;

        self.primary_key
            .iter()
            .zip(id.into().into_value_tuple())
            .fold(Condition::all(), |condition, (column, value)| {
                condition.add(column.eq(value))
            })
    }

    /// Convert one attribute into the value variant its column stores.
    pub fn column_value(&self, name: &str, value: Json) -> Result<(E::Column, Value), AttributeError> {
        let column = self
            .column(name)
            .ok_or_else(|| AttributeError::UnknownAttribute {
                table: self.table.clone(),
                attribute: name.to_string(),
            })?;
        let def = column.def();
        if value.is_null() && !def.is_null() {
            return Err(mismatch(name, "a non-null value", &value));
        }
        let value = convert(name, def.get_column_type(), value)?;
        Ok((column, value))
    }

    /// Read a field of a loaded record by column name.
    pub fn read(&self, record: &E::Model, name: &str) -> Option<Value> {
        self.column(name).map(|column| record.get(column))
    }
}

impl<E> ModelHandle<E>
where
    E: EntityTrait,
    E::ActiveModel: Send,
    E::Model: IntoActiveModel<E::ActiveModel> + Send + Sync,
{
    /// Build an active model holding only the given attributes.
    pub fn new_record(&self, attributes: Attributes) -> Result<E::ActiveModel, AttributeError> {
        let mut record = <E::ActiveModel as ActiveModelTrait>::default();
        self.assign(&mut record, attributes)?;
        Ok(record)
    }

    /// Write each attribute onto an active model.
    pub fn assign(
        &self,
        record: &mut E::ActiveModel,
        attributes: Attributes,
    ) -> Result<(), AttributeError> {
        for (name, value) in attributes {
            let (column, value) = self.column_value(&name, value)?;
            record.set(column, value);
        }
        Ok(())
    }

    /// Insert a new record and return it as persisted.
    pub async fn create<C>(&self, db: &C, record: E::ActiveModel) -> Result<E::Model, DbErr>
    where
        C: ConnectionTrait,
    {
        record.insert(db).await
    }

    /// Persist changes made to a loaded record.
    pub async fn save<C>(&self, db: &C, record: E::ActiveModel) -> Result<E::Model, DbErr>
    where
        C: ConnectionTrait,
    {
        record.update(db).await
    }

    /// Turn a loaded record into an active model ready for assignment.
    pub fn edit(&self, record: E::Model) -> E::ActiveModel {
        record.into_active_model()
    }
}

fn typed<T>(value: Option<T>) -> Value
where
    T: Into<Value> + Nullable,
{
    value.into()
}

fn mismatch(attribute: &str, expected: &'static str, actual: &Json) -> AttributeError {
    let actual = match actual {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    };
    AttributeError::TypeMismatch {
        attribute: attribute.to_string(),
        expected,
        actual: actual.to_string(),
    }
}

fn integer<T>(attribute: &str, value: &Json) -> Result<Option<T>, AttributeError>
where
    T: TryFrom<i64>,
{
    match value {
        Json::Null => Ok(None),
        Json::Number(number) => number
            .as_i64()
            .and_then(|n| T::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| mismatch(attribute, "an integer in range", value)),
        Json::String(text) => text
            .parse::<i64>()
            .ok()
            .and_then(|n| T::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| mismatch(attribute, "an integer in range", value)),
        _ => Err(mismatch(attribute, "an integer", value)),
    }
}

fn unsigned<T>(attribute: &str, value: &Json) -> Result<Option<T>, AttributeError>
where
    T: TryFrom<u64>,
{
    match value {
        Json::Null => Ok(None),
        Json::Number(number) => number
            .as_u64()
            .and_then(|n| T::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| mismatch(attribute, "an unsigned integer in range", value)),
        _ => Err(mismatch(attribute, "an unsigned integer", value)),
    }
}

fn float(attribute: &str, value: &Json) -> Result<Option<f64>, AttributeError> {
    match value {
        Json::Null => Ok(None),
        Json::Number(number) => number
            .as_f64()
            .map(Some)
            .ok_or_else(|| mismatch(attribute, "a number", value)),
        _ => Err(mismatch(attribute, "a number", value)),
    }
}

fn text(attribute: &str, value: &Json) -> Result<Option<String>, AttributeError> {
    match value {
        Json::Null => Ok(None),
        Json::String(text) => Ok(Some(text.clone())),
        Json::Number(number) => Ok(Some(number.to_string())),
        Json::Bool(flag) => Ok(Some(flag.to_string())),
        _ => Err(mismatch(attribute, "a string", value)),
    }
}

fn parsed<T, F>(attribute: &str, value: &Json, expected: &'static str, parse: F) -> Result<Option<T>, AttributeError>
where
    F: FnOnce(&str) -> Option<T>,
{
    match value {
        Json::Null => Ok(None),
        Json::String(raw) => parse(raw)
            .map(Some)
            .ok_or_else(|| mismatch(attribute, expected, value)),
        _ => Err(mismatch(attribute, expected, value)),
    }
}

fn convert(attribute: &str, column_type: &ColumnType, value: Json) -> Result<Value, AttributeError> {
    let converted = match column_type {
        ColumnType::Char(_) | ColumnType::String(_) | ColumnType::Text => {
            typed(text(attribute, &value)?)
        }
        ColumnType::TinyInteger => typed(integer::<i8>(attribute, &value)?),
        ColumnType::SmallInteger => typed(integer::<i16>(attribute, &value)?),
        ColumnType::Integer => typed(integer::<i32>(attribute, &value)?),
        ColumnType::BigInteger => typed(integer::<i64>(attribute, &value)?),
        ColumnType::TinyUnsigned => typed(unsigned::<u8>(attribute, &value)?),
        ColumnType::SmallUnsigned => typed(unsigned::<u16>(attribute, &value)?),
        ColumnType::Unsigned => typed(unsigned::<u32>(attribute, &value)?),
        ColumnType::BigUnsigned => typed(unsigned::<u64>(attribute, &value)?),
        ColumnType::Float => typed(float(attribute, &value)?.map(|n| n as f32)),
        ColumnType::Double => typed(float(attribute, &value)?),
        ColumnType::Boolean => match value {
            Json::Null => typed::<bool>(None),
            Json::Bool(flag) => typed(Some(flag)),
            Json::Number(ref number) if number.as_i64().is_some() => {
                typed(Some(number.as_i64() != Some(0)))
            }
            ref other => return Err(mismatch(attribute, "a boolean", other)),
        },
        ColumnType::Json | ColumnType::JsonBinary => match value {
            Json::Null => typed::<Json>(None),
            other => typed(Some(other)),
        },
        ColumnType::Uuid => typed(parsed(attribute, &value, "a UUID string", |raw| {
            Uuid::parse_str(raw).ok()
        })?),
        ColumnType::TimestampWithTimeZone => typed(parsed(
            attribute,
            &value,
            "an RFC 3339 timestamp",
            |raw| DateTime::<FixedOffset>::parse_from_rfc3339(raw).ok(),
        )?),
        ColumnType::Timestamp => typed(parsed(
            attribute,
            &value,
            "an RFC 3339 timestamp",
            |raw| {
                DateTime::parse_from_rfc3339(raw)
                    .ok()
                    .map(|stamp| stamp.with_timezone(&Utc))
            },
        )?),
        ColumnType::DateTime => typed(parsed(attribute, &value, "a date-time", |raw| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
                .ok()
        })?),
        ColumnType::Date => typed(parsed(attribute, &value, "a YYYY-MM-DD date", |raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
        })?),
        other => {
            return Err(AttributeError::UnsupportedColumn {
                attribute: attribute.to_string(),
                column_type: format!("{other:?}"),
            });
        }
    };
    Ok(converted)
}
