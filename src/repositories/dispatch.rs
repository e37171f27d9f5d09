//! Builder calls selected at runtime by name.
//!
//! Arguments arrive as JSON so that a call can be described by data (for
//! example a filter definition received over the wire). Column arguments
//! name database columns; values are converted to the column's declared type.

use sea_orm::{EntityTrait, Order, Value};
use serde_json::Value as Json;

use crate::error::{RepositoryError, RepositoryResult};
use crate::relay::Operator;

use super::Repository;

impl<E: EntityTrait> Repository<E> {
    /// Apply the builder call `method` to the live relay.
    ///
    /// Accepts `snake_case` or `camelCase` names. An unknown name yields
    /// [`RepositoryError::UndefinedMethod`]; arguments of the wrong shape yield
    /// [`RepositoryError::InvalidArgument`]. Neither touches the relay.
    pub fn call(&mut self, method: &str, args: &[Json]) -> RepositoryResult<&mut Self> {
        match snake_case(method).as_str() {
            "where" => {
                let (column, op, value) = self.comparison(method, args)?;
                Ok(self.where_op(column, op, value))
            }
            "or_where" => {
                let (column, op, value) = self.comparison(method, args)?;
                Ok(self.or_where_op(column, op, value))
            }
            "where_in" => {
                let (column, values) = self.value_list(method, args)?;
                Ok(self.where_in(column, values))
            }
            "where_not_in" => {
                let (column, values) = self.value_list(method, args)?;
                Ok(self.where_not_in(column, values))
            }
            "where_between" => {
                let (column, low, high) = self.range(method, args)?;
                Ok(self.where_between(column, low, high))
            }
            "where_not_between" => {
                let (column, low, high) = self.range(method, args)?;
                Ok(self.where_not_between(column, low, high))
            }
            "where_null" => {
                let column = self.single_column(method, args)?;
                Ok(self.where_null(column))
            }
            "where_not_null" => {
                let column = self.single_column(method, args)?;
                Ok(self.where_not_null(column))
            }
            "order_by" => {
                let (column, order) = match args {
                    [column] => (self.column(method, column)?, Order::Desc),
                    [column, direction] => {
                        (self.column(method, column)?, parse_direction(method, direction)?)
                    }
                    _ => return Err(arity(method, "1 or 2")),
                };
                Ok(self.order_by_with(column, order))
            }
            "group_by" => {
                let column = self.single_column(method, args)?;
                Ok(self.group_by(column))
            }
            "distinct" => match args {
                [] => Ok(self.distinct()),
                _ => Err(arity(method, "0")),
            },
            "skip" => {
                let offset = count(method, args)?;
                Ok(self.skip(offset))
            }
            "take" | "limit" => {
                let limit = count(method, args)?;
                Ok(self.take(limit))
            }
            "with" => {
                let relations = names(method, args)?;
                Ok(self.with(relations))
            }
            "without" => {
                let relations = names(method, args)?;
                Ok(self.without(relations))
            }
            _ => {
                tracing::warn!(repository = %self.name(), method, "Undefined repository method");
                Err(RepositoryError::undefined_method(self.name(), method))
            }
        }
    }

    fn column(&self, method: &str, arg: &Json) -> RepositoryResult<E::Column> {
        let name = arg
            .as_str()
            .ok_or_else(|| RepositoryError::invalid_argument(method, "column name must be a string"))?;
        self.model().column(name).ok_or_else(|| {
            RepositoryError::invalid_argument(
                method,
                format!("unknown column `{name}` on {}", self.model().table_name()),
            )
        })
    }

    fn single_column(&self, method: &str, args: &[Json]) -> RepositoryResult<E::Column> {
        match args {
            [column] => self.column(method, column),
            _ => Err(arity(method, "1")),
        }
    }

    fn typed(&self, method: &str, column: E::Column, value: &Json) -> RepositoryResult<Value> {
        use sea_orm::IdenStatic;

        self.model()
            .column_value(column.as_str(), value.clone())
            .map(|(_, value)| value)
            .map_err(|error| RepositoryError::invalid_argument(method, error.to_string()))
    }

    fn comparison(
        &self,
        method: &str,
        args: &[Json],
    ) -> RepositoryResult<(E::Column, Operator, Value)> {
        let (column, op, value) = match args {
            [column, value] => (column, Operator::Eq, value),
            [column, op, value] => (column, parse_operator(method, op)?, value),
            _ => return Err(arity(method, "2 or 3")),
        };
        let column = self.column(method, column)?;
        let value = match op {
            Operator::Like | Operator::NotLike => text_pattern(method, value)?,
            _ => self.typed(method, column, value)?,
        };
        Ok((column, op, value))
    }

    fn value_list(&self, method: &str, args: &[Json]) -> RepositoryResult<(E::Column, Vec<Value>)> {
        let [column, Json::Array(values)] = args else {
            return Err(arity(method, "a column and an array"));
        };
        let column = self.column(method, column)?;
        let values = values
            .iter()
            .map(|value| self.typed(method, column, value))
            .collect::<RepositoryResult<Vec<_>>>()?;
        Ok((column, values))
    }

    fn range(&self, method: &str, args: &[Json]) -> RepositoryResult<(E::Column, Value, Value)> {
        let (column, low, high) = match args {
            [column, low, high] => (column, low, high),
            [column, Json::Array(pair)] => match pair.as_slice() {
                [low, high] => (column, low, high),
                _ => return Err(RepositoryError::invalid_argument(method, "range needs exactly two bounds")),
            },
            _ => return Err(arity(method, "2 or 3")),
        };
        let column = self.column(method, column)?;
        Ok((
            column,
            self.typed(method, column, low)?,
            self.typed(method, column, high)?,
        ))
    }
}

fn arity(method: &str, expected: &str) -> RepositoryError {
    RepositoryError::invalid_argument(method, format!("expected {expected} argument(s)"))
}

fn parse_operator(method: &str, arg: &Json) -> RepositoryResult<Operator> {
    arg.as_str()
        .ok_or_else(|| RepositoryError::invalid_argument(method, "operator must be a string"))?
        .parse()
        .map_err(|error: crate::relay::UnknownOperator| {
            RepositoryError::invalid_argument(method, error.to_string())
        })
}

fn parse_direction(method: &str, arg: &Json) -> RepositoryResult<Order> {
    match arg.as_str().map(str::to_ascii_lowercase).as_deref() {
        Some("asc") => Ok(Order::Asc),
        Some("desc") => Ok(Order::Desc),
        _ => Err(RepositoryError::invalid_argument(method, "direction must be \"asc\" or \"desc\"")),
    }
}

fn text_pattern(method: &str, arg: &Json) -> RepositoryResult<Value> {
    arg.as_str()
        .map(|pattern| Value::from(pattern.to_string()))
        .ok_or_else(|| RepositoryError::invalid_argument(method, "pattern must be a string"))
}

fn count(method: &str, args: &[Json]) -> RepositoryResult<u64> {
    match args {
        [n] => n
            .as_u64()
            .ok_or_else(|| RepositoryError::invalid_argument(method, "expected a non-negative integer")),
        _ => Err(arity(method, "1")),
    }
}

fn names(method: &str, args: &[Json]) -> RepositoryResult<Vec<String>> {
    let items: &[Json] = match args {
        [Json::Array(items)] => items,
        items => items,
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| RepositoryError::invalid_argument(method, "relation names must be strings"))
        })
        .collect()
}

fn snake_case(method: &str) -> String {
    let mut name = String::with_capacity(method.len() + 4);
    for (i, c) in method.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                name.push('_');
            }
            name.push(c.to_ascii_lowercase());
        } else {
            name.push(c);
        }
    }
    name
}
