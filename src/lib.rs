//! # Relay Repository Library
//!
//! A generic repository layer over SeaORM. Builder calls accumulate on a
//! [`relay::QueryRelay`] owned by each [`repositories::Repository`]; named
//! operations execute it, map failures onto [`error::RepositoryError`], and
//! leave a fresh relay behind.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod model;
pub mod pagination;
pub mod relay;
pub mod repositories;
pub mod telemetry;

pub use error::{RepositoryError, RepositoryResult};
pub use events::{EventBus, LifecycleEvent, LifecycleHandler, RepositoryEvent};
pub use model::{Attributes, ModelHandle};
pub use pagination::Page;
pub use relay::{Operator, QueryMagic, QueryRelay};
pub use repositories::Repository;
