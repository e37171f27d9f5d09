//! # Repository Layer
//!
//! This module contains the generic [`Repository`] facade: named CRUD, read and
//! aggregate operations over one SeaORM entity, with builder calls forwarded to
//! a live [`crate::relay::QueryRelay`].

mod base;
mod dispatch;

pub use base::{DEFAULT_MAX_PER_PAGE, DEFAULT_PER_PAGE, Repository};
