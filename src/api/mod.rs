//! REST route definitions
//!
//! The primary API is GraphQL at /graphql. Only operational endpoints live here.

pub mod health;
