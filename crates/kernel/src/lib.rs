//! recordkit kernel library
//!
//! Generic, typed data access over relational storage: a filter/sort/
//! pagination request model, a query composer, a repository and a
//! controller layer. The `recordkit` binary drives it from the command
//! line.

pub mod config;
pub mod controller;
pub mod db;
pub mod error;
pub mod factory;
pub mod models;
pub mod query;
pub mod repository;
pub mod session;
pub mod storage;
