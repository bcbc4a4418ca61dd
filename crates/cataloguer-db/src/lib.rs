//! Cataloguer Database Library
//!
//! Single-table persistence for the catalogue service: the index layout, the
//! key-value stores behind it, the paginated query engine, the transactional
//! write coordinator and the repositories built on top of them.

pub mod db;

pub use db::*;
