//! PostgreSQL backend tests

pub mod pg_backends_test;
