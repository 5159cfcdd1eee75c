//! Script process and output stream tests.
