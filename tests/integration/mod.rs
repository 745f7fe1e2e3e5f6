//! Integration tests for the minivcs repository API

mod concurrency;
mod scenarios;
mod test_utils;
