pub mod common;
mod database_tests;
mod store_tests;
