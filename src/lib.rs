pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod loader;
pub mod output;
pub mod pixel;
pub mod resolver;
pub mod schema;
pub mod store;
