pub mod app;
pub mod cli;
pub mod config;
pub mod editor;
pub mod legacy;
pub mod model;
pub mod ordering;
pub mod reader;
pub mod search;
pub mod smartlinks;
pub mod storage;
pub mod store;
pub mod sync;
pub mod text;
pub mod timeline;
pub mod ui;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
