pub mod batcher;
pub mod config;
pub mod domain;
pub mod epmc;
pub mod error;
pub mod fs_util;
pub mod harvest;
pub mod input;
pub mod loader;
pub mod output;
pub mod reconcile;
pub mod store;
