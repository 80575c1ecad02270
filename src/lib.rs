pub mod catalog;
pub mod config;
pub mod credit;
pub mod engine;
pub mod error;
pub mod graph;
pub mod history;
pub mod interval;
pub mod logging;
pub mod mastery;
pub mod recommend;
pub mod service;
pub mod store;
pub mod tags;

pub use error::{Error, Result};
