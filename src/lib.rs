pub mod api;
pub mod catalog;
pub mod conf;
pub mod convert;
pub mod core;
pub mod export;
pub mod history;
pub mod join;
pub mod pipeline;
pub mod profile;
pub mod selection;
pub mod service;
pub mod source;

#[cfg(feature = "testutil")]
pub mod testutil;
