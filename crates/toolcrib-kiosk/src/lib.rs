pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod page;
pub mod poller;
pub mod resolver;
pub mod routes;
pub mod selection;
pub mod submitter;
pub mod text;
pub mod ui;
pub mod workflow;

pub use error::{Error, Failure, Result};
