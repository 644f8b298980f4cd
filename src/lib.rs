//! modwatch keeps the programmable objects of many tenant databases under
//! observation: it snapshots stored procedures, views and user-defined
//! functions into a central repository, detects changes between scans,
//! compares any two targets and freezes named baselines.

pub mod baseline;
pub mod cli;
pub mod compare;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod model;
pub mod notify;
pub mod scan;
pub mod secrets;
pub mod settings;
pub mod sync;

pub use error::Error;
