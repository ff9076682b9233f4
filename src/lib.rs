pub mod config;
pub mod errors;
pub mod facade;
pub mod ledger;
pub mod orchestrator;
pub mod payload;
pub mod providers;
pub mod recorder;
pub mod registry;
pub mod report;
pub mod ui;
