pub mod catalog;
pub mod config;
pub mod error;
pub mod inputs;
pub mod ledger;
pub mod output;
pub mod plan;
pub mod recognition;
pub mod solver;
pub mod strategy;
