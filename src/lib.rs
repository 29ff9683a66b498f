// RPC vs HTTP performance comparison engine - library root

pub mod comparison;
pub mod config;
pub mod controller;
pub mod drivers;
pub mod error;
pub mod metrics;
pub mod mock_server;
pub mod models;
pub mod orchestrator;
pub mod payload;
pub mod registry;
pub mod report;
pub mod routes;
