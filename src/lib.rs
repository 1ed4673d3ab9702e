pub mod commands;
pub mod engine;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod optimizer;
pub mod param_utils;
pub mod performance;
pub mod portfolio;
pub mod provider;
pub mod strategy;
pub mod validator;
