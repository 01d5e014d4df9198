pub mod backtest;
pub mod binance;
pub mod commands;
pub mod config;
pub mod entry;
pub mod models;
pub mod retry;
pub mod runner;
pub mod summary;
pub mod symbols;
pub mod timeframe;
