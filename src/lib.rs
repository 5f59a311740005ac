//! Service Supervisor - run one service command and control it over HTTP.

pub mod commands;
pub mod config;
pub mod display;
pub mod reception;
pub mod service;
pub mod signal;
