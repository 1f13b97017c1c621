// src/lib.rs

pub mod agent;
pub mod chat;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod protocol;
pub mod terminal;
