pub mod archive;
pub mod commands;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod http;
pub mod process;
pub mod progress;
pub mod runtime;
pub mod source;
pub mod staging;
