#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

pub mod cli;
pub mod config;
pub mod core;
pub mod prelude;
pub mod quantity;
pub mod rebuild;
pub mod recorder;
pub mod tables;
