// TEMPORARY, see diesel-rs/diesel#1787.
#![allow(proc_macro_derive_resolution_fallback)]

#[macro_use] extern crate bitflags;
#[macro_use] extern crate diesel;
#[macro_use] extern crate log;
#[macro_use] extern crate serde_derive;

#[cfg(not(debug_assertions))]
#[macro_use]
extern crate diesel_migrations;

pub use opsman_macros::*;
pub use self::api::ApiError;
pub use self::cli::main;

#[macro_use] mod macros;

pub mod api;
pub mod audit;
pub mod cli;
pub mod config;
pub mod db;
pub mod events;
pub mod history;
pub mod mail;
pub mod models;
pub mod permissions;
pub mod utils;

pub type Result<T, E=failure::Error> = std::result::Result<T, E>;
