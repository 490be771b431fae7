//! Handling of events and notifications.

use failure::Fail;

mod events;
mod service;

pub use self::{
    events::*,
    service::{EventManager, Notify},
};

#[derive(Debug, Fail)]
pub enum Error {
    /// Error communicating with the database.
    #[fail(display = "{}", _0)]
    Database(#[cause] diesel::result::Error),
    /// Error obtaining a database connection from the pool.
    #[fail(display = "{}", _0)]
    DbPool(#[cause] r2d2::Error),
    /// Error serializing an event payload.
    #[fail(display = "{}", _0)]
    Serialization(#[cause] rmps::encode::Error),
    /// Error deserializing an event payload.
    #[fail(display = "{}", _0)]
    Deserialization(#[cause] rmps::decode::Error),
    /// Stored event has a kind this version doesn't know.
    #[fail(display = "unknown event kind {:?}", _0)]
    UnknownEvent(String),
}

impl_from! { for Error ;
    diesel::result::Error => |e| Error::Database(e),
    r2d2::Error => |e| Error::DbPool(e),
    rmps::encode::Error => |e| Error::Serialization(e),
    rmps::decode::Error => |e| Error::Deserialization(e),
}
