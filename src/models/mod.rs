//! Data and behaviours modelled as objects.

pub mod chapter;
pub mod manual;
pub mod revision;
pub mod snapshot;
pub mod user;

pub use self::{
    chapter::Chapter,
    manual::Manual,
    revision::Revision,
    snapshot::Snapshot,
    user::User,
};
