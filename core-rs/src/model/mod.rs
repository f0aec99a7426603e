//! In-memory configuration model and its JSON documents

mod block;
mod configuration;
mod details;
mod group;
mod ioc;
mod meta;
pub mod schema;
pub mod validation;

pub use block::{Block, RunControlSpec};
pub use configuration::Configuration;
pub use details::ConfigDetails;
pub use group::{Group, NONE_GROUP};
pub use ioc::{Ioc, SimLevel};
pub use meta::ConfigMeta;
pub use schema::{DocumentKind, SchemaValidator, StructuralValidator};
