//! Core domain types for Gleaner - no IO, no async.
//!
//! Everything the collection runtime agrees on lives here: the rooted error
//! hierarchy, parsed actions, item references and hydrated items, rules, and
//! filter criteria. Heavier concerns (glob compilation, HTML stripping,
//! persistence) live in the crates that own them.

mod action;
mod errors;
mod filter;
mod item;

pub use action::{Action, ActionKind, ActionParseError};
pub use errors::{Error, ErrorContext, ErrorKind, Result, Scope, SecurityKind};
pub use filter::FilterCriteria;
pub use item::{Attachment, HydratedItem, ItemRef, Rule, UpdatePolicy};
