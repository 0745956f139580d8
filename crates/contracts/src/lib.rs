//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the output pipeline.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Data model
//! - [`Event`]: immutable record produced upstream, identified by its journal offset
//! - [`FilteredEvent`]: an event plus its resolved routing metadata
//! - [`Batch`]: the events collected between two flushes
//!
//! ## Collaborators
//! The dispatcher core only talks to the outside world through the traits
//! defined here: [`Output`], [`MessageOutput`], [`Journal`], [`Normalizer`],
//! [`ClusterHealth`], [`OutputStore`] and [`Clock`].

mod clock;
mod config;
mod error;
mod event;
mod health;
mod journal;
mod normalize;
mod sink;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::*;
pub use error::*;
pub use event::{Batch, Event, FilteredEvent, Offset};
pub use health::ClusterHealth;
pub use journal::Journal;
pub use normalize::{Normalizer, PassthroughNormalizer};
pub use sink::{MessageOutput, Output};
pub use store::OutputStore;
