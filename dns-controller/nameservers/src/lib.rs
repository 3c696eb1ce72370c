#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Nameserver publishers: subscribers that reconcile the registry's record
//! snapshots against the outside world.
//!
//! Each nameserver owns the set of records it has published. On every
//! snapshot it filters for the names it is responsible for and issues the
//! protocol operations for the difference: removals first so renames release
//! their names, then additions, then modifications.

mod diff;
mod multicast;
mod unicast;

pub use self::{multicast::MulticastNameserver, unicast::UnicastNameserver};
