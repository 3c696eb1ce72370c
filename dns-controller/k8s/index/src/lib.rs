#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Keeps track of `Gateway`, `HTTPRoute`, and `Ingress` resources and joins
//! them into the set of DNS records the nameserver publishers advertise.
//!
//! The `Index` type exposes `Index::subscribe`, which is used by the
//! publishers to observe record snapshots. Otherwise, it implements
//! `kubert::index::IndexNamespacedResource` for the watched resource kinds.

mod gateway;
mod index;
mod ingress;
mod route;


pub use self::{
    gateway::{Gateway, Listener},
    index::{Index, SharedIndex},
    ingress::Ingress,
    route::{InvalidRoute, ParentRef, Route},
};
