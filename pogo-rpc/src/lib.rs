/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

//! The gRPC wire protocol (spec.md §6.1): generated `tonic`/`prost` message
//! and service types, plus [`PogoHandler`], the adapter from the generated
//! `Pogo` service trait onto [`changeengine::ChangeEngine`] and
//! [`gc::GarbageCollector`].

pub mod pogo {
    pub mod v1 {
        tonic::include_proto!("pogo.v1");
    }
}

mod auth;
mod convert;
mod service;

pub use auth::AuthResolver;
pub use pogo::v1::pogo_server::{Pogo, PogoServer};
pub use service::PogoHandler;
