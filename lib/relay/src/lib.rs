//! Transport layer for the lockstep mesh: in-memory byte buffers, framed
//! nonblocking stream connections and the readiness selector they hang off.

#![allow(clippy::new_without_default)]

pub mod buffer;
pub mod connection;
pub mod selector;
pub mod stream;
pub mod support;
