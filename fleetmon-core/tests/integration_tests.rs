//! Integration tests for the fleetmon core library
//!
//! End-to-end flows over the scripted transport: registration,
//! platform detection, batch collection, backoff gating, and shutdown.

#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]

mod integration;
