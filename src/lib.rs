//! rust-route: a RIPv2-style distance-vector routing daemon.
//!
//! Each process owns one router: it reads a config file describing its
//! router-id, input ports and neighbours, then runs the RIP state
//! machine over loopback UDP sockets until killed.

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod manager;
pub mod table;
pub mod wire;
