//! Clients for remote services.

pub mod hub;
