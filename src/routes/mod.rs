//! Route handlers: thin adapters from query strings / form bodies onto the
//! build session. Every handler returns a string (HTML fragment, JSON, or
//! plain text) for the Service Worker bridge.

pub mod build;
pub mod config;
pub mod skills;
