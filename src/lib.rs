//! Shoplite — demo storefront backend
//!
//! Backend of a small demo shop used as a training target for web security
//! scanners. The storefront UI, auth issuance and admin tooling live
//! elsewhere; this crate owns the parts with real bookkeeping:
//!
//! - atomic checkout: inventory reservation, totals, order persistence
//! - runtime schema introspection for drifted order relations
//! - order history with legacy total reconstruction
//! - sales reporting over historical line items

pub mod api;
pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod orders;
pub mod sales;
pub mod schema;
