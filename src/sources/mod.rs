//! Access to the business data sources.
//!
//! Each source is an independent HTTP endpoint of the business API
//! (leads, partners, products, orders).

pub mod gateway;

pub use gateway::DataGateway;
