//! Account module
//!
//! Login, registration, profile refresh and logout on top of the REST client.

mod service;

pub use service::Account;
