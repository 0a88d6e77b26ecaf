//! Request / response bodies of the JSON endpoints.

pub mod diagnostics;
pub mod health;
pub mod session;
