//! Core data model for dsunit
//!
//! Values, records and datasets, datastore registration metadata, the
//! request/response contract, and the connection traits implemented by
//! `dsunit-db`.

pub mod dataset;
pub mod descriptor;
pub mod request;
pub mod response;
pub mod store;
pub mod value;

pub use dataset::*;
pub use descriptor::*;
pub use request::*;
pub use response::*;
pub use store::*;
pub use value::*;
