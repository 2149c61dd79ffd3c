pub mod context;
pub mod error;
pub mod request;
pub mod spec;
