pub mod aggregate;
pub mod config;
pub mod error;
pub mod fetch;
pub mod identity;
pub mod logging;
pub mod normalize;
pub mod output;
pub mod records;
pub mod store;
