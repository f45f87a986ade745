pub mod acme;
pub mod batch;
pub mod config;
pub mod issue;
pub mod output;
pub mod renewal;
pub mod store;
pub mod tls;

pub use config::Config;
