pub mod api;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod lock;
pub mod model;
pub mod observability;
pub mod timeparse;
pub mod wal;
pub mod wire;
