pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod simulator;
pub mod sql;
pub mod sweeper;
pub mod tls;
pub mod venue;
pub mod wal;
pub mod wire;
