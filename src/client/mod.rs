pub mod query_engine;
pub mod transport;
pub mod tx_manager;
