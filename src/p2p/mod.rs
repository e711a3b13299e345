pub mod communicator;
pub mod error;
pub mod message;
pub mod monitor;
pub mod peer;
pub mod processor;
pub mod storage;
pub mod transport;
