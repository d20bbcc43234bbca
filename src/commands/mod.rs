pub mod help;
pub mod message;
pub mod ping;
pub mod relog;
pub mod setup;
