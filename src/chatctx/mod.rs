pub mod audit;
pub mod bridge;
pub mod config;
pub mod inference;
pub mod paths;
pub mod session_store;
pub mod util;
