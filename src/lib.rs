pub mod certification;
pub mod effector;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod request;
pub mod utils;
pub mod workflow;
