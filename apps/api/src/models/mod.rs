pub mod billing;
pub mod job;
pub mod proposal;
pub mod user;
