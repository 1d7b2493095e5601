pub mod common;
pub mod network;
pub mod roles;
