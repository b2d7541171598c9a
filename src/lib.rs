pub mod config;
pub mod controller;
pub mod messages;
pub mod motor;
pub mod pid;
pub mod runtime;
pub mod steering;
pub mod transport;
