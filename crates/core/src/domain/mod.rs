pub mod action_log;
pub mod automation;
pub mod contact;
pub mod integration;
pub mod send;
