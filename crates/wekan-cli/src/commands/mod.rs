pub mod config;
pub mod login;
pub mod shell;
pub mod utils;
