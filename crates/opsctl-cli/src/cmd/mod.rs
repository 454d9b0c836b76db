pub mod actions;
pub mod config;
pub mod init;
pub mod run;
pub mod serve;
