pub mod cache;
pub mod check;
pub mod config;
pub mod devices;
pub mod init;
pub mod key;
pub mod scan;
pub mod serve;
