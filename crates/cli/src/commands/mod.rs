pub mod context;
pub mod init;
pub mod migrate;
pub mod seed;
