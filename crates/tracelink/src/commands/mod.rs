//! Command implementations that operate on the workspace directory.

pub mod init;
