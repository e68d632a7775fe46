pub mod functions;
pub mod generate;
pub mod init;
pub mod stats;
