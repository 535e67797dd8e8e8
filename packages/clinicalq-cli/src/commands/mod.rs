pub mod init_config;
pub mod protocol;
pub mod run;
