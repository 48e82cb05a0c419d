mod backup_config;

pub use backup_config::BackupConfig;
