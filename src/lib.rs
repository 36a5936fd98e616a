// Library for tests to access modules

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod delivery;
pub mod docker_repo;
pub mod history_repo;
pub mod models;
pub mod pipeline;
pub mod sources;
pub mod sysinfo_repo;
pub mod systemd_repo;
pub mod version;
pub mod worker;
