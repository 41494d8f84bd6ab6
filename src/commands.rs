pub mod console;
pub mod cron;
pub mod migrate;
pub mod serve;
pub mod version;
