pub mod check;
pub mod config;
pub mod deck;
pub mod projects;
pub mod record;
pub mod snapshot;
pub mod themes;
