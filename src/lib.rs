pub mod db;
pub mod detection;
pub mod device;
pub mod server;
pub mod services;
pub mod version;
pub mod web;
