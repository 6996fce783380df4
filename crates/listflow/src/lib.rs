pub mod api;
pub mod audience;
pub mod config;
pub mod db;
pub mod jobs;
pub mod mail;
pub mod render;
