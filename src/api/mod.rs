pub mod chat;
pub mod database;
pub mod entity;
pub mod files;
pub mod system;
