pub mod catalog;
pub mod enums;
pub mod role;
