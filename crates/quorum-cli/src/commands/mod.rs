pub mod cluster;
pub mod users;
