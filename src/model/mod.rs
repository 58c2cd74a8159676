pub mod attendance;
pub mod role;
