pub mod attendance;
pub mod submission;
