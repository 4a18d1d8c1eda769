pub mod attendance;
pub mod identity;
pub mod meal;
pub mod role;
pub mod user;
