pub mod router;
pub mod scripted;
pub mod session;
pub mod setup;
