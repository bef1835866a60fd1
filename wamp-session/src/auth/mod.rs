pub mod auth_method;
pub mod credential;
pub mod wampcra;
