pub mod credential;
pub mod memo;
