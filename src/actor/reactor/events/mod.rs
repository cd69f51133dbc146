pub mod message;
pub mod window;
