pub mod protocol;
pub mod receiver;
