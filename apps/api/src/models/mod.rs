pub mod club;
pub mod poster;
