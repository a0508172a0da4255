pub mod ratings;
pub mod tours;
pub mod users;
