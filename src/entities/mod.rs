pub mod review;
pub mod tour;
pub mod user;
