pub mod extract;
pub mod jwt;
pub mod mail;
pub mod password;
pub mod slug;
pub mod upload;
