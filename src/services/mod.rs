pub mod accounts;
pub mod auth;
pub mod booking;
pub mod credentials;
pub mod directory;
pub mod input;
