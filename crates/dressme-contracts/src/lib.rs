pub mod chat;
pub mod credentials;
pub mod events;
pub mod jobs;
pub mod media;
pub mod models;
