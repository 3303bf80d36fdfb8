pub mod access;
pub mod commands;
pub mod documents;
pub mod media;
pub mod responses;
