pub mod command;
pub mod config;
pub mod error;
pub mod export;
pub mod image;
pub mod materialize;
pub mod metadata;
pub mod offset;
pub mod pipeline;
pub mod record;
pub mod restore;
pub mod source;
pub mod verify;

#[cfg(test)]
mod testing;
