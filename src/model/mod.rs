pub mod config;
pub mod pitch;
pub mod quantize;
pub mod song;
pub mod token;
pub mod vocab;
