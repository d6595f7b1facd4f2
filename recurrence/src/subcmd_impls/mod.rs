pub mod args;
mod config;
mod expand;
mod extract;
mod normalize;
mod utils;
mod verify;
