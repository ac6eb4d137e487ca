pub mod common;
mod framework;
