pub mod cancel;
pub mod error;
pub mod fetch;
pub mod framework;
pub mod package;
pub mod registration;
pub mod resolver;
pub mod source;
pub mod version;
#[cfg(test)]
pub mod tests;
