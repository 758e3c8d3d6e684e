pub mod clipboard;
pub mod dispatcher;
pub mod input;
pub mod keys;

pub use dispatcher::Providers;
