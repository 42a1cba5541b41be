//! Job handlers available to pipeline stages.

pub mod command;
pub mod subprocess;

pub use command::CommandHandler;
