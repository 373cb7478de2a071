pub mod config;
pub mod integrity;
pub mod loader;
pub mod navigator;
pub mod notifier;
pub mod progress;
pub mod puzzle;
pub mod session;
pub mod template;
