pub mod clock;
pub mod models;
pub mod notifications;
pub mod refresh;
pub mod retry;
pub mod rules;
pub mod settings;
pub mod store;
