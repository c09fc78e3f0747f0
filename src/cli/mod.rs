pub mod cancelled;
pub mod refresh;
pub mod search;
pub mod status;
