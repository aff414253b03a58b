pub mod assistant;
pub mod chat;
pub mod config;
pub mod errors;
pub mod git;
pub mod llm;
pub mod logging;
pub mod router;
pub mod server;
pub mod site;
pub mod util;
pub mod workflow;
