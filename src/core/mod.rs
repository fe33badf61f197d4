pub mod agent_platform;
pub mod aggregator;
pub mod backoff;
#[cfg(test)]
pub(crate) mod canned_http;
pub mod config;
pub mod dashboard;
pub mod github;
pub mod poller;
pub mod prompts;
pub mod store;
pub mod structured;
pub mod terminal;
pub mod workflow;
