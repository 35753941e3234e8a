pub mod broker;
pub mod fetch;
pub mod geo;
pub mod parser;
pub mod payload;
pub mod pipeline;
pub mod poller;
pub mod projector;
pub mod sink;
pub mod source;
pub mod stats;
pub mod telemetry;

#[cfg(test)]
mod testing;
