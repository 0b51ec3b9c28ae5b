pub mod api;
pub mod app;
pub mod config;
pub mod runtime;
pub mod shell;
pub mod state;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;
