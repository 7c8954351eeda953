pub mod api_server;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod reporting;

#[cfg(test)]
mod test_support;
