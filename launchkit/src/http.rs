//! This module provides various HTTP(S) request utilities, everything is based on 
//! async reqwest with tokio.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};


/// The user agent to be used on each HTTP request.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Get a new client builder for async HTTP(S) requests.
pub fn builder() -> ClientBuilder {
    Client::builder().user_agent(USER_AGENT)
}

/// Build a client with the given optional timeout applied to both the connection and
/// the whole request, a client is built on each call because it's bound to the 
/// runtime that first uses it.
pub fn client(timeout: Option<Duration>) -> reqwest::Result<Client> {
    let mut builder = builder();
    if let Some(timeout) = timeout {
        builder = builder
            .connect_timeout(timeout)
            .timeout(timeout);
    }
    builder.build()
}
