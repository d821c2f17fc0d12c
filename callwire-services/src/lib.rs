//! Demo services served over callwire: greetings, arithmetic and a blog
//! record store.

use std::sync::Arc;

use callwire::RpcRouter;

pub mod blog;
pub mod calculator;
pub mod config;
pub mod greet;

pub use config::{AppConfig, ConfigError};

/// Routers for every service, with the blog backed by `store`.
pub fn routers<S: blog::DocumentStore>(config: &AppConfig, store: Arc<S>) -> Vec<RpcRouter> {
    vec![
        greet::GreetService::new()
            .with_repetitions(config.greet_repetitions)
            .router(),
        calculator::router(),
        blog::BlogService::new(store).router(),
    ]
}
