use thiserror::Error;

pub type Result<T> = std::result::Result<T, PartsBotError>;

#[derive(Error, Debug)]
pub enum PartsBotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Crawler error: {0}")]
    Crawler(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod builder;
pub mod commands;
pub mod config;
pub mod crawler;
pub mod llm;
pub mod server;
pub mod store;
pub mod summarizer;
