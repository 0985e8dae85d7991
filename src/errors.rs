use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Input validation failure; no book mutation occurred.
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("no order book found for {0}")]
    BookNotFound(String),

    #[error("order {0} not found")]
    OrderNotFound(Uuid),
}
