use thiserror::Error;

// Enum for handling various application-level errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Dialogue error: {:#}", 0)]
    Dialogue(#[from] DialogueError), // Errors from the prompt/completion path.

    #[error("Slack error: {:#}", 0)]
    Slack(#[from] SlackError), // Errors from the chat transport.

    #[error("Sheet error: {:#}", 0)]
    Sheet(#[from] SheetError), // Errors from PDF fill/parse.

    #[error("Serialization error: {:#}", 0)]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {:#}", 0)]
    IO(#[from] std::io::Error),

    #[error("OpenAI API error: {:#}", 0)]
    OpenAI(#[from] async_openai::error::OpenAIError),

    #[error("Vector store error: {:#}", 0)]
    VectorStore(#[from] rig::vector_store::VectorStoreError),

    #[error("Embedding error: {:#}", 0)]
    Embed(#[from] rig::embeddings::EmbedError),

    #[error("Embedding generation error: {:#}", 0)]
    Embedding(#[from] rig::embeddings::EmbeddingError),

    #[error("Sqlite error: {:#}", 0)]
    Sqlite(#[from] tokio_rusqlite::Error),

    #[error("Missing configuration: {:#}", 0)]
    MissingConfig(String), // Fatal at startup, never recovered at runtime.

    #[error("Persona already claimed: {:#}", 0)]
    PersonaClaimed(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

// Errors from the Slack Web API and the Socket Mode connection.
#[derive(Debug, Error)]
pub enum SlackError {
    #[error("HTTP error: {:#}", 0)]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {:#}", 0)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Slack API returned error: {:#}", 0)]
    Api(String), // `ok: false` responses, carrying Slack's error code.

    #[error("Socket Mode closed the connection")]
    Disconnected,
}

// Errors from the dialogue engine. Callers always degrade these to a
// user-facing apology string; they never cross the event loop boundary.
#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("OpenAI API error: {:#}", 0)]
    OpenAI(#[from] async_openai::error::OpenAIError),

    #[error("Timeout occurred")]
    Timeout,

    #[error("No message found")]
    NoMessageFound,
}

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("PDF error: {:#}", 0)]
    Pdfium(#[from] pdfium_render::prelude::PdfiumError),

    #[error("Template not found: {:#}", 0)]
    TemplateNotFound(String),

    #[error("No form fields in document: {:#}", 0)]
    NoFormFields(String),
}
