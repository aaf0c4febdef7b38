//! Medical note workflows exposed over HTTP.

mod service;
mod types;

pub use service::{NotesApi, NotesService, ServiceSettings};
pub use types::{
    Condition, ExtractionError, InitError, QuestionResponse, ServiceError, StructuredExtraction,
    SummarizationResponse,
};
