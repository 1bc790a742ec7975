pub mod ai;
pub mod archive;
pub mod backup;
pub mod config;
pub mod markup;
pub mod time;
pub mod translate;

pub use ai::retry::{FailureKind, RetryDecision, RetryPolicy, RetryState};
pub use ai::{
    AttemptFailure, ChatCompletionRequest, ChatCompletionResponse, ChatTransport, HttpTransport,
    TranslationClient, TranslationOutcome, UnitTranslator, FAILURE_MARKER,
};
pub use archive::{
    default_output_path, is_markup_entry, translate_archive, ArchiveError, ArchiveReport,
};
pub use config::{ConfigError, RetryOptions, TranslatorConfig};
pub use markup::{MarkupDocument, MarkupError, TranslationUnit};
pub use time::{NoopSleeper, Sleeper, TokioSleeper};
pub use translate::{DocumentReport, DocumentTranslator};
