// src/error.rs
//! Taksonomia błędów silnika moderacji.
//!
//! Żaden z tych błędów nie jest fatalny dla procesu po starcie: wołający loguje i idzie dalej
//! (detektory traktują błąd jak "brak interwencji", scheduler robi backoff).

use thiserror::Error;

/// Zła konfiguracja (czas/godziny ciszy nocnej, URL-e itp.).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid time of day `{0}` (expected HH:MM, HH.MM or 24:00)")]
    InvalidTime(String),
    #[error("curfew duration must be within 1..=24 hours, got {0}")]
    DurationOutOfRange(i64),
    #[error("invalid url for `{field}`: {reason}")]
    InvalidUrl { field: &'static str, reason: String },
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Błędy warstwy OneBot (akcje wychodzące).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("platform transport unavailable")]
    Unavailable,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api call `{action}` failed (retcode {retcode}): {message}")]
    Api {
        action: &'static str,
        retcode: i64,
        message: String,
    },
    #[error("cannot decode `{action}` response: {reason}")]
    Decode {
        action: &'static str,
        reason: String,
    },
}

/// Błędy klasyfikatora tekstu (LLM).
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier unavailable")]
    Unavailable,
    #[error("classifier rate limited")]
    RateLimited,
    #[error("classifier http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("classifier returned an empty answer")]
    EmptyAnswer,
}

/// Błędy magazynu duplikatów.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupted record: {0}")]
    Corrupted(String),
}
