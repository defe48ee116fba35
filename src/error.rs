use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("Internal server error. Try again later")]
    InternalError(#[source] anyhow::Error),
    #[error("Page not found")]
    NotFound,
    #[error("Missing form parameter: {0}")]
    MissingParam(String),
    #[error("Invalid form parameter: {0}")]
    InvalidParam(#[source] ParseError),
    #[error("Too many requests")]
    TooManyRequests,
    #[error("Invalid admin token specified")]
    InvalidAdminToken,
    #[error("Admin functions are disabled on this server")]
    AdminOff,
}

impl ResponseError for UserError {
    fn status_code(&self) -> StatusCode {
        use UserError::*;
        match *self {
            InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            NotFound => StatusCode::NOT_FOUND,
            MissingParam(_) | InvalidParam(_) | AdminOff => StatusCode::BAD_REQUEST,
            InvalidAdminToken => StatusCode::UNAUTHORIZED,
            TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn error_response(&self) -> HttpResponse {
        use UserError::*;
        let mut req = HttpResponse::build(self.status_code());

        match self {
            NotFound => req
                .content_type("text/html; charset=utf-8")
                .body(include_str!("../static/404.html")),
            TooManyRequests => req
                .content_type("text/html; charset=utf-8")
                .body(include_str!("../static/limit.html")),
            InvalidParam(e) => req
                .content_type("text/plain; charset=utf-8")
                .body(format!("{}: {}", self, e)),
            other => req
                .content_type("text/plain; charset=utf-8")
                .body(format!("{}", other)),
        }
    }
}

impl From<askama::Error> for UserError {
    fn from(e: askama::Error) -> Self {
        UserError::InternalError(e.into())
    }
}

#[derive(Debug, Error, PartialEq)]
/// Error when parsing form parameters
pub enum ParseError {
    #[error("Error while parsing integer")]
    InvalidNumber(#[source] std::num::ParseIntError),
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("Text longer than {max} characters: {len}")]
    TooLong { max: usize, len: usize },
    #[error("Invalid ordering: {0}")]
    InvalidOrdering(String),
}

/// Any form parsing error is considered a bad request
impl From<ParseError> for UserError {
    fn from(e: ParseError) -> Self {
        UserError::InvalidParam(e)
    }
}
