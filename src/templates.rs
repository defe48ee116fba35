use askama::Template;

use crate::polls::{Choice, Question};

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate<'a> {
    pub latest_question_list: &'a [Question],
}

#[derive(Template)]
#[template(path = "detail.html")]
pub struct DetailTemplate<'a> {
    pub question: &'a Question,
    pub choices: &'a [Choice],
    /// Shown above the choices when a vote could not be registered
    pub error_message: Option<&'a str>,
}

#[derive(Template)]
#[template(path = "results.html")]
pub struct ResultsTemplate<'a> {
    pub question: &'a Question,
    pub choices: &'a [Choice],
}

/// A row of the admin question list
pub struct QuestionRow {
    pub question: Question,
    pub was_published_recently: bool,
    pub choices_count: usize,
}

#[derive(Template)]
#[template(path = "question_list.html")]
pub struct QuestionListTemplate<'a> {
    pub rows: &'a [QuestionRow],
    pub order: &'a str,
}

/// Confirmation page: a heading and a list of (name, link) pairs
#[derive(Template)]
#[template(path = "return.html")]
pub struct ReturnTemplate<'a> {
    pub heading: &'a str,
    pub links: &'a [(&'a str, &'a str)],
}
