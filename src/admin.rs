use crate::db::{self, DbPool};
use crate::error::{ParseError, UserError};
use crate::polls::check_text;
use crate::rate::LimitStore;
use crate::templates::{QuestionListTemplate, QuestionRow, ReturnTemplate};
use crate::util;
use askama::Template;
use chrono::Utc;
use serde::Deserialize;

use actix_web::{web, HttpResponse, Result};

/// Token guarding the admin actions, `None` turns them off
pub struct AdminToken(pub Option<String>);

/// Admin actions that can be executed on the server through
/// the admin page provided that the user knows the POLL_ADMIN_TOKEN.
#[derive(Deserialize, Debug, Clone, Copy)]
pub enum AdminAction {
    /// Lists all questions, future ones included.
    ListQuestions,
    /// Adds a question. Needs `question_text`, takes an optional `pub_date`.
    AddQuestion,
    /// Adds a choice to a question. Needs `question_id` and `choice_text`.
    AddChoice,
    /// Resets all votes on a question. Needs `question_id`.
    ResetVotes,
    /// Removes a question and its choices. Needs `question_id`.
    DeleteQuestion,
    /// Removes all entries currently in the database.
    PurgeDatabase,
    /// Empties the vote limit store.
    ResetLimits,
}

/// Orderings of the admin question list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionOrder {
    PubDate { descending: bool },
    ChoicesCount { descending: bool },
}

impl Default for QuestionOrder {
    fn default() -> Self {
        QuestionOrder::PubDate { descending: true }
    }
}

impl QuestionOrder {
    /// Parses `pub_date` / `choices_count`, with a leading `-` for descending order
    pub fn try_parse(s: &str) -> Result<Self, ParseError> {
        let (descending, field) = match s.strip_prefix('-') {
            Some(field) => (true, field),
            None => (false, s),
        };
        match field {
            "pub_date" => Ok(QuestionOrder::PubDate { descending }),
            "choices_count" => Ok(QuestionOrder::ChoicesCount { descending }),
            _ => Err(ParseError::InvalidOrdering(s.to_string())),
        }
    }

    /// Sorts rows; ties keep the most recent question first
    pub fn sort(&self, rows: &mut [QuestionRow]) {
        rows.sort_by(|a, b| {
            let by_date = a.question.pub_date.cmp(&b.question.pub_date);
            match *self {
                QuestionOrder::PubDate { descending: false } => by_date,
                QuestionOrder::PubDate { descending: true } => by_date.reverse(),
                QuestionOrder::ChoicesCount { descending } => {
                    let by_count = a.choices_count.cmp(&b.choices_count);
                    let by_count = if descending { by_count.reverse() } else { by_count };
                    by_count.then(by_date.reverse())
                }
            }
        });
    }
}

impl std::fmt::Display for QuestionOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (descending, field) = match *self {
            QuestionOrder::PubDate { descending } => (descending, "pub_date"),
            QuestionOrder::ChoicesCount { descending } => (descending, "choices_count"),
        };
        f.write_fmt(format_args!(
            "{}{}",
            if descending { "-" } else { "" },
            field
        ))
    }
}

#[derive(Deserialize)]
pub struct AdminParams {
    token: String,
    action: AdminAction,
    order: Option<String>,
    question_id: Option<String>,
    question_text: Option<String>,
    pub_date: Option<String>,
    choice_text: Option<String>,
}

impl AdminParams {
    /// A form field that has to be present and non-empty
    fn required<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str, UserError> {
        field
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| UserError::MissingParam(name.to_string()))
    }

    /// A form field that may be left empty
    fn optional(field: &Option<String>) -> Option<&str> {
        field.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    fn question_id(&self) -> Result<i64, UserError> {
        Self::required(&self.question_id, "question_id")?
            .parse()
            .map_err(|e| ParseError::InvalidNumber(e).into())
    }
}

/// Handles the administration webpage
pub async fn handle_admin() -> Result<HttpResponse> {
    return_html!(include_str!("../static/admin.html"))
}

/// Handles the administration webpage callback
/// Params:
///  - token: The admin token, should match the POLL_ADMIN_TOKEN environmental variable
///  - action: an AdminAction enum member, specifies the action to be executed.
///  - the fields the action needs, see AdminAction
pub async fn handle_admin_action(
    db: web::Data<DbPool>,
    params: web::Form<AdminParams>,
    limits: web::Data<LimitStore>,
    admin_token: web::Data<AdminToken>,
) -> Result<HttpResponse> {
    match admin_token.0.as_ref() {
        None => return Err(UserError::AdminOff.into()),
        Some(t) if t != params.token.as_str() => {
            log::warn!("Invalid admin token for action {:?}", params.action);
            return Err(UserError::InvalidAdminToken.into());
        }
        _ => (),
    }

    match params.action {
        AdminAction::ListQuestions => {
            let order = match AdminParams::optional(&params.order) {
                Some(o) => QuestionOrder::try_parse(o).map_err(UserError::from)?,
                None => QuestionOrder::default(),
            };
            return list_questions(&db, order).await;
        }
        AdminAction::AddQuestion => {
            let text = check_text(AdminParams::required(&params.question_text, "question_text")?)
                .map_err(UserError::from)?;
            let pub_date = match AdminParams::optional(&params.pub_date) {
                Some(d) => util::parse_form_timestamp(d).map_err(UserError::from)?,
                None => Utc::now(),
            };
            let question = db::insert_question(&db, text, pub_date).await?;
            log::info!("Question {} added, published {}", question.id, pub_date);
            let detail = format!("/polls/{}/", question.id);
            return executed(
                &format!("Question added: {}", question.question_text),
                &[("Question page", detail.as_str())],
            );
        }
        AdminAction::AddChoice => {
            let question_id = params.question_id()?;
            let text = check_text(AdminParams::required(&params.choice_text, "choice_text")?)
                .map_err(UserError::from)?;
            let choice = db::insert_choice(&db, question_id, text).await?;
            log::info!("Choice {} added to question {}", choice.id, question_id);
        }
        AdminAction::ResetVotes => {
            let question_id = params.question_id()?;
            // Fails for unknown questions
            db::get_question(&db, question_id).await?;
            let n = db::reset_votes(&db, question_id).await?;
            log::warn!("Votes reset on {} choice(s) of question {}", n, question_id);
        }
        AdminAction::DeleteQuestion => {
            let question_id = params.question_id()?;
            if !db::delete_question(&db, question_id).await? {
                return Err(db::Error::NoSuchQuestion.into());
            }
            log::warn!("Question {} deleted", question_id);
        }
        AdminAction::PurgeDatabase => {
            let r = db::purge(&db).await?;
            log::warn!("Database purged: {} question(s) deleted!", r);
        }
        AdminAction::ResetLimits => {
            limits.reset();
            log::warn!("Limits reset!");
        }
    }

    executed(&format!("Action executed: {:?}", params.action), &[])
}

/// Renders the question list with the computed "Published recently"
/// and "Number of Choices" columns
async fn list_questions(db: &DbPool, order: QuestionOrder) -> Result<HttpResponse> {
    let mut rows = Vec::new();
    for question in db::all_questions(db).await? {
        rows.push(QuestionRow {
            was_published_recently: question.was_published_recently(),
            choices_count: db::choices_count(db, question.id).await?,
            question,
        });
    }
    order.sort(&mut rows);

    let content = QuestionListTemplate {
        rows: &rows,
        order: &order.to_string(),
    }
    .render()
    .map_err(UserError::from)?;

    return_html!(content)
}

fn executed(heading: &str, links: &[(&str, &str)]) -> Result<HttpResponse> {
    let mut all_links = vec![("Back to admin", "/admin"), ("Polls", "/polls/")];
    all_links.extend_from_slice(links);
    let content = ReturnTemplate {
        heading,
        links: &all_links,
    }
    .render()
    .map_err(UserError::from)?;

    return_html!(content)
}
