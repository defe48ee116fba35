use actix_web::{http::header, web, HttpRequest, HttpResponse, Result};
use askama::Template;
use chrono::Utc;
use serde::Deserialize;

use crate::db::{self, DbPool};
use crate::error::UserError;
use crate::polls::Question;
use crate::rate::{self, LimitStore};
use crate::templates::{DetailTemplate, IndexTemplate, ResultsTemplate};

const NO_CHOICE_SELECTED: &str = "You didn't select a choice.";

/// Redirects the bare site root to the poll index
pub async fn root() -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, "/polls/"))
        .finish()
}

/// Lists published questions, most recent first
pub async fn index(db: web::Data<DbPool>) -> Result<HttpResponse> {
    let questions = db::published_questions(&db, Utc::now()).await?;
    let content = IndexTemplate {
        latest_question_list: &questions,
    }
    .render()
    .map_err(UserError::from)?;

    return_html!(content)
}

/// Shows a published question with a form for voting on its choices
pub async fn detail(db: web::Data<DbPool>, question_id: web::Path<i64>) -> Result<HttpResponse> {
    let question = db::published_question(&db, *question_id, Utc::now()).await?;
    render_detail(&db, &question, None).await
}

async fn render_detail(
    db: &DbPool,
    question: &Question,
    error_message: Option<&str>,
) -> Result<HttpResponse> {
    let choices = db::choices_of(db, question.id).await?;
    let content = DetailTemplate {
        question,
        choices: &choices,
        error_message,
    }
    .render()
    .map_err(UserError::from)?;

    return_html!(content)
}

/// Shows the votes of every choice of a published question
pub async fn results(db: web::Data<DbPool>, question_id: web::Path<i64>) -> Result<HttpResponse> {
    let question = db::published_question(&db, *question_id, Utc::now()).await?;
    let choices = db::choices_of(&db, question.id).await?;
    let content = ResultsTemplate {
        question: &question,
        choices: &choices,
    }
    .render()
    .map_err(UserError::from)?;

    return_html!(content)
}

#[derive(Deserialize)]
pub struct VoteForm {
    choice: Option<String>,
}

/// Handles the voting form callback
/// Params:
///  - choice: id of one of the question's choices
/// Redirects to the results page on success, re-renders the voting form
/// with an error message if no valid choice was selected.
pub async fn vote(
    req: HttpRequest,
    db: web::Data<DbPool>,
    limits: web::Data<LimitStore>,
    question_id: web::Path<i64>,
    form: web::Form<VoteForm>,
) -> Result<HttpResponse> {
    let question = db::published_question(&db, *question_id, Utc::now()).await?;

    let choice_id = match form.choice.as_deref().map(str::parse::<i64>) {
        Some(Ok(id)) => id,
        _ => return render_detail(&db, &question, Some(NO_CHOICE_SELECTED)).await,
    };

    let addr = rate::vote_addr(&req);
    if let Some(addr) = addr {
        if limits.is_limited(addr, question.id) {
            return Err(UserError::TooManyRequests.into());
        }
    }

    if !db::vote(&db, question.id, choice_id).await? {
        return render_detail(&db, &question, Some(NO_CHOICE_SELECTED)).await;
    }
    if let Some(addr) = addr {
        limits.record_vote(addr, question.id);
    }
    log::debug!("Vote for choice {} of question {}", choice_id, question.id);

    let location = req
        .url_for("results", [question.id.to_string()])
        .map_err(|e| UserError::InternalError(anyhow::anyhow!("{}", e)))?;

    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, location.as_str()))
        .finish())
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::admin::AdminToken;
    use crate::db::tests::{create_question, test_pool};
    use actix_web::{
        body::MessageBody,
        dev::{ServiceFactory, ServiceRequest, ServiceResponse},
        http::StatusCode,
        test, App,
    };

    pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";

    /// The site with an admin token and no vote limits in front of a test database
    pub fn test_app(
        pool: &DbPool,
    ) -> App<
        impl ServiceFactory<
            ServiceRequest,
            Config = (),
            Response = ServiceResponse<impl MessageBody>,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(LimitStore::default()))
            .app_data(web::Data::new(AdminToken(Some(
                TEST_ADMIN_TOKEN.to_string(),
            ))))
            .configure(crate::app_config)
    }

    async fn get_page(pool: &DbPool, uri: &str) -> (StatusCode, String) {
        let app = test::init_service(test_app(pool)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        let status = resp.status();
        let body = test::read_body(resp).await;
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[actix_web::test]
    async fn no_questions() {
        let pool = test_pool();
        let (status, body) = get_page(&pool, "/polls/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("No polls are available."));
    }

    #[actix_web::test]
    async fn past_question_is_listed() {
        let pool = test_pool();
        let q = create_question(&pool, "Past question", -30).await;
        let (status, body) = get_page(&pool, "/polls/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Past question"));
        assert!(body.contains(&format!("/polls/{}/", q.id)));
        assert!(!body.contains("No polls are available."));
    }

    #[actix_web::test]
    async fn future_question_is_not_listed() {
        let pool = test_pool();
        create_question(&pool, "Future question", 30).await;
        let (_, body) = get_page(&pool, "/polls/").await;
        assert!(body.contains("No polls are available."));
        assert!(!body.contains("Future question"));
    }

    #[actix_web::test]
    async fn past_and_future_questions() {
        let pool = test_pool();
        create_question(&pool, "Past question", -30).await;
        create_question(&pool, "Future question", 30).await;
        let (_, body) = get_page(&pool, "/polls/").await;
        assert_eq!(db::count_questions(&pool).await.unwrap(), 2);
        assert!(body.contains("Past question"));
        assert!(!body.contains("Future question"));
    }

    #[actix_web::test]
    async fn two_past_questions_most_recent_first() {
        let pool = test_pool();
        create_question(&pool, "Question 1", -30).await;
        create_question(&pool, "Question 2", -15).await;
        let (_, body) = get_page(&pool, "/polls/").await;
        let first = body.find("Question 1").unwrap();
        let second = body.find("Question 2").unwrap();
        assert!(second < first);
    }

    #[actix_web::test]
    async fn detail_of_future_question_is_not_found() {
        let pool = test_pool();
        let q = create_question(&pool, "Future question", 30).await;
        let (status, body) = get_page(&pool, &format!("/polls/{}/", q.id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!body.contains("Future question"));
    }

    #[actix_web::test]
    async fn detail_of_past_question() {
        let pool = test_pool();
        let q = create_question(&pool, "Past question", -30).await;
        db::insert_choice(&pool, q.id, "Not much").await.unwrap();
        let (status, body) = get_page(&pool, &format!("/polls/{}/", q.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Past question"));
        assert!(body.contains("Not much"));
        assert!(!body.contains(NO_CHOICE_SELECTED));
    }

    #[actix_web::test]
    async fn missing_and_malformed_ids_are_not_found() {
        let pool = test_pool();
        let (status, _) = get_page(&pool, "/polls/1/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = get_page(&pool, "/polls/first/results/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("Not found"));
        let (status, body) = get_page(&pool, "/nowhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("Not found"));
    }

    #[actix_web::test]
    async fn results_of_future_question_is_not_found() {
        let pool = test_pool();
        let q = create_question(&pool, "Future question", 30).await;
        let (status, _) = get_page(&pool, &format!("/polls/{}/results/", q.id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn results_of_past_question() {
        let pool = test_pool();
        let q = create_question(&pool, "Past question", -30).await;
        let (status, body) = get_page(&pool, &format!("/polls/{}/results/", q.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Past question"));
    }

    #[actix_web::test]
    async fn root_redirects_to_index() {
        let pool = test_pool();
        let app = test::init_service(test_app(&pool)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/polls/");
    }

    #[actix_web::test]
    async fn vote_redirects_to_results() {
        let pool = test_pool();
        let q = create_question(&pool, "Pick one", -1).await;
        let a = db::insert_choice(&pool, q.id, "A").await.unwrap();
        let b = db::insert_choice(&pool, q.id, "B").await.unwrap();

        let app = test::init_service(test_app(&pool)).await;
        let req = test::TestRequest::post()
            .uri(&format!("/polls/{}/vote/", q.id))
            .set_form([("choice", b.id.to_string())])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        let location = resp.headers().get(header::LOCATION).unwrap().to_str().unwrap();
        assert!(location.ends_with(&format!("/polls/{}/results/", q.id)));

        let votes: Vec<_> = db::choices_of(&pool, q.id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| (c.id, c.votes))
            .collect();
        assert_eq!(votes, vec![(a.id, 0), (b.id, 1)]);

        let (_, body) = get_page(&pool, &format!("/polls/{}/results/", q.id)).await;
        assert!(body.contains("B -- 1 vote<"));
        assert!(body.contains("A -- 0 votes"));
    }

    #[actix_web::test]
    async fn vote_without_choice_shows_error() {
        let pool = test_pool();
        let q = create_question(&pool, "Pick one", -1).await;
        let other = create_question(&pool, "Other", -1).await;
        let foreign = db::insert_choice(&pool, other.id, "Elsewhere").await.unwrap();

        let app = test::init_service(test_app(&pool)).await;
        for choice in ["".to_string(), "abc".to_string(), foreign.id.to_string()] {
            let req = test::TestRequest::post()
                .uri(&format!("/polls/{}/vote/", q.id))
                .set_form([("choice", choice)])
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
            let body = test::read_body(resp).await;
            let body = String::from_utf8_lossy(&body);
            assert!(body.contains("You didn&#x27;t select a choice."));
            assert!(body.contains("Pick one"));
        }
        assert_eq!(db::choices_of(&pool, other.id).await.unwrap()[0].votes, 0);
    }

    #[actix_web::test]
    async fn vote_on_future_question_is_not_found() {
        let pool = test_pool();
        let q = create_question(&pool, "Future question", 30).await;
        let c = db::insert_choice(&pool, q.id, "A").await.unwrap();

        let app = test::init_service(test_app(&pool)).await;
        let req = test::TestRequest::post()
            .uri(&format!("/polls/{}/vote/", q.id))
            .set_form([("choice", c.id.to_string())])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(db::choices_of(&pool, q.id).await.unwrap()[0].votes, 0);
    }

    #[actix_web::test]
    async fn repeated_votes_are_limited() {
        let pool = test_pool();
        let q = create_question(&pool, "Pick one", -1).await;
        let c = db::insert_choice(&pool, q.id, "A").await.unwrap();

        let app = test::init_service(test_app(&pool)).await;
        let vote_request = || {
            test::TestRequest::post()
                .uri(&format!("/polls/{}/vote/", q.id))
                .peer_addr("203.0.113.7:4000".parse().unwrap())
                .set_form([("choice", c.id.to_string())])
                .to_request()
        };
        assert_eq!(test::call_service(&app, vote_request()).await.status(), StatusCode::FOUND);
        assert_eq!(
            test::call_service(&app, vote_request()).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(db::choices_of(&pool, q.id).await.unwrap()[0].votes, 1);
    }

    #[actix_web::test]
    async fn rejected_vote_does_not_count_against_limit() {
        let pool = test_pool();
        let q = create_question(&pool, "Pick one", -1).await;
        let other = create_question(&pool, "Other", -1).await;
        let c = db::insert_choice(&pool, q.id, "A").await.unwrap();
        let foreign = db::insert_choice(&pool, other.id, "B").await.unwrap();

        let app = test::init_service(test_app(&pool)).await;
        let vote_request = |choice: i64| {
            test::TestRequest::post()
                .uri(&format!("/polls/{}/vote/", q.id))
                .peer_addr("203.0.113.7:4000".parse().unwrap())
                .set_form([("choice", choice.to_string())])
                .to_request()
        };
        let resp = test::call_service(&app, vote_request(foreign.id)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = test::call_service(&app, vote_request(c.id)).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(db::choices_of(&pool, q.id).await.unwrap()[0].votes, 1);
    }
}
