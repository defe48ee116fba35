use actix_web::rt::{self, time};
use actix_web::{middleware, web, App, HttpServer};
use anyhow::{bail, Context};

macro_rules! return_html {
    ($html:expr) => {
        Ok(actix_web::HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body($html))
    };
}

mod admin;
mod db;
mod error;
mod polls;
mod rate;
mod templates;
mod util;
mod views;

use error::UserError;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_VOTE_INTERVAL_SECS: u64 = 10;
const LIMIT_CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        bail!("Database path not specified. Set the database path in the first argument");
    }
    let db_path = std::path::Path::new(&args[1]);
    if !db_path.exists() {
        log::warn!("Database file {:?} does not exist, creating it", db_path);
    }

    let bind = std::env::var("POLLS_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());

    let admin_token = std::env::var("POLL_ADMIN_TOKEN").ok();
    if admin_token.is_none() {
        log::warn!("POLL_ADMIN_TOKEN not set, admin functions are disabled");
    }

    let vote_interval = match std::env::var("POLLS_VOTE_INTERVAL") {
        Ok(v) => v
            .parse()
            .with_context(|| format!("Invalid POLLS_VOTE_INTERVAL: {:?}", v))?,
        Err(_) => DEFAULT_VOTE_INTERVAL_SECS,
    };

    log::info!("Connecting to database: {} ...", db_path.display());

    // SQLite database connection
    let pool = db::open(db::file_manager(db_path), 8)
        .with_context(|| format!("Failed to open database {:?}", db_path))?;

    log::info!(
        "Connected to database! {} question(s) stored",
        db::count_questions(&pool).await?
    );

    let limits = web::Data::new(rate::LimitStore::new(std::time::Duration::from_secs(
        vote_interval,
    )));
    let l = limits.clone();
    rt::spawn(async move {
        let limits = l;
        let mut interval = time::interval(LIMIT_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            limits.cleanup();
            log::debug!("limits cleaned up, {} left", limits.len());
        }
    });

    let admin_token = web::Data::new(admin::AdminToken(admin_token));

    log::info!("Listening on {}", bind);
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(limits.clone())
            .app_data(admin_token.clone())
            .app_data(web::Data::new(pool.clone()))
            .configure(app_config)
    })
    .bind(&bind)
    .with_context(|| format!("Failed to bind {}", bind))?
    .run()
    .await
    .context("An error occured when running HttpServer")
}

fn app_config(config: &mut web::ServiceConfig) {
    config
        .service(actix_files::Files::new("/static", "static/").prefer_utf8(true))
        .service(web::resource("/").name("root").route(web::get().to(views::root)))
        .service(
            web::scope("/polls")
                // Non-numeric question ids get the regular 404 page
                .app_data(
                    web::PathConfig::default().error_handler(|_, _| UserError::NotFound.into()),
                )
                // Question list
                .service(
                    web::resource("/")
                        .name("index")
                        .route(web::get().to(views::index)),
                )
                // Question with its voting form
                .service(
                    web::resource("/{question_id}/")
                        .name("detail")
                        .route(web::get().to(views::detail)),
                )
                // Question results
                .service(
                    web::resource("/{question_id}/results/")
                        .name("results")
                        .route(web::get().to(views::results)),
                )
                // Voting callback
                .service(
                    web::resource("/{question_id}/vote/")
                        .name("vote")
                        .route(web::post().to(views::vote)),
                ),
        )
        // Administration page and its callback
        .service(
            web::resource("/admin")
                .route(web::get().to(admin::handle_admin))
                .route(web::post().to(admin::handle_admin_action)),
        )
        // 404 screen
        .default_service(web::to(handle_default));
}

/// Handles requests that don't match anything, returns error 404
async fn handle_default() -> Result<actix_web::HttpResponse, UserError> {
    Err(UserError::NotFound)
}
