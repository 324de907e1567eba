// src/main.rs
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use mongodb::{bson::doc, options::ClientOptions, Client, Collection, Database};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod activities;
mod auth;
mod error;
mod handlers;
mod models;
mod plants;
mod uploads;
mod validation;

pub use error::AppError;

use models::{Activity, Plant, User};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub upload_dir: PathBuf,
}

impl AppState {
    pub fn users(&self) -> Collection<User> {
        self.db.collection("users")
    }

    pub fn plants(&self) -> Collection<Plant> {
        self.db.collection("plants")
    }

    pub fn activities(&self) -> Collection<Activity> {
        self.db.collection("activities")
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let uri =
        std::env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    let db_name = std::env::var("MONGO_DB").unwrap_or_else(|_| "plantae".to_string());

    let mut client_options = ClientOptions::parse(&uri).await.expect("invalid MONGO_URI");
    client_options.server_selection_timeout = Some(Duration::from_secs(10));
    let client = Client::with_options(client_options).expect("failed to build MongoDB client");
    let db = client.database(&db_name);

    db.run_command(doc! { "ping": 1 })
        .await
        .expect("failed to connect to MongoDB");
    tracing::info!("connected to MongoDB");

    let upload_dir =
        PathBuf::from(std::env::var("UPLOAD_FOLDER").unwrap_or_else(|_| "uploads".to_string()));
    tokio::fs::create_dir_all(&upload_dir)
        .await
        .expect("failed to create upload directory");

    let state = AppState { db, upload_dir };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(handlers::index_handler))
        .route("/ping", get(handlers::ping_handler))
        // auth
        .route("/api/auth/register", post(handlers::register_handler))
        .route("/api/auth/login", post(handlers::login_handler))
        // plants
        .route(
            "/api/plants",
            get(plants::list_plants_handler).post(plants::create_plant_handler),
        )
        .route("/api/plants/search", get(plants::search_plants_handler))
        .route("/api/plants/filter", get(plants::filter_plants_handler))
        .route(
            "/api/plants/photo/:filename",
            get(uploads::serve_photo_handler),
        )
        .route(
            "/api/plants/:id",
            get(plants::get_plant_handler)
                .put(plants::update_plant_handler)
                .patch(plants::update_plant_handler)
                .delete(plants::delete_plant_handler),
        )
        .route("/api/plants/:id/water", post(plants::water_plant_handler))
        .route(
            "/api/plants/:id/restore",
            post(plants::restore_plant_handler),
        )
        .route("/api/plants/:id/upload", post(plants::upload_photo_handler))
        // activity log
        .route("/api/activities", get(activities::list_activities_handler))
        .with_state(state)
        .layer(cors);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listener");
    axum::serve(listener, app).await.expect("server error");
}
