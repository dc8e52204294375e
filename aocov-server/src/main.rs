#![deny(missing_docs)]
//! ao-coverage server executable.
//!
//! Accepts coverage reports over HTTP and serves the resulting badges and
//! reports by commit or by branch.

mod config;
mod db;
mod ingest;
mod metadata;
mod models;
mod openapi;
mod retrieval;
mod routes;
mod schema;
mod token;

#[cfg(not(test))]
use std::sync::Arc;

#[cfg(not(test))]
use actix_web::{App, HttpServer, web};
#[cfg(not(test))]
use aocov_core::{StdFileSystem, TemplateContext, TemplateOutcome, landing_templates, persist_or_keep};
#[cfg(not(test))]
use dotenvy::dotenv;

#[cfg(not(test))]
use crate::config::ServerConfig;
#[cfg(not(test))]
use crate::db::init_pool;
#[cfg(not(test))]
use crate::metadata::PgMetadataStore;
#[cfg(not(test))]
use crate::routes::{AppState, configure, not_found_page, request_logger};
#[cfg(not(test))]
use crate::token::initialize_token;

#[cfg(not(test))]
fn main() -> std::io::Result<()> {
    dotenv().ok();
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
                .init();
            log::error!("{err}");
            std::process::exit(1);
        }
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    let state = match startup(&config) {
        Ok(state) => web::Data::new(state),
        Err(err) => {
            log::error!("{err}");
            std::process::exit(1);
        }
    };

    let bind = (config.bind_address.clone(), config.port);
    log::info!("listening on {}:{}", bind.0, bind.1);
    actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            App::new()
                .wrap(request_logger())
                .app_data(state.clone())
                .configure(configure)
                .default_service(web::to(not_found_page))
        })
        .bind(bind)?
        .run()
        .await
    })
}

/// Prepare storage, templates and the upload token.
#[cfg(not(test))]
fn startup(config: &ServerConfig) -> Result<AppState, Box<dyn std::error::Error>> {
    config.check_host_dir()?;

    let pool = init_pool(&config.database_url)?;
    let store = Arc::new(PgMetadataStore::new(pool));

    let context = TemplateContext::for_target(&config.target_url);
    let fs = StdFileSystem::new();
    for template in landing_templates(&config.public_dir, &config.host_dir) {
        match persist_or_keep(&fs, &template, &context)? {
            TemplateOutcome::Generated => {
                log::debug!("rendered {}", template.output_file.display());
            }
            TemplateOutcome::KeptExisting(err) => {
                log::warn!(
                    "keeping existing {}: {err}",
                    template.output_file.display()
                );
            }
        }
    }

    let token = initialize_token(store.as_ref(), config.token.as_deref())?;
    Ok(AppState::new(config, store, token))
}

#[cfg(test)]
fn main() {}
