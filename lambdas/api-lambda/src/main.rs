use lambda_http::{run, service_fn, tracing, Error, Request};
use onboarding_shared::{config::Config, AppState};
use std::sync::Arc;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    // Sessions live for as long as this container stays warm
    let config = Config::load();
    tracing::info!("Webhook base URL: {}", config.webhook_base_url);
    let state = AppState::from_config(config);

    run(service_fn(move |event: Request| {
        let state = Arc::clone(&state);
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}
