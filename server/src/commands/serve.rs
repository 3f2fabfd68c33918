use crate::{
    http_server::{routes::make_router, run_server},
    AppState, Result,
};

pub(crate) async fn serve() -> Result<()> {
    let app_state = AppState::from_env().await?;

    tracing::info!(media_root = %app_state.app.media_root.display(), "Starting API server");

    let routes = make_router(&app_state.app).with_state(app_state.clone());

    run_server(routes, app_state.app.port).await
}
