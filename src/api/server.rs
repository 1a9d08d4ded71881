use crate::api::routes;
use crate::config::SharedConfig;
use crate::orchestrator::Orchestrator;
use crate::store::DynStore;
use axum::Router;
use std::future::Future;

#[derive(Clone)]
pub(crate) struct AppState {
    pub config: SharedConfig,
    pub orchestrator: Orchestrator,
    pub store: DynStore,
}

/// Build the API router without binding it, e.g. to drive it in-process.
pub fn router(config: SharedConfig, orchestrator: Orchestrator, store: DynStore) -> Router {
    routes::new(AppState {
        config,
        orchestrator,
        store,
    })
}

pub fn new(
    config: SharedConfig,
    orchestrator: Orchestrator,
    store: DynStore,
) -> impl Future<Output = hyper::Result<()>> {
    let addr = config.api_bind_addr;
    axum::Server::bind(&addr).serve(router(config, orchestrator, store).into_make_service())
}
