//! Shared application state handed to every route handler via axum's
//! `State` extractor (§6).

use std::sync::Arc;

use crate::config::Config;
use crate::graph::GraphRunner;
use crate::registries::Registries;
use crate::testbed::TestbedRunner;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registries: Registries,
    pub graph: Arc<GraphRunner>,
    pub testbed: Arc<TestbedRunner>,
    pub http_client: reqwest::Client,
}
