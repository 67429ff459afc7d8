use std::sync::Arc;

use crate::config::BatcherCfg;
use crate::readiness::Readiness;
use crate::store::PayloadStore;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<BatcherCfg>,
    pub ready: Arc<Readiness>,
    pub store: Arc<PayloadStore>,
}
