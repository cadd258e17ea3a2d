use std::sync::Arc;

use arbiterlock_engine::LockEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LockEngine>,
}
