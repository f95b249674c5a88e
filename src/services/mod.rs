use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;

pub mod grading;
pub mod question_bank;
pub mod result_store;
pub mod session_engine;

use question_bank::QuestionBank;
use result_store::ResultStore;
use session_engine::SessionEngine;

pub struct AppState {
    pub config: Config,
    pub engine: Arc<SessionEngine>,
    pub result_store: Arc<dyn ResultStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        question_bank: Arc<dyn QuestionBank>,
        result_store: Arc<dyn ResultStore>,
    ) -> Self {
        let engine = SessionEngine::new(
            question_bank,
            Arc::clone(&result_store),
            config.grading.clone(),
            Duration::from_secs(config.submit_wait_seconds),
        );
        Self {
            config,
            engine,
            result_store,
        }
    }
}
