use std::collections::HashMap;
use std::sync::Arc;

use enricher_core::models::JobType;

use crate::handlers::JobHandler;

/// 任务类型到处理器的映射
#[derive(Clone, Default)]
pub struct JobRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器，同类型的旧处理器会被替换
    pub fn register(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers
            .insert(handler.job_type().as_str().to_string(), handler);
        self
    }

    pub fn get(&self, job_type: &JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type.as_str()).cloned()
    }

    pub fn contains(&self, job_type: &JobType) -> bool {
        self.handlers.contains_key(job_type.as_str())
    }

    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}
