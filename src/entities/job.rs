// 💼 Job Entity

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub title: String,
}

impl Job {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Job {
            id,
            title: title.into(),
        }
    }
}
