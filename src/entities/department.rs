// 🏢 Department Entity

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    /// Primary key from the source file
    pub id: i64,

    /// Department name (never empty)
    pub name: String,
}

impl Department {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Department {
            id,
            name: name.into(),
        }
    }
}
