// 👤 Employee Entity - one hire record
//
// department_id and job_id reference Department.id and Job.id. They are NOT
// checked here; storage enforces them when the batch is committed.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub name: String,

    /// Hire timestamp, UTC, no timezone attached
    pub hire_date: NaiveDateTime,

    pub department_id: i64,
    pub job_id: i64,
}

impl Employee {
    pub fn new(
        id: i64,
        name: impl Into<String>,
        hire_date: NaiveDateTime,
        department_id: i64,
        job_id: i64,
    ) -> Self {
        Employee {
            id,
            name: name.into(),
            hire_date,
            department_id,
            job_id,
        }
    }
}
