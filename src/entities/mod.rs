// Entity Models - departments, jobs and hired employees
// Each entity is keyed by the integer id carried in its source file.

pub mod department;
pub mod employee;
pub mod job;

pub use department::Department;
pub use employee::Employee;
pub use job::Job;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ENTITY KIND
// ============================================================================

/// Which source file / table a row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Department,
    Job,
    Employee,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Department, EntityKind::Job, EntityKind::Employee];

    /// Plural name, used as table name and error log context
    pub fn plural(&self) -> &'static str {
        match self {
            EntityKind::Department => "departments",
            EntityKind::Job => "jobs",
            EntityKind::Employee => "employees",
        }
    }

    /// Source column names, in file order
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Department => &["id", "department"],
            EntityKind::Job => &["id", "job"],
            EntityKind::Employee => &["id", "name", "datetime", "department_id", "job_id"],
        }
    }

    /// Default source file name inside the data directory
    pub fn default_file_name(&self) -> &'static str {
        match self {
            EntityKind::Department => "departments.csv",
            EntityKind::Job => "jobs.csv",
            EntityKind::Employee => "hired_employees.csv",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "department" | "departments" => Ok(EntityKind::Department),
            "job" | "jobs" => Ok(EntityKind::Job),
            "employee" | "employees" | "hired_employees" => Ok(EntityKind::Employee),
            other => Err(format!("Unknown entity kind: {}", other)),
        }
    }
}

// ============================================================================
// ENTITY
// ============================================================================

/// A validated row, ready to be merged into storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entity {
    Department(Department),
    Job(Job),
    Employee(Employee),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Department(_) => EntityKind::Department,
            Entity::Job(_) => EntityKind::Job,
            Entity::Employee(_) => EntityKind::Employee,
        }
    }

    /// Primary key
    pub fn id(&self) -> i64 {
        match self {
            Entity::Department(d) => d.id,
            Entity::Job(j) => j.id,
            Entity::Employee(e) => e.id,
        }
    }
}

impl From<Department> for Entity {
    fn from(d: Department) -> Self {
        Entity::Department(d)
    }
}

impl From<Job> for Entity {
    fn from(j: Job) -> Self {
        Entity::Job(j)
    }
}

impl From<Employee> for Entity {
    fn from(e: Employee) -> Self {
        Entity::Employee(e)
    }
}
