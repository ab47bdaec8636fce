//! Fixture entity graph shared by unit tests
//!
//! ```text
//! Employee --department--> Department --company--> Company
//!    |                         |-------manager--> Manager
//!    +--hobbies (set)--> Hobby  +------projects (list)--> Project
//! ```

use std::io;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::entity::{CollectionKind, Entity, EntityRegistry, EntitySchema, Relation};
use crate::mapper::Mapper;
use crate::repository::{MemoryStore, Repository};

macro_rules! named_entity {
    ($name:ident) => {
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub(crate) struct $name {
            pub id: Option<i64>,
            pub name: String,
        }

        impl Entity for $name {
            type Id = i64;
            const NAME: &'static str = stringify!($name);

            fn id(&self) -> Option<i64> {
                self.id
            }

            fn schema() -> EntitySchema {
                EntitySchema::new(Self::NAME).scalar("name")
            }
        }

        impl $name {
            pub(crate) fn named(name: &str) -> Self {
                Self {
                    id: None,
                    name: name.to_string(),
                }
            }
        }
    };
}

named_entity!(Company);
named_entity!(Manager);
named_entity!(Project);
named_entity!(Hobby);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Department {
    pub id: Option<i64>,
    pub name: String,
    pub company: Option<Company>,
    pub manager: Option<Manager>,
    pub projects: Vec<Project>,
}

impl Entity for Department {
    type Id = i64;
    const NAME: &'static str = "Department";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn schema() -> EntitySchema {
        EntitySchema::new(Self::NAME)
            .scalar("name")
            .to_one("company", Company::NAME, Relation::many_to_one())
            .to_one("manager", Manager::NAME, Relation::one_to_one())
            .to_many("projects", Project::NAME, Relation::one_to_many(), CollectionKind::List)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Employee {
    pub id: Option<i64>,
    pub name: String,
    pub department: Option<Department>,
    pub hobbies: Vec<Hobby>,
}

impl Entity for Employee {
    type Id = i64;
    const NAME: &'static str = "Employee";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn schema() -> EntitySchema {
        EntitySchema::new(Self::NAME)
            .scalar("name")
            .to_one("department", Department::NAME, Relation::many_to_one())
            .to_many("hobbies", Hobby::NAME, Relation::many_to_many(), CollectionKind::Set)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct HobbyDto {
    pub id: Option<i64>,
    pub name: String,
}

/// Flattened view of an employee
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct EmployeeDto {
    pub id: Option<i64>,
    pub name: String,
    pub department_id: Option<i64>,
    pub hobbies: Vec<String>,
}

pub(crate) struct EmployeeMapper;

impl Mapper<Employee, EmployeeDto> for EmployeeMapper {
    fn to_entity(&self, dto: EmployeeDto) -> crate::Result<Employee> {
        Ok(Employee {
            id: dto.id,
            name: dto.name,
            department: dto.department_id.map(|id| Department {
                id: Some(id),
                ..Department::default()
            }),
            hobbies: dto.hobbies.iter().map(|name| Hobby::named(name)).collect(),
        })
    }

    fn to_dto(&self, entity: Employee) -> crate::Result<EmployeeDto> {
        Ok(EmployeeDto {
            id: entity.id,
            name: entity.name,
            department_id: entity.department.and_then(|d| d.id),
            hobbies: entity.hobbies.into_iter().map(|h| h.name).collect(),
        })
    }

    fn patch_to_entity(&self, fields: Map<String, Value>) -> crate::Result<Map<String, Value>> {
        Ok(fields
            .into_iter()
            .map(|(field, value)| match (field.as_str(), value) {
                ("department_id", Value::Null) => ("department".to_string(), Value::Null),
                ("department_id", id) => ("department".to_string(), json!({ "id": id })),
                ("hobbies", Value::Array(names)) => (
                    field,
                    Value::Array(names.into_iter().map(|name| json!({ "name": name })).collect()),
                ),
                (_, value) => (field, value),
            })
            .collect())
    }
}

/// Registry with the whole fixture graph
pub(crate) fn registry() -> Arc<EntityRegistry> {
    let registry = EntityRegistry::new();
    registry
        .register::<Company>()
        .register::<Manager>()
        .register::<Project>()
        .register::<Hobby>()
        .register::<Department>()
        .register::<Employee>();
    Arc::new(registry)
}

/// Department schema without the projects collection
pub(crate) fn flat_department_schema() -> EntitySchema {
    EntitySchema::new(Department::NAME)
        .scalar("name")
        .to_one("company", Company::NAME, Relation::many_to_one())
        .to_one("manager", Manager::NAME, Relation::one_to_one())
}

/// Unsaved department with a company, a manager and the named projects
pub(crate) fn department(name: &str, projects: &[&str]) -> Department {
    Department {
        id: None,
        name: name.to_string(),
        company: Some(Company::named(&format!("{} Inc", name))),
        manager: Some(Manager::named(&format!("{} lead", name))),
        projects: projects.iter().map(|p| Project::named(p)).collect(),
    }
}

/// Unsaved employee with the named hobbies
pub(crate) fn employee(name: &str, department: Option<Department>, hobbies: &[&str]) -> Employee {
    Employee {
        id: None,
        name: name.to_string(),
        department,
        hobbies: hobbies.iter().map(|h| Hobby::named(h)).collect(),
    }
}

/// Store the employee, cascading every unsaved relationship target
pub(crate) async fn seed(store: &MemoryStore, employee: Employee) -> Employee {
    Repository::<Employee>::save(store, employee).await.unwrap()
}

/// Log lines written while the guard is alive, on the current thread only
#[derive(Clone, Default)]
pub(crate) struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Install a debug-level subscriber for the current thread
    pub(crate) fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        (capture, tracing::subscriber::set_default(subscriber))
    }

    /// Everything captured so far
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
