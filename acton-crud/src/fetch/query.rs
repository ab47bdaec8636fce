//! Fetch queries handed to the underlying query engine

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use super::planner::{FetchSpecification, JoinFetch};
use crate::error::Result;

/// Bound parameter of a fetch query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParameter {
    /// `:id`
    Id(Value),
    /// `:ids`
    Ids(Vec<Value>),
}

/// A primary or secondary eager-fetch query
#[derive(Debug, Clone, PartialEq)]
pub struct FetchQuery {
    /// Root entity name
    pub entity: &'static str,
    /// Join clauses
    pub joins: Vec<JoinFetch>,
    /// Identifier parameter
    pub parameter: QueryParameter,
}

impl FetchQuery {
    /// Query for a single identifier
    pub fn by_id(spec: &FetchSpecification, id: Value) -> Self {
        Self {
            entity: spec.entity,
            joins: spec.joins.clone(),
            parameter: QueryParameter::Id(id),
        }
    }

    /// Query for a batch of identifiers
    pub fn by_ids(spec: &FetchSpecification, ids: Vec<Value>) -> Self {
        Self {
            entity: spec.entity,
            joins: spec.joins.clone(),
            parameter: QueryParameter::Ids(ids),
        }
    }

    /// Query text with named parameters
    ///
    /// ```text
    /// SELECT e FROM Employee e LEFT JOIN FETCH e.department r_1_0 WHERE e.id = :id
    /// ```
    pub fn text(&self) -> String {
        let mut text = format!("SELECT e FROM {} e", self.entity);
        for join in &self.joins {
            text.push(' ');
            text.push_str(&join.to_string());
        }
        match self.parameter {
            QueryParameter::Id(_) => text.push_str(" WHERE e.id = :id"),
            QueryParameter::Ids(_) => text.push_str(" WHERE e.id IN :ids"),
        }
        text
    }

    /// Join clause owned by `alias` for `field`, if the query fetches it
    pub fn join_for(&self, alias: &str, field: &str) -> Option<&JoinFetch> {
        self.joins
            .iter()
            .find(|join| join.owner_alias == alias && join.field == field)
    }
}

impl fmt::Display for FetchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Underlying query engine
///
/// Rows are entity documents. Relationships fetched by a join clause are
/// hydrated; every other relationship comes back as identifier stubs
/// (`{"id": 3}`) or `null`.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Execute a single-id query; no row is `None`, not an error
    async fn fetch_one(&self, query: &FetchQuery) -> Result<Option<Value>>;

    /// Execute a batch query
    async fn fetch_all(&self, query: &FetchQuery) -> Result<Vec<Value>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::planner::ROOT_ALIAS;
    use serde_json::json;

    fn spec() -> FetchSpecification {
        FetchSpecification {
            entity: "Department",
            joins: vec![
                JoinFetch {
                    owner_alias: ROOT_ALIAS.to_string(),
                    field: "company",
                    alias: "r_1_0".to_string(),
                    level: 0,
                },
                JoinFetch {
                    owner_alias: ROOT_ALIAS.to_string(),
                    field: "manager",
                    alias: "r_2_0".to_string(),
                    level: 0,
                },
            ],
            deferred: vec![],
        }
    }

    #[test]
    fn test_single_id_text() {
        let query = FetchQuery::by_id(&spec(), json!(7));
        assert_eq!(
            query.text(),
            "SELECT e FROM Department e LEFT JOIN FETCH e.company r_1_0 \
             LEFT JOIN FETCH e.manager r_2_0 WHERE e.id = :id"
        );
    }

    #[test]
    fn test_batch_text_without_joins() {
        let spec = FetchSpecification {
            entity: "Project",
            joins: vec![],
            deferred: vec![],
        };
        let query = FetchQuery::by_ids(&spec, vec![json!(1), json!(2)]);
        assert_eq!(query.to_string(), "SELECT e FROM Project e WHERE e.id IN :ids");
    }

    #[test]
    fn test_join_for() {
        let query = FetchQuery::by_id(&spec(), json!(1));
        assert_eq!(query.join_for("e", "manager").map(|j| j.alias.as_str()), Some("r_2_0"));
        assert!(query.join_for("r_1_0", "manager").is_none());
    }
}
