//! Wire representation of dashboard service resources
//!
//! Responses are `{ "data": { "id", "type", "attributes", "relationships" } }`
//! documents. Every level keeps the fields it does not know about in a
//! flattened map so a read-modify-write sends back exactly what was read,
//! apart from the one attribute being changed.

use crate::error::{MigrateError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level response document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document<A> {
    pub data: Resource<A>,
    /// `included`, `meta`, `links`, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single resource object
///
/// `type` and `relationships` distinguish absent from `null`, so a resource
/// written back carries exactly the keys it was read with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource<A> {
    pub id: String,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<Value>,
    pub attributes: A,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub relationships: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `Some` for any value the key was given, `null` included; absence is left
/// to `#[serde(default)]`
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl<A> Resource<A> {
    /// `type` as a string, when it is one
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_ref()?.as_str()
    }

    /// Id of a to-one relationship (`relationships.<name>.data.id`)
    pub fn related_id(&self, name: &str) -> Option<&str> {
        self.relationships
            .as_ref()?
            .get(name)?
            .get("data")?
            .get("id")?
            .as_str()
    }

    /// Ids of a to-many relationship (`relationships.<name>.data[].id`), in
    /// the order the service returned them
    pub fn related_ids(&self, name: &str) -> Option<Vec<String>> {
        let items = self
            .relationships
            .as_ref()?
            .get(name)?
            .get("data")?
            .as_array()?;
        items
            .iter()
            .map(|item| item.get("id").and_then(Value::as_str).map(String::from))
            .collect()
    }

    /// Set `relationships.<name>`, turning a missing or `null` relationships
    /// member into an object first
    pub fn set_relationship(&mut self, name: &str, value: Value) {
        let relationships = self
            .relationships
            .get_or_insert_with(|| Value::Object(Map::new()));
        if !relationships.is_object() {
            *relationships = Value::Object(Map::new());
        }
        if let Some(map) = relationships.as_object_mut() {
            map.insert(name.to_string(), value);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardAttributes {
    pub name: String,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportAttributes {
    /// Required key, but the service may send `null`
    #[serde(deserialize_with = "Option::deserialize")]
    pub query: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasourceAttributes {
    pub name: String,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

pub type DashboardDocument = Document<DashboardAttributes>;
pub type ReportDocument = Document<ReportAttributes>;
pub type DatasourceDocument = Document<DatasourceAttributes>;

/// Body of a full-resource write: `{ "data": <resource> }`
#[derive(Debug, Serialize)]
pub struct DataEnvelope<'a, T> {
    pub data: &'a T,
}

/// A dashboard together with its report ids in server order
#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub report_ids: Vec<String>,
    pub document: DashboardDocument,
}

impl Dashboard {
    pub fn from_document(document: DashboardDocument) -> Result<Self> {
        let report_ids = document.data.related_ids("reports").ok_or_else(|| {
            MigrateError::Decode(format!(
                "dashboard {} has no readable reports relationship",
                document.data.id
            ))
        })?;
        Ok(Self {
            report_ids,
            document,
        })
    }

    pub fn id(&self) -> &str {
        &self.document.data.id
    }

    pub fn name(&self) -> &str {
        &self.document.data.attributes.name
    }

    /// Replace every occurrence of `placeholder` in the name with `replacement`
    pub fn rename(&mut self, placeholder: &str, replacement: &str) {
        let renamed = self.name().replace(placeholder, replacement);
        self.document.data.attributes.name = renamed;
    }
}

/// A report's full representation
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub document: ReportDocument,
}

impl Report {
    pub fn id(&self) -> &str {
        &self.document.data.id
    }

    /// `None` when the service sent `"query": null`
    pub fn query(&self) -> Option<&str> {
        self.document.data.attributes.query.as_deref()
    }

    pub fn set_query(&mut self, query: String) {
        self.document.data.attributes.query = Some(query);
    }

    pub fn datasource_id(&self) -> Option<&str> {
        self.document.data.related_id("datasource")
    }

    pub fn dashboard_id(&self) -> Option<&str> {
        self.document.data.related_id("dashboard")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datasource {
    pub id: String,
    pub name: String,
}

impl From<DatasourceDocument> for Datasource {
    fn from(document: DatasourceDocument) -> Self {
        Self {
            id: document.data.id,
            name: document.data.attributes.name,
        }
    }
}

/// `{ "id": ..., "type": ... }` pointer to another resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceIdentifier<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToOne<'a> {
    pub data: ResourceIdentifier<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebindRelationships<'a> {
    pub datasource: ToOne<'a>,
    pub dashboard: ToOne<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebindData<'a> {
    pub relationships: RebindRelationships<'a>,
}

/// Body of the relationship update sent with `PUT /reports/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebindRequest<'a> {
    pub data: RebindData<'a>,
}

impl<'a> RebindRequest<'a> {
    pub fn new(datasource_id: &'a str, dashboard_id: &'a str) -> Self {
        Self {
            data: RebindData {
                relationships: RebindRelationships {
                    datasource: ToOne {
                        data: ResourceIdentifier {
                            id: datasource_id,
                            kind: "datasources",
                        },
                    },
                    dashboard: ToOne {
                        data: ResourceIdentifier {
                            id: dashboard_id,
                            kind: "dashboards",
                        },
                    },
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SignInRequest<'a> {
    pub user: Credentials<'a>,
}

#[derive(Debug, Serialize)]
pub struct Credentials<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct SignInResponse {
    pub token: String,
}
