use std::collections::BTreeMap;
use std::time::Duration;

use opsdeck_core::{FieldValue, ResourceRef, ResourceType};
use serde_json::{Value, json};

use crate::error::RemoteError;
use crate::retry::RetryPolicy;
use crate::session::Session;
use crate::traits::{RemoteDirectory, ResourceEntity};

const PAGE_SIZE: u32 = 100;

/// User fields the platform accepts a null for. Anything else cannot be
/// cleared through the public API and surfaces as `Unsupported`.
const CLEARABLE_USER_FIELDS: &[&str] = &["title", "department", "manager"];

/// Live HTTP client for the platform's REST API.
///
/// Synchronous `ureq` agent with a global per-call timeout; transient
/// failures (429, 5xx, transport) go through the bounded retry policy.
pub struct HttpDirectory {
    agent: ureq::Agent,
    session: Session,
    retry: RetryPolicy,
}

impl HttpDirectory {
    pub fn new(session: Session) -> Self {
        Self::with_retry(session, RetryPolicy::default())
    }

    pub fn with_retry(session: Session, retry: RetryPolicy) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(30)))
            .build();
        Self {
            agent: config.into(),
            session,
            retry,
        }
    }

    fn entity_path(target: &ResourceRef) -> String {
        match target.rtype {
            ResourceType::User => format!("/api/v2/users/{}", target.id),
            ResourceType::Group => format!("/api/v2/groups/{}", target.id),
            ResourceType::Queue => format!("/api/v2/routing/queues/{}", target.id),
            ResourceType::Skill => format!("/api/v2/routing/skills/{}", target.id),
        }
    }

    fn members_path(container: &ResourceRef) -> Result<String, RemoteError> {
        match container.rtype {
            ResourceType::Group => Ok(format!("/api/v2/groups/{}/members", container.id)),
            ResourceType::Queue => {
                Ok(format!("/api/v2/routing/queues/{}/members", container.id))
            }
            ResourceType::User => Ok(format!("/api/v2/users/{}/routingskills", container.id)),
            ResourceType::Skill => Err(RemoteError::Unsupported(format!(
                "{container} has no member set"
            ))),
        }
    }

    fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, RemoteError> {
        let url = self.session.url(path);
        self.retry.run(|| {
            let mut req = self
                .agent
                .get(&url)
                .header("Authorization", &self.session.bearer());
            for (key, value) in query {
                req = req.query(*key, value);
            }
            let resp = req.call().map_err(|e| map_ureq_error(e, path))?;
            resp.into_body()
                .read_json::<Value>()
                .map_err(|e| RemoteError::Transport(format!("bad response body: {e}")))
        })
    }

    fn send_json(&self, method: Method, path: &str, body: &Value) -> Result<(), RemoteError> {
        let url = self.session.url(path);
        self.retry.run(|| {
            let req = match method {
                Method::Post => self.agent.post(&url),
                Method::Patch => self.agent.patch(&url),
            };
            req.header("Authorization", &self.session.bearer())
                .send_json(body)
                .map_err(|e| map_ureq_error(e, path))?;
            Ok(())
        })
    }

    fn delete(&self, path: &str, query: &[(&str, String)]) -> Result<(), RemoteError> {
        let url = self.session.url(path);
        self.retry.run(|| {
            let mut req = self
                .agent
                .delete(&url)
                .header("Authorization", &self.session.bearer());
            for (key, value) in query {
                req = req.query(*key, value);
            }
            req.call().map_err(|e| map_ureq_error(e, path))?;
            Ok(())
        })
    }

    /// Walk `pageNumber`/`pageCount` pages, collecting `entities[].id`.
    fn paginate_ids(&self, path: &str) -> Result<Vec<String>, RemoteError> {
        let mut ids = Vec::new();
        let mut page: u32 = 1;
        loop {
            let data = self.get_json(
                path,
                &[
                    ("pageSize", PAGE_SIZE.to_string()),
                    ("pageNumber", page.to_string()),
                ],
            )?;
            if let Some(entities) = data.get("entities").and_then(Value::as_array) {
                for entity in entities {
                    if let Some(id) = entity.get("id").and_then(Value::as_str) {
                        ids.push(id.to_string());
                    }
                }
            }
            let page_count = data
                .get("pageCount")
                .and_then(Value::as_u64)
                .unwrap_or(1) as u32;
            if page >= page_count {
                return Ok(ids);
            }
            page += 1;
        }
    }
}

enum Method {
    Post,
    Patch,
}

fn map_ureq_error(err: ureq::Error, what: &str) -> RemoteError {
    match err {
        ureq::Error::StatusCode(code) => RemoteError::from_status(code, what),
        other => RemoteError::Transport(other.to_string()),
    }
}

pub(crate) fn field_value_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Absent | FieldValue::Null => Value::Null,
        FieldValue::Text(s) => json!(s),
        FieldValue::Integer(n) => json!(n),
        FieldValue::Float(x) => json!(x),
        FieldValue::Boolean(b) => json!(b),
    }
}

pub(crate) fn json_to_field_value(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Null => Some(FieldValue::Null),
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        Value::Bool(b) => Some(FieldValue::Boolean(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(FieldValue::Integer(i))
            } else {
                n.as_f64().map(FieldValue::Float)
            }
        }
        // Nested objects/arrays are not patchable fields.
        Value::Object(_) | Value::Array(_) => None,
    }
}

impl RemoteDirectory for HttpDirectory {
    fn get(&self, target: &ResourceRef) -> Result<ResourceEntity, RemoteError> {
        let data = self.get_json(&Self::entity_path(target), &[])?;
        let name = data
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut fields = BTreeMap::new();
        if let Some(obj) = data.as_object() {
            for (key, value) in obj {
                if key == "id" || key == "selfUri" {
                    continue;
                }
                if let Some(fv) = json_to_field_value(value) {
                    fields.insert(key.clone(), fv);
                }
            }
        }
        Ok(ResourceEntity {
            target: target.clone(),
            name,
            fields,
        })
    }

    fn list_members(&self, container: &ResourceRef) -> Result<Vec<ResourceRef>, RemoteError> {
        let path = Self::members_path(container)?;
        let member_type = container
            .rtype
            .member_type()
            .unwrap_or(ResourceType::User);
        let ids = self.paginate_ids(&path)?;
        Ok(ids
            .into_iter()
            .map(|id| ResourceRef::new(member_type, id))
            .collect())
    }

    fn add_members(
        &self,
        container: &ResourceRef,
        members: &[ResourceRef],
    ) -> Result<(), RemoteError> {
        let path = Self::members_path(container)?;
        match container.rtype {
            ResourceType::Group => {
                let ids: Vec<&str> = members.iter().map(|m| m.id.as_str()).collect();
                self.send_json(
                    Method::Post,
                    &path,
                    &json!({ "memberIds": ids, "version": 1 }),
                )
            }
            ResourceType::Queue => {
                let body: Vec<Value> = members
                    .iter()
                    .map(|m| json!({ "id": m.id, "joined": true }))
                    .collect();
                self.send_json(Method::Post, &path, &Value::Array(body))
            }
            ResourceType::User => {
                // Skill assignment takes one skill per call.
                for member in members {
                    self.send_json(
                        Method::Post,
                        &path,
                        &json!({ "id": member.id, "proficiency": 1.0 }),
                    )?;
                }
                Ok(())
            }
            ResourceType::Skill => {
                Err(RemoteError::Unsupported(format!("{container} has no member set")))
            }
        }
    }

    fn remove_members(
        &self,
        container: &ResourceRef,
        members: &[ResourceRef],
    ) -> Result<(), RemoteError> {
        let path = Self::members_path(container)?;
        match container.rtype {
            ResourceType::Group => {
                let ids = members
                    .iter()
                    .map(|m| m.id.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                self.delete(&path, &[("ids", ids)])
            }
            ResourceType::Queue => {
                let body: Vec<Value> = members
                    .iter()
                    .map(|m| json!({ "id": m.id, "joined": false }))
                    .collect();
                self.send_json(Method::Post, &path, &Value::Array(body))
            }
            ResourceType::User => {
                for member in members {
                    self.delete(&format!("{path}/{}", member.id), &[])?;
                }
                Ok(())
            }
            ResourceType::Skill => {
                Err(RemoteError::Unsupported(format!("{container} has no member set")))
            }
        }
    }

    fn patch_field(
        &self,
        target: &ResourceRef,
        field: &str,
        value: &FieldValue,
    ) -> Result<(), RemoteError> {
        let body = json!({ field: field_value_to_json(value) });
        self.send_json(Method::Patch, &Self::entity_path(target), &body)
    }

    fn clear_field(&self, target: &ResourceRef, field: &str) -> Result<(), RemoteError> {
        let clearable =
            target.rtype == ResourceType::User && CLEARABLE_USER_FIELDS.contains(&field);
        if !clearable {
            return Err(RemoteError::Unsupported(format!(
                "field '{field}' on {target} cannot be cleared"
            )));
        }
        self.send_json(
            Method::Patch,
            &Self::entity_path(target),
            &json!({ field: Value::Null }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_scalar_conversion() {
        assert_eq!(json_to_field_value(&json!("Agent")), Some(FieldValue::Text("Agent".into())));
        assert_eq!(json_to_field_value(&json!(3)), Some(FieldValue::Integer(3)));
        assert_eq!(json_to_field_value(&json!(0.8)), Some(FieldValue::Float(0.8)));
        assert_eq!(json_to_field_value(&json!(true)), Some(FieldValue::Boolean(true)));
        assert_eq!(json_to_field_value(&Value::Null), Some(FieldValue::Null));
        assert_eq!(json_to_field_value(&json!({"a": 1})), None);
    }

    #[test]
    fn absent_serializes_as_null() {
        assert_eq!(field_value_to_json(&FieldValue::Absent), Value::Null);
        assert_eq!(field_value_to_json(&FieldValue::Null), Value::Null);
    }

    #[test]
    fn member_paths_by_container_type() {
        assert_eq!(
            HttpDirectory::members_path(&ResourceRef::group("g1")).unwrap(),
            "/api/v2/groups/g1/members"
        );
        assert_eq!(
            HttpDirectory::members_path(&ResourceRef::queue("q1")).unwrap(),
            "/api/v2/routing/queues/q1/members"
        );
        assert_eq!(
            HttpDirectory::members_path(&ResourceRef::user("u1")).unwrap(),
            "/api/v2/users/u1/routingskills"
        );
        assert!(HttpDirectory::members_path(&ResourceRef::skill("s1")).is_err());
    }
}
