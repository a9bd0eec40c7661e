//! Client for the business suite's XML-RPC endpoint.
//!
//! Authentication happens once per run against the `common` endpoint and
//! yields a numeric user id; every subsequent call goes through the generic
//! `execute` operation on the `object` endpoint, parameterised by model,
//! action, filter and fields.

use std::time::Duration;

use serde_json::Value as Json;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::model::{FieldSet, TargetRecord};
use crate::xmlrpc::{self, Value};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The actions the suite's generic `execute` call understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Search,
    Read,
    Create,
    Write,
    Unlink,
    SearchRead,
    FieldsGet,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Action::Search => "search",
            Action::Read => "read",
            Action::Create => "create",
            Action::Write => "write",
            Action::Unlink => "unlink",
            Action::SearchRead => "search_read",
            Action::FieldsGet => "fields_get",
        }
    }
}

/// Authenticated session, reused for the duration of one run.
#[derive(Debug, Clone)]
pub struct SuiteSession {
    uid: i64,
    password: String,
}

impl SuiteSession {
    /// The user id the suite assigned at authentication time.
    pub fn uid(&self) -> i64 {
        self.uid
    }
}

/// XML-RPC client for the business suite, bound to one database and model.
pub struct SuiteClient {
    http: reqwest::blocking::Client,
    api_url: String,
    db: String,
    model: String,
}

impl SuiteClient {
    /// Creates a client for the given endpoint, database and model name.
    pub fn new(
        api_url: impl Into<String>,
        db: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            db: db.into(),
            model: model.into(),
        })
    }

    /// The model this client operates on.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn call(&self, endpoint: &str, method: &str, params: &[Value]) -> Result<Value> {
        let body = xmlrpc::encode_call(method, params)?;
        debug!(endpoint, method, "posting suite call");
        let response = self
            .http
            .post(format!("{}/xmlrpc/2/{endpoint}", self.api_url))
            .header("Content-Type", "text/xml")
            .body(body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::SuiteFault {
                code: i64::from(status.as_u16()),
                message: response.text().unwrap_or_default(),
            });
        }
        xmlrpc::decode_response(&response.text()?)
    }

    /// Authenticates against the `common` endpoint. The suite answers a
    /// boolean `false` instead of a fault when credentials are wrong.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<SuiteSession> {
        let answer = self.call(
            "common",
            "authenticate",
            &[
                Value::Str(self.db.clone()),
                Value::Str(username.to_string()),
                Value::Str(password.to_string()),
                Value::Struct(Default::default()),
            ],
        )?;
        match answer {
            Value::Int(uid) => Ok(SuiteSession {
                uid,
                password: password.to_string(),
            }),
            _ => Err(SyncError::AuthRejected(username.to_string())),
        }
    }

    /// Generic call against the configured model: `execute(action, params,
    /// kwargs)`. All convenience operations below go through here.
    pub fn execute(
        &self,
        session: &SuiteSession,
        action: Action,
        params: Vec<Value>,
        kwargs: Option<Value>,
    ) -> Result<Value> {
        let mut call_params = vec![
            Value::Str(self.db.clone()),
            Value::Int(session.uid),
            Value::Str(session.password.clone()),
            Value::Str(self.model.clone()),
            Value::Str(action.as_str().to_string()),
            Value::Array(params),
        ];
        if let Some(kwargs) = kwargs {
            call_params.push(kwargs);
        }
        self.call("object", "execute_kw", &call_params)
    }

    /// Ids of every record of the model.
    pub fn all_ids(&self, session: &SuiteSession) -> Result<Vec<i64>> {
        let answer = self.execute(session, Action::Search, vec![empty_filter()], None)?;
        decode_ids(&answer)
    }

    /// Ids of records whose `field` exactly equals `value`. This is the
    /// engine's existing-record lookup when `field` is the display-name
    /// field; duplicate names yield multiple ids.
    pub fn ids_by_field(
        &self,
        session: &SuiteSession,
        field: &str,
        value: &str,
    ) -> Result<Vec<i64>> {
        let answer = self.execute(
            session,
            Action::Search,
            vec![equals_filter(field, value)],
            None,
        )?;
        decode_ids(&answer)
    }

    /// Reads the given fields of the given records.
    pub fn read(
        &self,
        session: &SuiteSession,
        ids: &[i64],
        fields: &[String],
    ) -> Result<Vec<TargetRecord>> {
        let answer = self.execute(
            session,
            Action::Read,
            vec![Value::Array(ids.iter().map(|id| Value::Int(*id)).collect())],
            Some(fields_kwargs(fields)),
        )?;
        decode_records(&answer)
    }

    /// Searches and reads in one round trip: every record of the model with
    /// the given fields attached.
    pub fn search_read(
        &self,
        session: &SuiteSession,
        fields: &[String],
    ) -> Result<Vec<TargetRecord>> {
        let answer = self.execute(
            session,
            Action::SearchRead,
            vec![empty_filter()],
            Some(fields_kwargs(fields)),
        )?;
        decode_records(&answer)
    }

    /// Field metadata of the model (label and type per field).
    pub fn fields_get(&self, session: &SuiteSession) -> Result<Json> {
        let mut attributes = std::collections::BTreeMap::new();
        attributes.insert(
            "attributes".to_string(),
            Value::Array(vec![
                Value::Str("string".to_string()),
                Value::Str("type".to_string()),
            ]),
        );
        let answer = self.execute(
            session,
            Action::FieldsGet,
            vec![],
            Some(Value::Struct(attributes)),
        )?;
        Ok(answer.to_json())
    }

    /// Creates a record and returns its new id.
    pub fn create(&self, session: &SuiteSession, fields: &FieldSet) -> Result<i64> {
        let payload = Value::from_json(&Json::Object(fields.clone()));
        let answer = self.execute(session, Action::Create, vec![payload], None)?;
        answer.as_i64().ok_or_else(|| {
            SyncError::XmlRpc("create answered with a non-integer id".into())
        })
    }

    /// Overwrites fields of an existing record.
    pub fn write(&self, session: &SuiteSession, id: i64, fields: &FieldSet) -> Result<()> {
        let payload = Value::from_json(&Json::Object(fields.clone()));
        self.execute(
            session,
            Action::Write,
            vec![Value::Array(vec![Value::Int(id)]), payload],
            None,
        )?;
        Ok(())
    }

    /// Deletes the given records.
    pub fn unlink(&self, session: &SuiteSession, ids: &[i64]) -> Result<()> {
        self.execute(
            session,
            Action::Unlink,
            vec![Value::Array(ids.iter().map(|id| Value::Int(*id)).collect())],
            None,
        )?;
        Ok(())
    }
}

/// Filter matching every record: `[[]]` on the wire.
fn empty_filter() -> Value {
    Value::Array(vec![])
}

/// Filter for an exact field match: `[[field, '=', value]]` on the wire.
fn equals_filter(field: &str, value: &str) -> Value {
    Value::Array(vec![Value::Array(vec![
        Value::Str(field.to_string()),
        Value::Str("=".to_string()),
        Value::Str(value.to_string()),
    ])])
}

fn fields_kwargs(fields: &[String]) -> Value {
    let mut kwargs = std::collections::BTreeMap::new();
    kwargs.insert(
        "fields".to_string(),
        Value::Array(fields.iter().map(|f| Value::Str(f.clone())).collect()),
    );
    Value::Struct(kwargs)
}

fn decode_ids(answer: &Value) -> Result<Vec<i64>> {
    let items = answer
        .as_array()
        .ok_or_else(|| SyncError::XmlRpc("search answered with a non-array".into()))?;
    items
        .iter()
        .map(|item| {
            item.as_i64()
                .ok_or_else(|| SyncError::XmlRpc("non-integer record id".into()))
        })
        .collect()
}

fn decode_records(answer: &Value) -> Result<Vec<TargetRecord>> {
    let items = answer
        .as_array()
        .ok_or_else(|| SyncError::XmlRpc("read answered with a non-array".into()))?;
    items.iter().map(decode_record).collect()
}

fn decode_record(value: &Value) -> Result<TargetRecord> {
    let Value::Struct(members) = value else {
        return Err(SyncError::XmlRpc("record is not a struct".into()));
    };
    let id = members
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| SyncError::XmlRpc("record without an integer id".into()))?;
    let mut fields = FieldSet::new();
    for (name, member) in members {
        if name != "id" {
            fields.insert(name.clone(), member.to_json());
        }
    }
    Ok(TargetRecord { id, fields })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn session_carries_the_assigned_uid() {
        let session = SuiteSession {
            uid: 7,
            password: "pw".to_string(),
        };
        assert_eq!(session.uid(), 7);
    }

    #[test]
    fn client_reports_its_model() {
        let client = SuiteClient::new("https://suite.example.com/", "acme", "hr.applicant")
            .expect("client built");
        assert_eq!(client.model(), "hr.applicant");
    }

    #[test]
    fn exact_match_filter_has_wire_shape() {
        let filter = equals_filter("partner_name", "Dana");
        let Value::Array(clauses) = &filter else {
            panic!("expected array");
        };
        assert_eq!(
            clauses[0],
            Value::Array(vec![
                Value::Str("partner_name".into()),
                Value::Str("=".into()),
                Value::Str("Dana".into()),
            ])
        );
    }

    #[test]
    fn decodes_record_structs() {
        let mut first = BTreeMap::new();
        first.insert("id".to_string(), Value::Int(41));
        first.insert("partner_name".to_string(), Value::Str("Dana".into()));
        let answer = Value::Array(vec![Value::Struct(first)]);

        let records = decode_records(&answer).expect("decoded");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 41);
        assert_eq!(records[0].text_field("partner_name"), Some("Dana"));
    }

    #[test]
    fn record_without_id_is_an_error() {
        let answer = Value::Array(vec![Value::Struct(BTreeMap::new())]);
        assert!(matches!(
            decode_records(&answer),
            Err(SyncError::XmlRpc(_))
        ));
    }

    #[test]
    fn id_lists_decode_to_integers() {
        let answer = Value::Array(vec![Value::Int(7), Value::Int(9)]);
        assert_eq!(decode_ids(&answer).expect("decoded"), vec![7, 9]);
    }
}
