//! Client for the board service's GraphQL HTTP endpoint.
//!
//! Every operation posts a `{query, variables}` JSON document and returns
//! either the parsed `data` tree or [`SyncError::BoardApi`] on a non-success
//! status. The client carries no state beyond the endpoint and key.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::model::RemoteItem;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the work-tracking board service.
pub struct BoardClient {
    http: reqwest::blocking::Client,
    api_url: String,
    api_key: String,
}

impl BoardClient {
    /// Creates a client for the given endpoint, authenticating every request
    /// with the given API key.
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn query(&self, query: &str, variables: Option<Value>) -> Result<Value> {
        let mut body = json!({ "query": query });
        if let Some(variables) = variables {
            body["variables"] = variables;
        }
        debug!(%query, "posting board query");
        let response = self
            .http
            .post(&self.api_url)
            .header("Authorization", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::BoardApi {
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }
        Ok(response.json()?)
    }

    /// Lists all boards visible to the key as (id, name) pairs.
    pub fn boards(&self) -> Result<Vec<(String, String)>> {
        let response = self.query("{ boards { id name } }", None)?;
        parse_board_pairs(&response)
    }

    /// Lists the columns of a board as (id, title) pairs, so an operator can
    /// pick out the status column id for the run configuration.
    pub fn board_columns(&self, board_id: u64) -> Result<Vec<(String, String)>> {
        let query = format!("{{ boards(ids: {board_id}) {{ columns {{ id title }} }} }}");
        let response = self.query(&query, None)?;
        let boards = boards_node(&response)?;
        let columns = boards
            .first()
            .and_then(|board| board.get("columns"))
            .and_then(Value::as_array)
            .ok_or_else(|| SyncError::BoardResponse("missing columns node".into()))?;
        Ok(columns
            .iter()
            .filter_map(|column| {
                Some((
                    node_string(column.get("id")?)?,
                    node_string(column.get("title")?)?,
                ))
            })
            .collect())
    }

    /// Fetches the items of a board with names only.
    pub fn items_with_names(&self, board_id: u64) -> Result<Vec<RemoteItem>> {
        let query = format!("{{ boards(ids: {board_id}) {{ items_page {{ items {{ id name }} }} }} }}");
        let response = self.query(&query, None)?;
        parse_items(&response)
    }

    /// Fetches the items of a board along with the rendered text of one
    /// column. Items whose column carries no value come back without an
    /// entry for it in [`RemoteItem::fields`].
    pub fn items_with_column(&self, board_id: u64, column_id: &str) -> Result<Vec<RemoteItem>> {
        let query = format!(
            "{{ boards(ids: {board_id}) {{ items_page {{ items {{ id name \
             column_values(ids: [\"{column_id}\"]) {{ text column {{ id }} }} }} }} }} }}"
        );
        let response = self.query(&query, None)?;
        parse_items(&response)
    }

    /// Creates a new public board and returns its id.
    pub fn create_board(&self, board_name: &str) -> Result<u64> {
        let query = "mutation ($boardName: String!) { \
                     create_board (board_name: $boardName, board_kind: public) { id } }";
        let response = self.query(query, Some(json!({ "boardName": board_name })))?;
        mutation_id(&response, "create_board")
    }

    /// Creates an item carrying only a name.
    pub fn create_item(&self, board_id: u64, item_name: &str) -> Result<u64> {
        let query = format!(
            "mutation ($itemName: String!) {{ \
             create_item (board_id: {board_id}, item_name: $itemName) {{ id }} }}"
        );
        let response = self.query(&query, Some(json!({ "itemName": item_name })))?;
        mutation_id(&response, "create_item")
    }

    /// Creates an item with column values. The board service expects the
    /// values as a JSON document serialised into a string variable.
    pub fn create_item_with_values(
        &self,
        board_id: u64,
        item_name: &str,
        values: &Value,
    ) -> Result<u64> {
        let query = format!(
            "mutation ($itemName: String!, $columnVals: JSON!) {{ \
             create_item (board_id: {board_id}, item_name: $itemName, \
             column_values: $columnVals) {{ id }} }}"
        );
        let variables = json!({
            "itemName": item_name,
            "columnVals": serde_json::to_string(values)?,
        });
        let response = self.query(&query, Some(variables))?;
        mutation_id(&response, "create_item")
    }

    /// Overwrites the rendered value of one column on one item.
    pub fn change_column_value(
        &self,
        board_id: u64,
        item_id: u64,
        column_id: &str,
        value: &str,
    ) -> Result<()> {
        let query = format!(
            "mutation ($value: String!) {{ \
             change_simple_column_value (item_id: {item_id}, board_id: {board_id}, \
             column_id: \"{column_id}\", value: $value) {{ id }} }}"
        );
        self.query(&query, Some(json!({ "value": value })))?;
        Ok(())
    }

    /// Deletes an item by id.
    pub fn delete_item(&self, item_id: u64) -> Result<()> {
        let query = format!("mutation {{ delete_item (item_id: {item_id}) {{ id }} }}");
        self.query(&query, None)?;
        Ok(())
    }
}

/// Extracts the `data.boards` array from a response tree.
fn boards_node(response: &Value) -> Result<&Vec<Value>> {
    response
        .get("data")
        .and_then(|data| data.get("boards"))
        .and_then(Value::as_array)
        .ok_or_else(|| SyncError::BoardResponse("missing data.boards node".into()))
}

/// Parses a board listing into (id, name) pairs.
pub(crate) fn parse_board_pairs(response: &Value) -> Result<Vec<(String, String)>> {
    Ok(boards_node(response)?
        .iter()
        .filter_map(|board| {
            Some((
                node_string(board.get("id")?)?,
                node_string(board.get("name")?)?,
            ))
        })
        .collect())
}

/// Parses the `data.boards[].items_page.items[]` tree into [`RemoteItem`]s.
/// A response with zero boards or zero items yields an empty vec.
pub(crate) fn parse_items(response: &Value) -> Result<Vec<RemoteItem>> {
    let mut items = Vec::new();
    for board in boards_node(response)? {
        let Some(page_items) = board
            .get("items_page")
            .and_then(|page| page.get("items"))
            .and_then(Value::as_array)
        else {
            continue;
        };
        for entry in page_items {
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| SyncError::BoardResponse("item without a name".into()))?;
            let id = entry
                .get("id")
                .and_then(node_string)
                .unwrap_or_default();
            let mut item = RemoteItem::new(id, name);
            if let Some(columns) = entry.get("column_values").and_then(Value::as_array) {
                for column in columns {
                    let Some(column_id) = column
                        .get("column")
                        .and_then(|c| c.get("id"))
                        .and_then(Value::as_str)
                    else {
                        continue;
                    };
                    if let Some(text) = column.get("text").and_then(Value::as_str) {
                        item.fields.insert(column_id.to_string(), text.to_string());
                    }
                }
            }
            items.push(item);
        }
    }
    Ok(items)
}

/// Reads the id out of a mutation answer such as `data.create_item.id`.
fn mutation_id(response: &Value, mutation: &str) -> Result<u64> {
    let id = response
        .get("data")
        .and_then(|data| data.get(mutation))
        .and_then(|node| node.get("id"))
        .and_then(node_string)
        .ok_or_else(|| SyncError::BoardResponse(format!("missing {mutation} id")))?;
    id.parse()
        .map_err(|_| SyncError::BoardResponse(format!("non-numeric {mutation} id '{id}'")))
}

/// Board ids arrive as strings or numbers depending on the operation.
fn node_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_items_with_column_text() {
        let response = serde_json::json!({
            "data": { "boards": [ { "items_page": { "items": [
                {
                    "id": "101",
                    "name": "Chaves",
                    "column_values": [
                        { "text": "New", "column": { "id": "status" } }
                    ]
                },
                {
                    "id": "102",
                    "name": "Dana",
                    "column_values": []
                }
            ] } } ] }
        });

        let items = parse_items(&response).expect("parsed");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Chaves");
        assert_eq!(items[0].column_text("status"), Some("New"));
        assert_eq!(items[1].column_text("status"), None);
    }

    #[test]
    fn column_without_text_stays_absent() {
        let response = serde_json::json!({
            "data": { "boards": [ { "items_page": { "items": [
                {
                    "id": "103",
                    "name": "Andy",
                    "column_values": [
                        { "text": null, "column": { "id": "status" } }
                    ]
                }
            ] } } ] }
        });

        let items = parse_items(&response).expect("parsed");
        assert_eq!(items[0].column_text("status"), None);
    }

    #[test]
    fn board_listing_accepts_string_and_numeric_ids() {
        let response = serde_json::json!({
            "data": { "boards": [
                { "id": "5990805927", "name": "Applicants" },
                { "id": 42, "name": "Employees" }
            ] }
        });

        let boards = parse_board_pairs(&response).expect("parsed");
        assert_eq!(
            boards,
            vec![
                ("5990805927".to_string(), "Applicants".to_string()),
                ("42".to_string(), "Employees".to_string()),
            ]
        );
    }

    #[test]
    fn zero_boards_yield_no_items() {
        let response = serde_json::json!({ "data": { "boards": [] } });
        assert!(parse_items(&response).expect("parsed").is_empty());
    }

    #[test]
    fn malformed_tree_is_an_error() {
        let response = serde_json::json!({ "data": {} });
        assert!(matches!(
            parse_items(&response),
            Err(SyncError::BoardResponse(_))
        ));
    }
}
