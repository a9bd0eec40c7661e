//! Minimal XML-RPC wire codec.
//!
//! Covers the subset of the protocol the business suite speaks: scalar
//! values, arrays, structs and fault responses. Faults decode into
//! [`SyncError::SuiteFault`] so callers see them as ordinary errors.

use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesDecl, BytesEnd, BytesRef, BytesStart, BytesText, Event};

use crate::error::{Result, SyncError};

/// An XML-RPC value tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Double(f64),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
    Nil,
}

impl Value {
    /// Integer content, if this value is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Array content, if this value is an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Converts a JSON value into its XML-RPC equivalent. Integral numbers
    /// stay integers; everything else keeps its type.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(value) => Value::Bool(*value),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(value) => Value::Int(value),
                None => Value::Double(number.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(value) => Value::Str(value.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(members) => Value::Struct(
                members
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Converts the value into JSON for the engine's field payloads.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(value) => serde_json::Value::from(*value),
            Value::Bool(value) => serde_json::Value::Bool(*value),
            Value::Str(value) => serde_json::Value::String(value.clone()),
            Value::Double(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Struct(members) => serde_json::Value::Object(
                members
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            ),
            Value::Nil => serde_json::Value::Null,
        }
    }
}

/// Serialises a `methodCall` document for the given method and parameters.
pub fn encode_call(method: &str, params: &[Value]) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("methodCall")))?;
    write_text_element(&mut writer, "methodName", method)?;
    writer.write_event(Event::Start(BytesStart::new("params")))?;
    for param in params {
        writer.write_event(Event::Start(BytesStart::new("param")))?;
        write_value(&mut writer, param)?;
        writer.write_event(Event::End(BytesEnd::new("param")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("params")))?;
    writer.write_event(Event::End(BytesEnd::new("methodCall")))?;
    String::from_utf8(writer.into_inner()).map_err(|error| SyncError::XmlRpc(error.to_string()))
}

/// Parses a `methodResponse` document into the single value it carries.
/// A `<fault>` response becomes [`SyncError::SuiteFault`].
pub fn decode_response(xml: &str) -> Result<Value> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut fault = false;
    loop {
        match reader.read_event()? {
            Event::Start(element) => match element.local_name().as_ref() {
                b"fault" => fault = true,
                b"value" => {
                    let value = read_value(&mut reader)?;
                    if fault {
                        return Err(fault_error(value));
                    }
                    return Ok(value);
                }
                _ => {}
            },
            Event::Eof => {
                return Err(SyncError::XmlRpc("response carried no value".into()));
            }
            _ => {}
        }
    }
}

fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    tag: &str,
    text: &str,
) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn write_value<W: std::io::Write>(writer: &mut Writer<W>, value: &Value) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("value")))?;
    match value {
        Value::Int(content) => write_text_element(writer, "int", &content.to_string())?,
        Value::Bool(content) => {
            write_text_element(writer, "boolean", if *content { "1" } else { "0" })?;
        }
        Value::Str(content) => write_text_element(writer, "string", content)?,
        Value::Double(content) => write_text_element(writer, "double", &content.to_string())?,
        Value::Nil => writer.write_event(Event::Empty(BytesStart::new("nil")))?,
        Value::Array(items) => {
            writer.write_event(Event::Start(BytesStart::new("array")))?;
            writer.write_event(Event::Start(BytesStart::new("data")))?;
            for item in items {
                write_value(writer, item)?;
            }
            writer.write_event(Event::End(BytesEnd::new("data")))?;
            writer.write_event(Event::End(BytesEnd::new("array")))?;
        }
        Value::Struct(members) => {
            writer.write_event(Event::Start(BytesStart::new("struct")))?;
            for (name, member) in members {
                writer.write_event(Event::Start(BytesStart::new("member")))?;
                write_text_element(writer, "name", name)?;
                write_value(writer, member)?;
                writer.write_event(Event::End(BytesEnd::new("member")))?;
            }
            writer.write_event(Event::End(BytesEnd::new("struct")))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("value")))?;
    Ok(())
}

/// Reads the body of a `<value>` element the reader is positioned inside of,
/// consuming the matching `</value>`.
fn read_value(reader: &mut Reader<&[u8]>) -> Result<Value> {
    let mut bare_text: Option<String> = None;
    loop {
        match reader.read_event()? {
            Event::Text(text) => {
                bare_text.get_or_insert_with(String::new).push_str(
                    &text
                        .decode()
                        .map_err(|error| SyncError::XmlRpc(error.to_string()))?,
                );
            }
            Event::GeneralRef(entity) => {
                bare_text
                    .get_or_insert_with(String::new)
                    .push_str(&resolve_entity(&entity)?);
            }
            Event::Start(element) => {
                let value = match element.local_name().as_ref() {
                    b"int" | b"i4" | b"i8" => parse_int(&read_element_text(reader, b"int")?)?,
                    b"boolean" => {
                        Value::Bool(read_element_text(reader, b"boolean")?.trim() == "1")
                    }
                    b"string" => Value::Str(read_element_text(reader, b"string")?),
                    b"double" => parse_double(&read_element_text(reader, b"double")?)?,
                    b"array" => read_array(reader)?,
                    b"struct" => read_struct(reader)?,
                    other => {
                        return Err(SyncError::XmlRpc(format!(
                            "unsupported value type '{}'",
                            String::from_utf8_lossy(other)
                        )));
                    }
                };
                consume_end(reader, b"value")?;
                return Ok(value);
            }
            Event::Empty(element) => {
                let value = match element.local_name().as_ref() {
                    b"nil" => Value::Nil,
                    b"string" => Value::Str(String::new()),
                    other => {
                        return Err(SyncError::XmlRpc(format!(
                            "unsupported empty value type '{}'",
                            String::from_utf8_lossy(other)
                        )));
                    }
                };
                consume_end(reader, b"value")?;
                return Ok(value);
            }
            // A value without a type element is a bare string.
            Event::End(element) if element.local_name().as_ref() == b"value" => {
                return Ok(Value::Str(bare_text.unwrap_or_default()));
            }
            Event::Eof => return Err(SyncError::XmlRpc("unterminated value element".into())),
            _ => {}
        }
    }
}

fn read_array(reader: &mut Reader<&[u8]>) -> Result<Value> {
    let mut items = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(element) if element.local_name().as_ref() == b"value" => {
                items.push(read_value(reader)?);
            }
            Event::End(element) if element.local_name().as_ref() == b"array" => {
                return Ok(Value::Array(items));
            }
            Event::Eof => return Err(SyncError::XmlRpc("unterminated array element".into())),
            _ => {}
        }
    }
}

fn read_struct(reader: &mut Reader<&[u8]>) -> Result<Value> {
    let mut members = BTreeMap::new();
    let mut current_name: Option<String> = None;
    loop {
        match reader.read_event()? {
            Event::Start(element) => match element.local_name().as_ref() {
                b"name" => current_name = Some(read_element_text(reader, b"name")?),
                b"value" => {
                    let name = current_name.take().ok_or_else(|| {
                        SyncError::XmlRpc("struct member value before its name".into())
                    })?;
                    members.insert(name, read_value(reader)?);
                }
                _ => {}
            },
            Event::End(element) if element.local_name().as_ref() == b"struct" => {
                return Ok(Value::Struct(members));
            }
            Event::Eof => return Err(SyncError::XmlRpc("unterminated struct element".into())),
            _ => {}
        }
    }
}

/// Accumulates the text inside a scalar element up to its closing tag. The
/// `tag` is only used for diagnostics; the closing tag is matched by depth.
fn read_element_text(reader: &mut Reader<&[u8]>, tag: &[u8]) -> Result<String> {
    let mut content = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(text) => {
                content.push_str(
                    &text
                        .decode()
                        .map_err(|error| SyncError::XmlRpc(error.to_string()))?,
                );
            }
            Event::GeneralRef(entity) => content.push_str(&resolve_entity(&entity)?),
            Event::End(_) => return Ok(content),
            Event::Eof => {
                return Err(SyncError::XmlRpc(format!(
                    "unterminated '{}' element",
                    String::from_utf8_lossy(tag)
                )));
            }
            _ => {}
        }
    }
}

/// Resolves an entity reference event into the text it stands for: numeric
/// character references plus the five predefined XML entities.
fn resolve_entity(entity: &BytesRef<'_>) -> Result<String> {
    if let Some(resolved) = entity.resolve_char_ref()? {
        return Ok(resolved.to_string());
    }
    let name = entity
        .decode()
        .map_err(|error| SyncError::XmlRpc(error.to_string()))?;
    resolve_predefined_entity(&name)
        .map(str::to_string)
        .ok_or_else(|| SyncError::XmlRpc(format!("unresolved entity '&{name};'")))
}

fn consume_end(reader: &mut Reader<&[u8]>, tag: &[u8]) -> Result<()> {
    loop {
        match reader.read_event()? {
            Event::End(element) if element.local_name().as_ref() == tag => return Ok(()),
            Event::Eof => {
                return Err(SyncError::XmlRpc(format!(
                    "missing closing tag for '{}'",
                    String::from_utf8_lossy(tag)
                )));
            }
            _ => {}
        }
    }
}

fn parse_int(text: &str) -> Result<Value> {
    text.trim()
        .parse()
        .map(Value::Int)
        .map_err(|_| SyncError::XmlRpc(format!("invalid integer literal '{text}'")))
}

fn parse_double(text: &str) -> Result<Value> {
    text.trim()
        .parse()
        .map(Value::Double)
        .map_err(|_| SyncError::XmlRpc(format!("invalid double literal '{text}'")))
}

fn fault_error(value: Value) -> SyncError {
    if let Value::Struct(members) = &value {
        let code = members.get("faultCode").and_then(Value::as_i64).unwrap_or(0);
        let message = match members.get("faultString") {
            Some(Value::Str(message)) => message.clone(),
            _ => "unknown fault".to_string(),
        };
        return SyncError::SuiteFault { code, message };
    }
    SyncError::XmlRpc("fault response without a fault struct".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_method_call_with_scalars_and_struct() {
        let mut fields = BTreeMap::new();
        fields.insert("stage_id".to_string(), Value::Int(3));
        let xml = encode_call(
            "execute_kw",
            &[Value::Str("db".into()), Value::Struct(fields)],
        )
        .expect("encoded");

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<methodName>execute_kw</methodName>"));
        assert!(xml.contains("<value><string>db</string></value>"));
        assert!(xml.contains("<name>stage_id</name><value><int>3</int></value>"));
    }

    #[test]
    fn encoding_escapes_markup_in_strings() {
        let xml = encode_call("auth", &[Value::Str("a<b&c".into())]).expect("encoded");
        assert!(xml.contains("<string>a&lt;b&amp;c</string>"));
    }

    #[test]
    fn decodes_integer_response() {
        let xml = "<?xml version=\"1.0\"?><methodResponse><params><param>\
                   <value><int>7</int></value></param></params></methodResponse>";
        assert_eq!(decode_response(xml).expect("decoded"), Value::Int(7));
    }

    #[test]
    fn decodes_array_of_record_structs() {
        let xml = "<methodResponse><params><param><value><array><data>\
                   <value><struct>\
                   <member><name>id</name><value><int>41</int></value></member>\
                   <member><name>partner_name</name><value><string>Dana</string></value></member>\
                   </struct></value>\
                   <value><struct>\
                   <member><name>id</name><value><int>42</int></value></member>\
                   <member><name>active</name><value><boolean>1</boolean></value></member>\
                   </struct></value>\
                   </data></array></value></param></params></methodResponse>";

        let value = decode_response(xml).expect("decoded");
        let records = value.as_array().expect("array");
        assert_eq!(records.len(), 2);
        let Value::Struct(first) = &records[0] else {
            panic!("expected struct");
        };
        assert_eq!(first.get("id"), Some(&Value::Int(41)));
        assert_eq!(first.get("partner_name"), Some(&Value::Str("Dana".into())));
    }

    #[test]
    fn decoding_resolves_escaped_entities() {
        let xml = "<methodResponse><params><param><value>\
                   <string>a&lt;b&amp;c</string></value></param></params></methodResponse>";
        assert_eq!(
            decode_response(xml).expect("decoded"),
            Value::Str("a<b&c".into())
        );
    }

    #[test]
    fn bare_value_text_decodes_as_string() {
        let xml = "<methodResponse><params><param><value>plain</value></param>\
                   </params></methodResponse>";
        assert_eq!(
            decode_response(xml).expect("decoded"),
            Value::Str("plain".into())
        );
    }

    #[test]
    fn fault_decodes_into_suite_fault() {
        let xml = "<methodResponse><fault><value><struct>\
                   <member><name>faultCode</name><value><int>2</int></value></member>\
                   <member><name>faultString</name><value><string>Access denied</string></value></member>\
                   </struct></value></fault></methodResponse>";

        match decode_response(xml) {
            Err(SyncError::SuiteFault { code, message }) => {
                assert_eq!(code, 2);
                assert_eq!(message, "Access denied");
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn json_conversion_keeps_integer_and_boolean_types() {
        let json = serde_json::json!({"stage_id": 3, "active": true, "note": null});
        let value = Value::from_json(&json);
        let Value::Struct(members) = &value else {
            panic!("expected struct");
        };
        assert_eq!(members.get("stage_id"), Some(&Value::Int(3)));
        assert_eq!(members.get("active"), Some(&Value::Bool(true)));
        assert_eq!(members.get("note"), Some(&Value::Nil));
        assert_eq!(value.to_json(), json);
    }
}
