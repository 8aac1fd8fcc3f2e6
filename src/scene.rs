//! Schema Loader - Structural Parsing Only
//!
//! Turns raw JSON into a `SceneDocument`. No rule is consulted here; the only
//! failures are the ones that make a document impossible to build.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Failed to read scene file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A property value as it appeared in the scene input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    pub fn kind(&self) -> &'static str {
        match self {
            PropertyValue::Null => "null",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Number(_) => "number",
            PropertyValue::String(_) => "string",
            PropertyValue::List(_) => "list",
            PropertyValue::Map(_) => "map",
        }
    }

    /// Numeric view of the value. Numeric strings are coerced.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            PropertyValue::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            PropertyValue::Bool(_) | PropertyValue::Number(_) | PropertyValue::String(_)
        )
    }

    /// Membership test against one entry of an allowed set.
    ///
    /// A numeric entry accepts a numeric string; everything else compares
    /// by exact value.
    pub fn matches(&self, allowed: &PropertyValue) -> bool {
        match (allowed, self) {
            (PropertyValue::Number(a), v) => v.as_number() == Some(*a),
            (PropertyValue::String(a), PropertyValue::String(b)) => a == b,
            (PropertyValue::Bool(a), PropertyValue::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => write!(f, "null"),
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Number(n) => write!(f, "{}", n),
            PropertyValue::String(s) => write!(f, "'{}'", s),
            PropertyValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            PropertyValue::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&Value> for PropertyValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => PropertyValue::Null,
            Value::Bool(b) => PropertyValue::Bool(*b),
            // serde_json numbers are always representable as f64
            Value::Number(n) => PropertyValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => PropertyValue::String(s.clone()),
            Value::Array(items) => PropertyValue::List(items.iter().map(Self::from).collect()),
            Value::Object(map) => PropertyValue::Map(
                map.iter().map(|(k, v)| (k.clone(), Self::from(v))).collect(),
            ),
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        PropertyValue::Number(n)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: String,
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Element {
    pub fn new(id: impl Into<String>, element_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            element_type: element_type.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}

/// A loaded scene. Validation only ever borrows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDocument {
    pub scene_id: String,
    pub resolution: Resolution,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_space: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u64>,
    pub elements: Vec<Element>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, PropertyValue>,
}

impl SceneDocument {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            scene_id: UNKNOWN_SCENE_ID.to_string(),
            resolution,
            color_space: None,
            frame_rate: None,
            frame_count: None,
            elements: vec![],
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_color_space(mut self, color_space: impl Into<String>) -> Self {
        self.color_space = Some(color_space.into());
        self
    }

    pub fn with_element(mut self, element: Element) -> Self {
        self.elements.push(element);
        self
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }
}

pub const UNKNOWN_SCENE_ID: &str = "unknown";

const ELEMENT_KEYS: [&str; 5] = ["id", "element_id", "type", "element_type", "properties"];

/// Parse a scene from a JSON string.
pub fn load(raw: &str) -> Result<SceneDocument, LoadError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| LoadError::MalformedInput(e.to_string()))?;
    load_value(&value)
}

pub fn load_file(path: &Path) -> Result<SceneDocument, LoadError> {
    let content = fs::read_to_string(path)?;
    load(&content)
}

/// Build a scene from an already-parsed JSON value.
pub fn load_value(value: &Value) -> Result<SceneDocument, LoadError> {
    let root = value.as_object().ok_or_else(|| {
        LoadError::MalformedInput(format!("scene must be a JSON object, got {}", json_kind(value)))
    })?;

    let resolution = field(root, &["resolution"])
        .ok_or_else(|| LoadError::Schema("missing required field 'resolution'".into()))
        .and_then(parse_resolution)?;

    let elements = field(root, &["elements"])
        .ok_or_else(|| LoadError::Schema("missing required field 'elements'".into()))
        .and_then(parse_elements)?;

    let color_space = optional_string(root, &["colorSpace", "color_space"])?;
    let scene_id = optional_string(root, &["sceneId", "scene_id"])?
        .unwrap_or_else(|| UNKNOWN_SCENE_ID.to_string());

    let frame_rate = match field(root, &["frameRate", "frame_rate"]) {
        None | Some(Value::Null) => None,
        Some(v) => Some(coerce_f64("frameRate", v)?),
    };

    let frame_count = match field(root, &["frameCount", "frame_count"]) {
        None | Some(Value::Null) => None,
        Some(v) => Some(coerce_u64("frameCount", v)?),
    };

    let metadata = match field(root, &["metadata"]) {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(map)) => to_property_map(map),
        Some(other) => {
            return Err(LoadError::Schema(format!(
                "'metadata' must be an object, got {}",
                json_kind(other)
            )))
        }
    };

    Ok(SceneDocument {
        scene_id,
        resolution,
        color_space,
        frame_rate,
        frame_count,
        elements,
        metadata,
    })
}

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k))
}

fn optional_string(obj: &Map<String, Value>, keys: &[&str]) -> Result<Option<String>, LoadError> {
    match field(obj, keys) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(LoadError::Schema(format!(
            "'{}' must be a string, got {}",
            keys[0],
            json_kind(other)
        ))),
    }
}

fn parse_resolution(value: &Value) -> Result<Resolution, LoadError> {
    let obj = value.as_object().ok_or_else(|| {
        LoadError::Schema(format!("'resolution' must be an object, got {}", json_kind(value)))
    })?;

    let dimension = |name: &str| -> Result<u32, LoadError> {
        let v = obj
            .get(name)
            .ok_or_else(|| LoadError::Schema(format!("missing required field 'resolution.{}'", name)))?;
        let n = coerce_u64(&format!("resolution.{}", name), v)?;
        u32::try_from(n).map_err(|_| {
            LoadError::Schema(format!("'resolution.{}' is too large: {}", name, n))
        })
    };

    Ok(Resolution::new(dimension("width")?, dimension("height")?))
}

fn parse_elements(value: &Value) -> Result<Vec<Element>, LoadError> {
    let items = value.as_array().ok_or_else(|| {
        LoadError::Schema(format!("'elements' must be an array, got {}", json_kind(value)))
    })?;

    let mut seen = HashSet::new();
    let mut elements = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let element = parse_element(index, item)?;
        if !seen.insert(element.id.clone()) {
            return Err(LoadError::Schema(format!(
                "duplicate element id '{}' at elements[{}]",
                element.id, index
            )));
        }
        elements.push(element);
    }

    Ok(elements)
}

fn parse_element(index: usize, value: &Value) -> Result<Element, LoadError> {
    let obj = value.as_object().ok_or_else(|| {
        LoadError::Schema(format!("elements[{}] must be an object, got {}", index, json_kind(value)))
    })?;

    let id = match field(obj, &["id", "element_id"]) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::String(_)) => {
            return Err(LoadError::Schema(format!("elements[{}].id must not be empty", index)))
        }
        Some(other) => {
            return Err(LoadError::Schema(format!(
                "elements[{}].id must be a string, got {}",
                index,
                json_kind(other)
            )))
        }
        None => return Err(LoadError::Schema(format!("elements[{}] is missing 'id'", index))),
    };

    let element_type = match field(obj, &["type", "element_type"]) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(LoadError::Schema(format!(
                "elements[{}].type must be a string, got {}",
                index,
                json_kind(other)
            )))
        }
        None => return Err(LoadError::Schema(format!("elements[{}] is missing 'type'", index))),
    };

    let mut properties = match obj.get("properties") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(map)) => to_property_map(map),
        Some(other) => {
            return Err(LoadError::Schema(format!(
                "elements[{}].properties must be an object, got {}",
                index,
                json_kind(other)
            )))
        }
    };

    // Element-level fields such as position or dimensions are folded into
    // the property bag; an explicit property of the same name wins.
    for (key, v) in obj {
        if !ELEMENT_KEYS.contains(&key.as_str()) {
            properties.entry(key.clone()).or_insert_with(|| PropertyValue::from(v));
        }
    }

    Ok(Element {
        id,
        element_type,
        properties,
    })
}

fn to_property_map(map: &Map<String, Value>) -> BTreeMap<String, PropertyValue> {
    map.iter().map(|(k, v)| (k.clone(), PropertyValue::from(v))).collect()
}

fn coerce_u64(name: &str, value: &Value) -> Result<u64, LoadError> {
    let coerced = match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    coerced.ok_or_else(|| {
        LoadError::Schema(format!("'{}' must be a non-negative integer, got {}", name, value))
    })
}

fn coerce_f64(name: &str, value: &Value) -> Result<f64, LoadError> {
    let coerced = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    };
    coerced.ok_or_else(|| LoadError::Schema(format!("'{}' must be a number, got {}", name, value)))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
