//! Property model - typed, defaulted, lazily-resolved resource attributes
//!
//! Defaults are closures over the property set rather than pre-formatted
//! values, so a default such as "computername equals hostname" sees the
//! hostname the caller actually assigned. Resolved values are memoized: a
//! property reads the same on every access within one resource instance.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A property value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Not set and no default
    Null,
    Bool(bool),
    Integer(i64),
    String(String),
    List(Vec<String>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short name of the variant, used in type errors
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::String(_) => "string",
            Self::List(_) => "list",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::List(items) => write!(f, "{items:?}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

impl From<Vec<&str>> for Value {
    fn from(items: Vec<&str>) -> Self {
        Self::List(items.into_iter().map(String::from).collect())
    }
}

/// Type constraint declared for a property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyType {
    String,
    Bool,
    Integer,
    StringList,
    /// A string restricted to a fixed set of symbols (e.g. `force`)
    Choice(&'static [&'static str]),
    /// Any of the listed types
    AnyOf(Vec<PropertyType>),
}

impl PropertyType {
    /// Check whether a value satisfies this constraint
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::String, Value::String(_))
            | (Self::Bool, Value::Bool(_))
            | (Self::Integer, Value::Integer(_))
            | (Self::StringList, Value::List(_)) => true,
            (Self::Choice(choices), Value::String(s)) => choices.contains(&s.as_str()),
            (Self::AnyOf(kinds), v) => kinds.iter().any(|k| k.accepts(v)),
            _ => false,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Bool => write!(f, "bool"),
            Self::Integer => write!(f, "integer"),
            Self::StringList => write!(f, "list of strings"),
            Self::Choice(choices) => write!(f, "one of [{}]", choices.join(", ")),
            Self::AnyOf(kinds) => {
                let names: Vec<String> = kinds.iter().map(ToString::to_string).collect();
                write!(f, "{}", names.join(" | "))
            }
        }
    }
}

/// Closure computing a default from the (partially resolved) property set
pub type DefaultFn = Arc<dyn Fn(&mut PropertySet) -> Result<Value> + Send + Sync>;

/// Default expression of a property, evaluated on first read
#[derive(Clone)]
pub enum DefaultValue {
    Literal(Value),
    /// Equals another property's resolved value
    NameOf(String),
    Computed(DefaultFn),
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Self::NameOf(p) => f.debug_tuple("NameOf").field(p).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Declaration of a single property
#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub name: String,
    pub kind: PropertyType,
    pub default: Option<DefaultValue>,
    /// Receives the resource name when nothing else supplies a value
    pub name_property: bool,
    pub required: bool,
    /// Whether the property is part of the desired-state report
    pub desired_state: bool,
    pub description: String,
}

impl PropertySpec {
    pub fn new(name: &str, kind: PropertyType) -> Self {
        Self {
            name: name.to_string(),
            kind,
            default: None,
            name_property: false,
            required: false,
            desired_state: true,
            description: String::new(),
        }
    }

    pub fn name_property(mut self) -> Self {
        self.name_property = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    /// Default to another property's value
    pub fn default_from(mut self, property: &str) -> Self {
        self.default = Some(DefaultValue::NameOf(property.to_string()));
        self
    }

    pub fn computed<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut PropertySet) -> Result<Value> + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Computed(Arc::new(f)));
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn not_desired_state(mut self) -> Self {
        self.desired_state = false;
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

/// The properties of one resource instance
#[derive(Debug, Clone)]
pub struct PropertySet {
    resource_name: String,
    specs: Vec<PropertySpec>,
    /// Explicit assignments and memoized defaults
    values: HashMap<String, Value>,
    explicit: HashSet<String>,
    /// Properties whose defaults are currently being evaluated
    resolving: Vec<String>,
    frozen: bool,
}

impl PropertySet {
    pub fn new(resource_name: &str, specs: Vec<PropertySpec>) -> Self {
        Self {
            resource_name: resource_name.to_string(),
            specs,
            values: HashMap::new(),
            explicit: HashSet::new(),
            resolving: Vec::new(),
            frozen: false,
        }
    }

    /// Name of the resource owning these properties
    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn specs(&self) -> &[PropertySpec] {
        &self.specs
    }

    fn spec(&self, name: &str) -> Result<&PropertySpec> {
        self.specs
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::UnknownProperty(name.to_string()))
    }

    /// Read a property, evaluating and memoizing its default if needed
    pub fn get(&mut self, name: &str) -> Result<Value> {
        let spec = self.spec(name)?;
        let kind = spec.kind.clone();
        let default = spec.default.clone();
        let name_property = spec.name_property;

        if let Some(value) = self.values.get(name) {
            return Ok(value.clone());
        }

        if self.resolving.iter().any(|p| p == name) {
            let mut chain = self.resolving.clone();
            chain.push(name.to_string());
            return Err(Error::CyclicDefault {
                property: name.to_string(),
                chain: chain.join(" -> "),
            });
        }

        self.resolving.push(name.to_string());
        let evaluated = self.evaluate_default(default, name_property);
        self.resolving.pop();
        let value = evaluated?;

        if !value.is_null() && !kind.accepts(&value) {
            return Err(Error::TypeMismatch {
                property: name.to_string(),
                expected: kind.to_string(),
                actual: value.to_string(),
            });
        }

        log::trace!("{}: resolved {} = {}", self.resource_name, name, value);
        self.values.insert(name.to_string(), value.clone());
        Ok(value)
    }

    fn evaluate_default(&mut self, default: Option<DefaultValue>, name_property: bool) -> Result<Value> {
        match default {
            Some(DefaultValue::Literal(value)) => Ok(value),
            Some(DefaultValue::NameOf(other)) => self.get(&other),
            Some(DefaultValue::Computed(f)) => f(self),
            None if name_property => Ok(Value::String(self.resource_name.clone())),
            None => Ok(Value::Null),
        }
    }

    /// Read a string property; `Null` is an error here
    pub fn get_string(&mut self, name: &str) -> Result<String> {
        match self.get(name)? {
            Value::String(s) => Ok(s),
            other => Err(self.mismatch(name, other)),
        }
    }

    /// Read an optional string property
    pub fn get_opt_string(&mut self, name: &str) -> Result<Option<String>> {
        match self.get(name)? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(self.mismatch(name, other)),
        }
    }

    pub fn get_bool(&mut self, name: &str) -> Result<bool> {
        match self.get(name)? {
            Value::Bool(b) => Ok(b),
            other => Err(self.mismatch(name, other)),
        }
    }

    /// Read a list property; unset reads as empty
    pub fn get_list(&mut self, name: &str) -> Result<Vec<String>> {
        match self.get(name)? {
            Value::Null => Ok(Vec::new()),
            Value::List(items) => Ok(items),
            other => Err(self.mismatch(name, other)),
        }
    }

    fn mismatch(&self, name: &str, value: Value) -> Error {
        let expected = self
            .spec(name)
            .map(|s| s.kind.to_string())
            .unwrap_or_default();
        Error::TypeMismatch {
            property: name.to_string(),
            expected,
            actual: value.to_string(),
        }
    }

    /// Assign a property. Assigning `Null` clears it back to its default.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        if self.frozen {
            return Err(Error::PropertiesFrozen {
                resource: self.resource_name.clone(),
            });
        }
        let value = value.into();
        let spec = self.spec(name)?;

        if !value.is_null() && !spec.kind.accepts(&value) {
            return Err(Error::TypeMismatch {
                property: name.to_string(),
                expected: spec.kind.to_string(),
                actual: value.to_string(),
            });
        }

        // Memoized defaults may depend on the old value
        let explicit = &self.explicit;
        self.values.retain(|k, _| explicit.contains(k));

        if value.is_null() {
            self.values.remove(name);
            self.explicit.remove(name);
        } else {
            self.values.insert(name.to_string(), value);
            self.explicit.insert(name.to_string());
        }
        Ok(())
    }

    /// Whether the caller assigned this property explicitly
    pub fn is_set(&self, name: &str) -> bool {
        self.explicit.contains(name)
    }

    /// Resolve every declared property, checking required ones
    pub fn resolve_all(&mut self) -> Result<BTreeMap<String, Value>> {
        let names: Vec<(String, bool)> = self
            .specs
            .iter()
            .map(|s| (s.name.clone(), s.required))
            .collect();

        let mut resolved = BTreeMap::new();
        for (name, required) in names {
            let value = self.get(&name)?;
            if required && value.is_null() {
                return Err(Error::MissingProperty(name));
            }
            resolved.insert(name, value);
        }
        Ok(resolved)
    }

    /// Reject further assignments
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn hostname_specs() -> Vec<PropertySpec> {
        vec![
            PropertySpec::new("hostname", PropertyType::String).name_property(),
            PropertySpec::new("computername", PropertyType::String).default_from("hostname"),
            PropertySpec::new("compile_time", PropertyType::Bool)
                .default(true)
                .not_desired_state(),
        ]
    }

    #[test]
    fn test_name_property_defaults_to_resource_name() {
        let mut props = PropertySet::new("mymac", hostname_specs());
        assert_eq!(props.get("hostname").unwrap(), Value::from("mymac"));
        assert_eq!(props.get("computername").unwrap(), Value::from("mymac"));
    }

    #[test]
    fn test_default_follows_explicit_sibling() {
        let mut props = PropertySet::new("mymac", hostname_specs());
        props.set("hostname", "build-01").unwrap();
        assert_eq!(props.get_string("computername").unwrap(), "build-01");

        props.set("computername", "Build Box").unwrap();
        assert_eq!(props.get_string("computername").unwrap(), "Build Box");
    }

    #[test]
    fn test_set_invalidates_memoized_defaults() {
        let mut props = PropertySet::new("mymac", hostname_specs());
        assert_eq!(props.get_string("computername").unwrap(), "mymac");
        props.set("hostname", "other").unwrap();
        assert_eq!(props.get_string("computername").unwrap(), "other");
    }

    #[test]
    fn test_type_mismatch_on_set() {
        let mut props = PropertySet::new("mymac", hostname_specs());
        let err = props.set("compile_time", "yes").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref property, .. } if property == "compile_time"));
        // The default is untouched
        assert!(props.get_bool("compile_time").unwrap());
    }

    #[test]
    fn test_unknown_property() {
        let mut props = PropertySet::new("mymac", hostname_specs());
        assert!(matches!(props.get("nope"), Err(Error::UnknownProperty(_))));
        assert!(matches!(props.set("nope", true), Err(Error::UnknownProperty(_))));
    }

    #[test]
    fn test_cyclic_default_is_an_error() {
        let specs = vec![
            PropertySpec::new("a", PropertyType::String).default_from("b"),
            PropertySpec::new("b", PropertyType::String).default_from("c"),
            PropertySpec::new("c", PropertyType::String).default_from("a"),
        ];
        let mut props = PropertySet::new("x", specs);
        match props.get("a") {
            Err(Error::CyclicDefault { property, chain }) => {
                assert_eq!(property, "a");
                assert_eq!(chain, "a -> b -> c -> a");
            }
            other => panic!("expected cyclic default, got {other:?}"),
        }
    }

    #[test]
    fn test_computed_default_is_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let specs = vec![
            PropertySpec::new("hostname", PropertyType::String).name_property(),
            PropertySpec::new("shortname", PropertyType::String).computed(move |props| {
                counter.fetch_add(1, Ordering::SeqCst);
                let host = props.get_string("hostname")?;
                Ok(Value::String(host.split('.').next().unwrap_or_default().to_string()))
            }),
        ];
        let mut props = PropertySet::new("awesome-mac01.example.com", specs);

        assert_eq!(props.get_string("shortname").unwrap(), "awesome-mac01");
        assert_eq!(props.get_string("shortname").unwrap(), "awesome-mac01");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_computed_default_type_checked() {
        let specs = vec![PropertySpec::new("flag", PropertyType::Bool).computed(|_| Ok(Value::from("no")))];
        let mut props = PropertySet::new("x", specs);
        assert!(matches!(props.get("flag"), Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn test_required_property_missing() {
        let specs = vec![
            PropertySpec::new("license", PropertyType::Choice(&["accept"])).required(),
        ];
        let mut props = PropertySet::new("x", specs);
        assert!(matches!(props.resolve_all(), Err(Error::MissingProperty(ref p)) if p == "license"));

        props.set("license", "accept").unwrap();
        let resolved = props.resolve_all().unwrap();
        assert_eq!(resolved["license"], Value::from("accept"));
    }

    #[test]
    fn test_frozen_rejects_set() {
        let mut props = PropertySet::new("mymac", hostname_specs());
        props.resolve_all().unwrap();
        props.freeze();
        assert!(matches!(props.set("hostname", "x"), Err(Error::PropertiesFrozen { .. })));
        assert_eq!(props.get_string("hostname").unwrap(), "mymac");
    }

    #[test]
    fn test_null_clears_explicit_value() {
        let mut props = PropertySet::new("mymac", hostname_specs());
        props.set("hostname", "other").unwrap();
        assert!(props.is_set("hostname"));
        props.set("hostname", Value::Null).unwrap();
        assert!(!props.is_set("hostname"));
        assert_eq!(props.get_string("hostname").unwrap(), "mymac");
    }

    #[test]
    fn test_union_and_choice_types() {
        let binlink = PropertyType::AnyOf(vec![PropertyType::Bool, PropertyType::Choice(&["force"])]);
        assert!(binlink.accepts(&Value::Bool(true)));
        assert!(binlink.accepts(&Value::from("force")));
        assert!(!binlink.accepts(&Value::from("always")));
        assert_eq!(binlink.to_string(), "bool | one of [force]");
    }

    #[test]
    fn test_value_untagged_serde() {
        let json = serde_json::to_string(&Value::from(vec!["--binlink"])).unwrap();
        assert_eq!(json, r#"["--binlink"]"#);
        let v: Value = serde_json::from_str("true").unwrap();
        assert_eq!(v, Value::Bool(true));
        let v: Value = serde_json::from_str("null").unwrap();
        assert!(v.is_null());
    }
}
