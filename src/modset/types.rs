//! Declarative module spec: node models, term models, actions and routes.

use serde::{Deserialize, Serialize};

pub const STATUS_DISABLED: u8 = 0;
pub const STATUS_ENABLED: u8 = 1;

/// Module that can never be disabled.
pub const CORE_GENERAL_MODULE: &str = "core/general";

/// Permalink scheme value meaning "no permalink".
pub const PERMALINK_OFF: &str = "off";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpecMeta {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub updated: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Spec {
    pub meta: SpecMeta,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "srvname")]
    pub srv_name: String,
    #[serde(default)]
    pub status: u8,
    #[serde(default)]
    pub theme_config: String,
    #[serde(default)]
    pub node_models: Vec<NodeModel>,
    #[serde(default)]
    pub term_models: Vec<TermModel>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub router: Router,
}

impl Spec {
    pub fn new(name: &str, title: &str, srv_name: &str) -> Self {
        Self {
            meta: SpecMeta {
                name: name.to_string(),
                ..SpecMeta::default()
            },
            title: title.to_string(),
            srv_name: srv_name.to_string(),
            ..Spec::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn is_enabled(&self) -> bool {
        self.status == STATUS_ENABLED
    }

    pub fn node_model(&self, name: &str) -> Option<&NodeModel> {
        self.node_models.iter().find(|m| m.name == name)
    }

    pub fn term_model(&self, name: &str) -> Option<&TermModel> {
        self.term_models.iter().find(|m| m.name == name)
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn route(&self, path: &str) -> Option<&Route> {
        self.router.routes.iter().find(|r| r.path == path)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Insertion-ordered string map.
///
/// Order is kept for serialization only; two lists holding the same pairs
/// in a different order compare equal. Keys are unique: a repeated key in a
/// decoded document keeps its last value at its first position.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct KvList(Vec<KvPair>);

impl<'de> Deserialize<'de> for KvList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let pairs = Vec::<KvPair>::deserialize(deserializer)?;
        Ok(pairs.into_iter().map(|kv| (kv.key, kv.value)).collect())
    }
}

impl PartialEq for KvList {
    fn eq(&self, other: &Self) -> bool {
        let covers = |a: &KvList, b: &KvList| {
            a.0.iter().all(|kv| b.get(&kv.key) == Some(kv.value.as_str()))
        };
        self.0.len() == other.0.len() && covers(self, other) && covers(other, self)
    }
}

impl Eq for KvList {}

impl KvList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| kv.value.as_str())
    }

    /// Replaces the value of an existing key in place, or appends.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.0.iter_mut().find(|kv| kv.key == key) {
            Some(kv) => kv.value = value.to_string(),
            None => self.0.push(KvPair {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    pub fn del(&mut self, key: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|kv| kv.key != key);
        self.0.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &KvPair> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut KvPair> {
        self.0.iter_mut()
    }

    pub fn retain<F: FnMut(&KvPair) -> bool>(&mut self, f: F) {
        self.0.retain(f)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for KvList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut list = KvList::new();
        for (k, v) in iter {
            let (k, v) = (k.into(), v.into());
            list.set(&k, &v);
        }
        list
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Bool,
    #[default]
    String,
    Text,
    Date,
    Datetime,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float,
    Decimal,
}

impl FieldType {
    /// String and text fields carry language variants.
    pub fn is_textual(&self) -> bool {
        matches!(self, FieldType::String | FieldType::Text)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    #[default]
    None,
    Index,
    Unique,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub index_type: IndexType,
    #[serde(default)]
    pub length: u32,
    #[serde(default, skip_serializing_if = "KvList::is_empty")]
    pub attrs: KvList,
}

impl Field {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            ..Field::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeExtensions {
    #[serde(default)]
    pub access_counter: bool,
    #[serde(default)]
    pub comment_enable: bool,
    #[serde(default)]
    pub comment_perentry: bool,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub node_refer: String,
    /// Computed on every sync pass; submitted values are ignored.
    #[serde(default)]
    pub node_sub_refer: String,
    #[serde(default)]
    pub text_search: bool,
}

impl NodeExtensions {
    pub fn permalink_enabled(&self) -> bool {
        !self.permalink.is_empty() && self.permalink != PERMALINK_OFF
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeModel {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub terms: Vec<TermModel>,
    #[serde(default)]
    pub extensions: NodeExtensions,
}

impl NodeModel {
    pub fn new(name: &str, title: &str) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            ..NodeModel::default()
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TermType {
    Tag,
    #[default]
    Taxonomy,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TermModel {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "type")]
    pub term_type: TermType,
}

impl TermModel {
    pub fn new(name: &str, title: &str, term_type: TermType) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            term_type,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataxQuery {
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub order: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Datax {
    pub name: String,
    /// `<node|term>.<list|entry>`
    #[serde(rename = "type")]
    pub datax_type: String,
    #[serde(default)]
    pub query: DataxQuery,
    #[serde(default)]
    pub pager: bool,
    #[serde(default)]
    pub cache_ttl: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub datax: Vec<Datax>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Route {
    pub path: String,
    #[serde(default)]
    pub data_action: String,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub default: bool,
    #[serde(default, skip_serializing_if = "KvList::is_empty")]
    pub params: KvList,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Router {
    #[serde(default)]
    pub routes: Vec<Route>,
}
