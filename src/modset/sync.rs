//! Spec synchronizer: validated, diff-aware mutations of a module spec.
//!
//! Every `set_*`/`delete_*` operation follows the same cycle under the
//! module's write lock: fetch the persisted spec, validate the submission,
//! apply the minimal mutation to an in-memory copy, and persist with a patch
//! version bump only when something semantically changed. Validation errors
//! abort before anything is written, so a failed call leaves the persisted
//! document untouched.

use crate::core::error::ModsetError;
use crate::core::locks::ModuleLocks;
use crate::core::store::SpecStore;
use crate::core::time;
use crate::modset::types::{
    Action, CORE_GENERAL_MODULE, Datax, Field, FieldType, NodeModel, Route, STATUS_DISABLED,
    STATUS_ENABLED, Spec, TermModel,
};
use crate::modset::validate;
use crate::modset::version::bump_patch;
use std::sync::Arc;
use tracing::{debug, info};

pub const FIELD_STRING_LENGTH_DEFAULT: u32 = 10;
pub const FIELD_STRING_LENGTH_MAX: u32 = 200;

pub const DATAX_LIMIT_MIN: i64 = 1;
pub const DATAX_LIMIT_MAX: i64 = 10_000;
pub const DATAX_CACHE_TTL_MAX: i64 = 86_400 * 30_000;

const LANGS_ATTR: &str = "langs";

pub struct SpecSynchronizer {
    store: SpecStore,
    locks: Arc<ModuleLocks>,
}

impl SpecSynchronizer {
    pub fn new(store: SpecStore, locks: Arc<ModuleLocks>) -> Self {
        Self { store, locks }
    }

    /// Snapshot read of the last persisted spec; takes no lock.
    pub fn fetch(&self, module: &str) -> Result<Spec, ModsetError> {
        self.store.fetch(&canonical_module(module)?)
    }

    pub fn create_spec(&self, entry: Spec) -> Result<Spec, ModsetError> {
        if entry.meta.name.trim().is_empty() {
            return Err(ModsetError::InvalidArgument("spec name is empty".to_string()));
        }
        let module = validate::module_name(&entry.meta.name)?;
        self.exclusive(&module, || {
            let spec = self.store.create(entry)?;
            info!(module = %spec.meta.name, version = %spec.meta.version, "spec created");
            Ok(spec)
        })
    }

    /// Title, service name, status and theme config of the spec itself.
    pub fn set_spec_info(&self, entry: &Spec) -> Result<Spec, ModsetError> {
        let module = canonical_module(&entry.meta.name)?;
        if entry.title.is_empty() {
            return Err(ModsetError::InvalidArgument("spec title is empty".to_string()));
        }
        let status = if module == CORE_GENERAL_MODULE || entry.status == STATUS_ENABLED {
            STATUS_ENABLED
        } else {
            STATUS_DISABLED
        };
        let srv_name = if entry.srv_name.trim().is_empty() {
            validate::srv_name(&module)?
        } else {
            validate::srv_name(&entry.srv_name)?
        };

        self.mutate(&module, "spec.info", |prev| {
            if prev.title == entry.title
                && prev.srv_name == srv_name
                && prev.status == status
                && prev.theme_config == entry.theme_config
            {
                return Ok(false);
            }
            prev.title = entry.title.clone();
            prev.srv_name = srv_name.clone();
            prev.status = status;
            prev.theme_config = entry.theme_config.clone();
            Ok(true)
        })
    }

    pub fn set_term_model(&self, module: &str, entry: &TermModel) -> Result<Spec, ModsetError> {
        let module = canonical_module(module)?;
        let name = validate::model_name(&entry.name)?;

        self.mutate(&module, "term.set", |prev| {
            match prev.term_models.iter_mut().find(|t| t.name == name) {
                Some(existing) => {
                    if existing.title == entry.title {
                        return Ok(false);
                    }
                    existing.title = entry.title.clone();
                }
                None => prev.term_models.push(TermModel {
                    name: name.clone(),
                    ..entry.clone()
                }),
            }
            Ok(true)
        })
    }

    pub fn set_node_model(&self, module: &str, entry: &NodeModel) -> Result<Spec, ModsetError> {
        let module = canonical_module(module)?;
        let entry = normalize_node_model(entry)?;

        self.mutate(&module, "node.set", |prev| {
            let refer = &entry.extensions.node_refer;
            if !refer.is_empty() && prev.node_model(refer).is_none() {
                return Err(ModsetError::InvalidArgument(format!(
                    "node refer not found ({})",
                    refer
                )));
            }

            let mut changed = false;
            let mut terms_changed = false;

            match prev.node_models.iter_mut().find(|m| m.name == entry.name) {
                Some(existing) => {
                    if existing.title != entry.title {
                        existing.title = entry.title.clone();
                        changed = true;
                    }

                    let (cur, next) = (&mut existing.extensions, &entry.extensions);
                    if cur.access_counter != next.access_counter {
                        cur.access_counter = next.access_counter;
                        changed = true;
                    }
                    if cur.comment_enable != next.comment_enable {
                        cur.comment_enable = next.comment_enable;
                        changed = true;
                    }
                    if cur.comment_perentry != next.comment_perentry {
                        cur.comment_perentry = next.comment_perentry;
                        changed = true;
                    }
                    if cur.permalink != next.permalink {
                        cur.permalink = next.permalink.clone();
                        changed = true;
                    }
                    // An empty submission keeps the stored reference.
                    if !next.node_refer.is_empty() && cur.node_refer != next.node_refer {
                        cur.node_refer = next.node_refer.clone();
                        changed = true;
                    }
                    if cur.text_search != next.text_search {
                        cur.text_search = next.text_search;
                        changed = true;
                    }

                    if collection_changed(&existing.fields, &entry.fields, |f| &f.name) {
                        existing.fields = entry.fields.clone();
                        changed = true;
                    }

                    if !term_list_equal(&existing.terms, &entry.terms) {
                        existing.terms = entry.terms.clone();
                        changed = true;
                        terms_changed = true;
                    }
                }
                None => {
                    prev.node_models.push(entry.clone());
                    changed = true;
                    terms_changed = !entry.terms.is_empty();
                }
            }

            if terms_changed {
                reconcile_term_models(&mut prev.term_models, &entry.terms);
            }

            if refresh_node_sub_refers(&mut prev.node_models) {
                changed = true;
            }

            Ok(changed)
        })
    }

    pub fn set_action(&self, module: &str, entry: &Action) -> Result<Spec, ModsetError> {
        let module = canonical_module(module)?;
        let entry = normalize_action(entry)?;

        self.mutate(&module, "action.set", |prev| {
            for datax in &entry.datax {
                check_datax_table(prev, datax)?;
            }

            match prev.actions.iter_mut().find(|a| a.name == entry.name) {
                Some(existing) => {
                    if !collection_changed(&existing.datax, &entry.datax, |d| &d.name) {
                        return Ok(false);
                    }
                    existing.datax = entry.datax.clone();
                }
                None => prev.actions.push(entry.clone()),
            }
            Ok(true)
        })
    }

    pub fn delete_action(&self, module: &str, name: &str) -> Result<Spec, ModsetError> {
        let module = canonical_module(module)?;
        validate::action_name(name)?;

        self.mutate(&module, "action.delete", |prev| {
            let before = prev.actions.len();
            prev.actions.retain(|a| a.name != name);
            Ok(prev.actions.len() != before)
        })
    }

    pub fn set_route(&self, module: &str, entry: &Route) -> Result<Spec, ModsetError> {
        let module = canonical_module(module)?;
        let mut entry = entry.clone();
        entry.path = validate::route_path(&entry.path)?;
        for kv in entry.params.iter() {
            validate::route_param_name(&kv.key)?;
        }

        self.mutate(&module, "route.set", |prev| {
            let mut changed = false;
            let routes = &mut prev.router.routes;

            match routes.iter_mut().find(|r| r.path == entry.path) {
                Some(existing) => {
                    if *existing != entry {
                        *existing = entry.clone();
                        changed = true;
                    }
                }
                None => {
                    routes.push(entry.clone());
                    changed = true;
                }
            }

            if entry.default {
                for route in routes.iter_mut() {
                    if route.default && route.path != entry.path {
                        route.default = false;
                        changed = true;
                    }
                }
            }

            sort_routes(routes);
            Ok(changed)
        })
    }

    pub fn delete_route(&self, module: &str, path: &str) -> Result<Spec, ModsetError> {
        let module = canonical_module(module)?;
        let path = validate::route_path(path)?;

        self.mutate(&module, "route.delete", |prev| {
            let before = prev.router.routes.len();
            prev.router.routes.retain(|r| r.path != path);
            Ok(prev.router.routes.len() != before)
        })
    }

    /// Runs `f` holding the module's in-process lock and its lease file, so
    /// writers in other processes sharing the prefix are excluded too.
    pub fn exclusive<F, R>(&self, module: &str, f: F) -> Result<R, ModsetError>
    where
        F: FnOnce() -> Result<R, ModsetError>,
    {
        let lease = self.store.lease_path(module)?;
        self.locks.with_module_lease(module, &lease, f)
    }

    /// Load-modify-save cycle under the module's write lock.
    ///
    /// `apply` mutates the fetched spec and reports whether anything
    /// changed; only then is the version bumped and the document written.
    fn mutate<F>(&self, module: &str, op: &str, apply: F) -> Result<Spec, ModsetError>
    where
        F: FnOnce(&mut Spec) -> Result<bool, ModsetError>,
    {
        // Checked before leasing so unknown modules leave no directory behind.
        if !self.store.exists(module)? {
            return Err(ModsetError::NotFound(format!("spec '{}' not found", module)));
        }
        self.exclusive(module, || {
            let mut spec = self.store.fetch(module)?;
            if !apply(&mut spec)? {
                debug!(module, op, version = %spec.meta.version, "no semantic change");
                return Ok(spec);
            }

            spec.meta.version = bump_patch(&spec.meta.version);
            spec.meta.updated = time::now_unix();
            self.store.save(&spec)?;

            info!(module, op, version = %spec.meta.version, "spec updated");
            Ok(spec)
        })
    }
}

fn canonical_module(module: &str) -> Result<String, ModsetError> {
    if module.trim().is_empty() {
        return Err(ModsetError::InvalidArgument(
            "module name is empty".to_string(),
        ));
    }
    validate::module_name(module)
}

/// Validates a submitted node model and applies field defaults and clamps.
fn normalize_node_model(entry: &NodeModel) -> Result<NodeModel, ModsetError> {
    let mut model = entry.clone();
    model.name = validate::model_name(&model.name)?;

    for field in model.fields.iter_mut() {
        normalize_field(field)?;
    }

    for term in model.terms.iter_mut() {
        term.name = validate::model_name(&term.name)?;
    }

    let ext = &mut model.extensions;
    ext.node_sub_refer.clear();
    ext.node_refer = ext.node_refer.trim().to_string();
    if ext.node_refer == model.name {
        return Err(ModsetError::InvalidArgument(format!(
            "invalid node refer ({}): a model cannot refer to itself",
            ext.node_refer
        )));
    }

    Ok(model)
}

fn normalize_field(field: &mut Field) -> Result<(), ModsetError> {
    validate::field_name(&field.name)?;

    if field.title.is_empty() {
        field.title = field.name.clone();
    }

    if field.field_type == FieldType::String {
        if field.length < 1 {
            field.length = FIELD_STRING_LENGTH_DEFAULT;
        } else if field.length > FIELD_STRING_LENGTH_MAX {
            field.length = FIELD_STRING_LENGTH_MAX;
        }
    }

    let textual = field.field_type.is_textual();
    for attr in field.attrs.iter_mut() {
        validate::attr_key(&attr.key)?;
        if attr.key == LANGS_ATTR {
            attr.value = if textual {
                validate::langs(&attr.value)
            } else {
                String::new()
            };
        }
    }
    field.attrs.retain(|attr| !attr.value.is_empty());

    Ok(())
}

fn normalize_action(entry: &Action) -> Result<Action, ModsetError> {
    let mut action = entry.clone();
    validate::action_name(&action.name)?;

    for datax in action.datax.iter_mut() {
        validate::datax_name(&datax.name)?;

        let is_node = datax_type_parts(datax)?.0 == "node";

        if datax.cache_ttl > DATAX_CACHE_TTL_MAX {
            datax.cache_ttl = DATAX_CACHE_TTL_MAX;
        }
        if is_node {
            datax.query.limit = datax.query.limit.clamp(DATAX_LIMIT_MIN, DATAX_LIMIT_MAX);
        }
    }

    Ok(action)
}

/// Splits `<node|term>.<list|entry>`.
fn datax_type_parts(datax: &Datax) -> Result<(&str, &str), ModsetError> {
    let invalid = || {
        ModsetError::InvalidArgument(format!(
            "invalid datax type ({}:{})",
            datax.name, datax.datax_type
        ))
    };

    let mut parts = datax.datax_type.split('.');
    let (Some(source), Some(kind), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    if !matches!(kind, "list" | "entry") || !matches!(source, "node" | "term") {
        return Err(invalid());
    }
    Ok((source, kind))
}

fn check_datax_table(spec: &Spec, datax: &Datax) -> Result<(), ModsetError> {
    let (source, _) = datax_type_parts(datax)?;
    let found = match source {
        "node" => spec.node_model(&datax.query.table).is_some(),
        _ => spec.term_model(&datax.query.table).is_some(),
    };
    if !found {
        return Err(ModsetError::InvalidArgument(format!(
            "query table not found ({})",
            datax.query.table
        )));
    }
    Ok(())
}

/// Coarse collection diff shared by node fields and action datax.
///
/// An empty submission never changes the stored collection. A submission of
/// different length replaces it. Otherwise any stored element that is
/// missing from, or differs in, the submission replaces the whole
/// collection with the submission.
fn collection_changed<T, K>(stored: &[T], submitted: &[T], key: K) -> bool
where
    T: PartialEq,
    K: Fn(&T) -> &String,
{
    if submitted.is_empty() {
        return false;
    }
    if stored.len() != submitted.len() {
        return true;
    }
    stored.iter().any(|prev| {
        match submitted.iter().find(|cur| key(cur) == key(prev)) {
            Some(cur) => cur != prev,
            None => true,
        }
    })
}

/// Order-independent comparison keyed by term name.
fn term_list_equal(a: &[TermModel], b: &[TermModel]) -> bool {
    a.len() == b.len()
        && a.iter().all(|t1| {
            b.iter()
                .find(|t2| t2.name == t1.name)
                .is_some_and(|t2| t2.term_type == t1.term_type && t2.title == t1.title)
        })
}

/// Brings the spec-wide term models in line with a node model's terms:
/// known names take the submitted title and type, unknown ones are appended.
fn reconcile_term_models(term_models: &mut Vec<TermModel>, terms: &[TermModel]) {
    for term in terms {
        match term_models.iter_mut().find(|t| t.name == term.name) {
            Some(existing) => *existing = term.clone(),
            None => term_models.push(term.clone()),
        }
    }
}

/// Recomputes every `node_sub_refer` as the other model whose `node_refer`
/// names it. Returns whether any value changed.
fn refresh_node_sub_refers(models: &mut [NodeModel]) -> bool {
    let refers: Vec<(String, String)> = models
        .iter()
        .map(|m| (m.name.clone(), m.extensions.node_refer.clone()))
        .collect();

    let mut changed = false;
    for model in models.iter_mut() {
        let sub = refers
            .iter()
            .find(|(name, refer)| *name != model.name && *refer == model.name)
            .map(|(name, _)| name.clone())
            .unwrap_or_default();
        if model.extensions.node_sub_refer != sub {
            model.extensions.node_sub_refer = sub;
            changed = true;
        }
    }
    changed
}

/// Descending lexicographic order by path.
fn sort_routes(routes: &mut [Route]) {
    routes.sort_by(|a, b| b.path.cmp(&a.path));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modset::types::{IndexType, TermType};

    fn string_field(name: &str, length: u32) -> Field {
        Field {
            length,
            ..Field::new(name, FieldType::String)
        }
    }

    #[test]
    fn test_normalize_field_clamps_string_length() {
        let mut long = string_field("title", 500);
        normalize_field(&mut long).unwrap();
        assert_eq!(long.length, 200);
        assert_eq!(long.title, "title");

        let mut zero = string_field("summary", 0);
        normalize_field(&mut zero).unwrap();
        assert_eq!(zero.length, 10);

        let mut int = Field::new("count", FieldType::Uint32);
        normalize_field(&mut int).unwrap();
        assert_eq!(int.length, 0);
    }

    #[test]
    fn test_normalize_field_filters_langs() {
        let mut text = Field::new("body", FieldType::Text);
        text.attrs.set("langs", "en, zh_CN");
        text.attrs.set("format", "md");
        normalize_field(&mut text).unwrap();
        assert_eq!(text.attrs.get("langs"), Some("en,zh-cn"));

        let mut int = Field::new("count", FieldType::Int32);
        int.attrs.set("langs", "en,fr");
        int.attrs.set("unit", "");
        normalize_field(&mut int).unwrap();
        assert!(int.attrs.is_empty());

        let mut bad = Field::new("body", FieldType::Text);
        bad.attrs.set("Bad-Key", "x");
        assert!(normalize_field(&mut bad).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_collection_changed_policy() {
        let stored = vec![string_field("title", 100), string_field("summary", 50)];

        assert!(!collection_changed(&stored, &[], |f| &f.name));
        assert!(collection_changed(&stored, &stored[..1], |f| &f.name));

        let reordered = vec![stored[1].clone(), stored[0].clone()];
        assert!(!collection_changed(&stored, &reordered, |f| &f.name));

        let mut edited = stored.clone();
        edited[1].index_type = IndexType::Index;
        assert!(collection_changed(&stored, &edited, |f| &f.name));

        let renamed = vec![stored[0].clone(), string_field("excerpt", 50)];
        assert!(collection_changed(&stored, &renamed, |f| &f.name));
    }

    #[test]
    fn test_term_list_equal_ignores_order() {
        let a = vec![
            TermModel::new("tags", "Tags", TermType::Tag),
            TermModel::new("categories", "Categories", TermType::Taxonomy),
        ];
        let b = vec![a[1].clone(), a[0].clone()];
        assert!(term_list_equal(&a, &b));

        let mut c = b.clone();
        c[0].term_type = TermType::Tag;
        assert!(!term_list_equal(&a, &c));
        assert!(!term_list_equal(&a, &a[..1]));
    }

    #[test]
    fn test_datax_type_parts() {
        let mut datax = Datax {
            name: "list".to_string(),
            datax_type: "node.list".to_string(),
            ..Datax::default()
        };
        assert_eq!(datax_type_parts(&datax).unwrap(), ("node", "list"));

        for bad in ["node.delete", "node", "node.list.x", "user.entry"] {
            datax.datax_type = bad.to_string();
            assert!(datax_type_parts(&datax).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_refresh_node_sub_refers() {
        let mut models = vec![NodeModel::new("post", "Post"), NodeModel::new("comment", "C")];
        models[1].extensions.node_refer = "post".to_string();

        assert!(refresh_node_sub_refers(&mut models));
        assert_eq!(models[0].extensions.node_sub_refer, "comment");
        assert_eq!(models[1].extensions.node_sub_refer, "");
        assert!(!refresh_node_sub_refers(&mut models));
    }

    #[test]
    fn test_sort_routes_descending() {
        let mut routes: Vec<Route> = ["a", "view/:id", "list", "b"]
            .iter()
            .map(|p| Route {
                path: p.to_string(),
                ..Route::default()
            })
            .collect();
        sort_routes(&mut routes);
        let paths: Vec<&str> = routes.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["view/:id", "list", "b", "a"]);
    }
}
