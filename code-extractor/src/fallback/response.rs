//! Lenient mapping of a decoded model answer onto a [`StructuralRecord`].
//!
//! Models rarely follow a schema exactly: list entries may be plain strings
//! or objects, keys come in snake or camel case, and extra keys appear. Known
//! keys are mapped, everything else lands in `extras`.

use serde_json::{Map, Value};

use crate::{
    core::endpoints::verb_of,
    model::{
        language::LanguageTag,
        record::{
            Callable, CallableKind, Endpoint, Field, ImportRef, ImportedName, Param, RecordStatus,
            StructuralRecord, TypeDecl, TypeKind,
        },
    },
};

/// Record with `status = llm` built from the model's JSON object.
pub fn record_from_model(path: &str, language: LanguageTag, obj: Map<String, Value>) -> StructuralRecord {
    let mut rec = StructuralRecord::new(path, language);
    rec.status = RecordStatus::Llm;

    for (key, value) in obj {
        match key.as_str() {
            "imports" | "dependencies" | "packages" => {
                rec.imported_modules.extend(items(&value).filter_map(import_of));
            }
            "classes" | "types" | "structs" => {
                rec.types
                    .extend(items(&value).filter_map(|v| type_of(v, TypeKind::Class)));
            }
            "interfaces" => {
                rec.types
                    .extend(items(&value).filter_map(|v| type_of(v, TypeKind::Interface)));
            }
            "functions" | "methods" | "callables" => {
                rec.callables.extend(
                    items(&value).filter_map(|v| callable_of(v, CallableKind::Function, None)),
                );
            }
            "api_endpoints" | "apiEndpoints" | "endpoints" | "routes" => {
                rec.endpoints.extend(items(&value).filter_map(endpoint_of));
            }
            "summary" | "description" => {
                rec.summary = value
                    .as_str()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
            }
            "comments" => {
                rec.comments
                    .line
                    .extend(items(&value).filter_map(|v| text(v).map(str::to_string)));
            }
            _ => {
                if !is_empty_value(&value) {
                    rec.extras.insert(key, value);
                }
            }
        }
    }
    rec
}

/// Entries of a list; a lone scalar or object counts as a one-item list.
fn items(value: &Value) -> Box<dyn Iterator<Item = &Value> + '_> {
    match value {
        Value::Array(a) => Box::new(a.iter()),
        Value::Null => Box::new(std::iter::empty()),
        other => Box::new(std::iter::once(other)),
    }
}

fn text(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// First non-empty string among `keys`.
fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(text))
}

fn strings(obj: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .find_map(|k| obj.get(*k))
        .map(|v| {
            items(v)
                .filter_map(|x| text(x).or_else(|| x.as_object().and_then(|o| field(o, &["name"]))))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn import_of(v: &Value) -> Option<ImportRef> {
    if let Some(s) = text(v) {
        return Some(ImportRef::module(s));
    }
    let o = v.as_object()?;
    let module = field(o, &["module", "name", "path", "source", "package", "from"])?;
    let names = strings(o, &["names", "symbols", "items"])
        .into_iter()
        .map(|n| ImportedName::new(n, None))
        .collect();
    Some(
        ImportRef::module(module)
            .with_alias(field(o, &["alias", "as"]).map(str::to_string))
            .with_names(names),
    )
}

fn type_of(v: &Value, default_kind: TypeKind) -> Option<TypeDecl> {
    if let Some(s) = text(v) {
        return Some(TypeDecl::new(s, default_kind, 0));
    }
    let o = v.as_object()?;
    let name = field(o, &["name"])?;
    let kind = field(o, &["kind", "type"])
        .and_then(|k| TypeKind::from_keyword(&k.to_ascii_lowercase()))
        .unwrap_or(default_kind);
    let mut decl = TypeDecl::new(name, kind, line_of(o));
    decl.extends = strings(o, &["extends", "superclass", "bases", "parent"]);
    decl.implements = strings(o, &["implements", "interfaces", "protocols"]);
    decl.modifiers = strings(o, &["modifiers"]);
    decl.doc = field(o, &["doc", "docstring", "description"]).map(str::to_string);
    if let Some(methods) = o.get("methods") {
        decl.methods = items(methods)
            .filter_map(|m| callable_of(m, CallableKind::Method, Some(name)))
            .collect();
    }
    if let Some(fields) = ["fields", "attributes", "properties"]
        .iter()
        .find_map(|k| o.get(*k))
    {
        decl.fields = items(fields).filter_map(field_of).collect();
    }
    Some(decl)
}

fn callable_of(v: &Value, kind: CallableKind, owner: Option<&str>) -> Option<Callable> {
    let mut c = match text(v) {
        Some(s) => Callable::new(s.trim_end_matches("()"), kind, 0),
        None => {
            let o = v.as_object()?;
            let mut c = Callable::new(field(o, &["name"])?, kind, line_of(o));
            if let Some(params) = ["params", "parameters", "args", "arguments"]
                .iter()
                .find_map(|k| o.get(*k))
            {
                c.params = items(params).filter_map(param_of).collect();
            }
            c.return_type = field(o, &["returnType", "return_type", "returns"]).map(str::to_string);
            c.modifiers = strings(o, &["modifiers", "decorators"]);
            c.is_async = ["async", "isAsync", "is_async"]
                .iter()
                .any(|k| o.get(*k).and_then(Value::as_bool).unwrap_or(false));
            c.doc = field(o, &["doc", "docstring", "description"]).map(str::to_string);
            c
        }
    };
    c.owner = owner.map(str::to_string);
    Some(c)
}

fn param_of(v: &Value) -> Option<Param> {
    if let Some(s) = text(v) {
        return Some(Param::new(s));
    }
    let o = v.as_object()?;
    let mut p = Param::typed(
        field(o, &["name"])?,
        field(o, &["type", "typeName", "type_name"]).map(str::to_string),
    );
    p.default = field(o, &["default", "defaultValue"]).map(str::to_string);
    Some(p)
}

fn field_of(v: &Value) -> Option<Field> {
    if let Some(s) = text(v) {
        return Some(Field::new(s, None));
    }
    let o = v.as_object()?;
    let mut f = Field::new(
        field(o, &["name"])?,
        field(o, &["type", "typeName", "type_name"]).map(str::to_string),
    );
    f.default = field(o, &["default", "value"]).map(str::to_string);
    Some(f)
}

/// `"GET /users"` strings or `{method, path, handler}` objects.
fn endpoint_of(v: &Value) -> Option<Endpoint> {
    if let Some(s) = text(v) {
        let mut parts = s.split_whitespace();
        let first = parts.next()?;
        return match verb_of(first) {
            Some(verb) => Some(Endpoint {
                method: verb.to_string(),
                path: parts.next()?.to_string(),
                ..Default::default()
            }),
            None if first.starts_with('/') => Some(Endpoint {
                method: "ANY".to_string(),
                path: first.to_string(),
                ..Default::default()
            }),
            None => None,
        };
    }
    let o = v.as_object()?;
    let path = field(o, &["path", "route", "url", "endpoint"])?;
    let method = field(o, &["method", "verb", "http_method", "httpMethod"])
        .and_then(verb_of)
        .unwrap_or("ANY");
    Some(Endpoint {
        method: method.to_string(),
        path: path.to_string(),
        handler: field(o, &["handler", "function", "callable"]).map(str::to_string),
        owner: None,
        framework: field(o, &["framework"]).map(str::to_string),
    })
}

fn line_of(o: &Map<String, Value>) -> usize {
    o.get("line")
        .and_then(Value::as_u64)
        .and_then(|l| usize::try_from(l).ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(o) => o,
            _ => Map::new(),
        }
    }

    #[test]
    fn strings_and_objects_are_both_accepted() {
        let obj = map(json!({
            "classes": ["Repo", {"name": "User", "kind": "struct", "extends": "Base",
                                  "methods": ["save()", {"name": "load", "params": ["id"]}]}],
            "functions": [{"name": "main", "params": [{"name": "argv", "type": "list"}],
                           "returnType": "int", "async": true}],
            "imports": ["os", {"module": "json", "alias": "j"}],
            "api_endpoints": ["GET /users", {"method": "post", "path": "/users", "handler": "create"}],
            "summary": " User storage. "
        }));
        let rec = record_from_model("a.ex", LanguageTag::from_hint("ex"), obj);
        assert_eq!(rec.status, RecordStatus::Llm);
        assert_eq!(rec.types.len(), 2);
        assert_eq!(rec.types[1].kind, TypeKind::Struct);
        assert_eq!(rec.types[1].extends, vec!["Base"]);
        let methods: Vec<_> = rec.types[1].methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(methods, vec!["save", "load"]);
        assert_eq!(rec.types[1].methods[0].owner.as_deref(), Some("User"));
        assert!(rec.callables[0].is_async);
        assert_eq!(rec.callables[0].params[0].type_name.as_deref(), Some("list"));
        assert_eq!(rec.imported_modules[1].alias.as_deref(), Some("j"));
        assert_eq!(rec.endpoints[0].method, "GET");
        assert_eq!(rec.endpoints[1].method, "POST");
        assert_eq!(rec.endpoints[1].handler.as_deref(), Some("create"));
        assert_eq!(rec.summary.as_deref(), Some("User storage."));
    }

    #[test]
    fn unknown_keys_go_to_extras() {
        let obj = map(json!({"packages": ["fmt"], "file_structure": ["a"], "notes": "", "interfaces": ["Reader"]}));
        let rec = record_from_model("x", LanguageTag::from_hint("unknown"), obj);
        assert_eq!(rec.imported_modules[0].module, "fmt");
        assert_eq!(rec.types[0].kind, TypeKind::Interface);
        assert_eq!(rec.extras["file_structure"], json!(["a"]));
        assert!(!rec.extras.contains_key("notes"));
    }

    #[test]
    fn junk_entries_are_skipped() {
        let obj = map(json!({"classes": [1, null, {"kind": "class"}], "functions": null,
                             "api_endpoints": ["not a route"]}));
        let rec = record_from_model("x", LanguageTag::from_hint("x"), obj);
        assert!(rec.types.is_empty());
        assert!(rec.callables.is_empty());
        assert!(rec.endpoints.is_empty());
    }
}
