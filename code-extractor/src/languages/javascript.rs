use crate::{
    core::traits::StructuralExtractor,
    languages::ecmascript,
    model::{language::LanguageKind, record::StructuralRecord},
};

/// ES modules and CommonJS, including JSX components and express routes.
#[derive(Debug, Default, Clone, Copy)]
pub struct JavaScriptExtractor;

impl StructuralExtractor for JavaScriptExtractor {
    fn language(&self) -> LanguageKind {
        LanguageKind::JavaScript
    }

    fn scan(&self, path: &str, code: &str) -> StructuralRecord {
        ecmascript::scan(path, code, LanguageKind::JavaScript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::{CallableKind, RecordStatus, TypeKind};

    const APP: &str = r#"
import React, { useState, useEffect as ue } from 'react';
import * as fs from "fs";
import './styles.css';
const express = require('express');
const { join } = require("path");

/** Fetches a user. */
async function getUser(req, res) {
  res.json({});
}

const add = (a, b = 1) => a + b;

export default function App({ title }) {
  return null;
}

class Service extends Base {
  constructor(repo) {
    this.repo = repo;
  }

  async find(id) {
    return this.repo.get(id);
  }
}

const app = express();
app.get("/users/:id", getUser);
// app.post("/ignored", ignored);
app.post('/users', async (req, res) => {
  res.status(201).end();
});
module.exports = { add };
"#;

    fn extras(rec: &StructuralRecord, key: &str) -> Vec<String> {
        rec.extras
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    #[test]
    fn imports_cover_es_and_commonjs() {
        let rec = JavaScriptExtractor.scan("app.js", APP);
        assert_eq!(rec.status, RecordStatus::Success);
        let mods: Vec<_> = rec.imported_modules.iter().map(|i| i.module.as_str()).collect();
        assert_eq!(mods, vec!["react", "fs", "./styles.css", "express", "path"]);

        let react = &rec.imported_modules[0];
        assert_eq!(react.alias.as_deref(), Some("React"));
        assert_eq!(react.names.len(), 2);
        assert_eq!(react.names[1].name, "useEffect");
        assert_eq!(react.names[1].alias.as_deref(), Some("ue"));

        assert_eq!(rec.imported_modules[1].alias.as_deref(), Some("fs"));
        assert_eq!(rec.imported_modules[1].kind.as_deref(), Some("namespace"));
        assert_eq!(rec.imported_modules[2].kind.as_deref(), Some("side_effect"));
        assert_eq!(rec.imported_modules[3].alias.as_deref(), Some("express"));
        assert_eq!(rec.imported_modules[4].names[0].name, "join");
    }

    #[test]
    fn functions_arrows_and_classes() {
        let rec = JavaScriptExtractor.scan("app.js", APP);

        let get_user = rec.callables.iter().find(|c| c.name == "getUser").unwrap();
        assert!(get_user.is_async);
        assert_eq!(get_user.params.len(), 2);
        assert_eq!(get_user.doc.as_deref(), Some("Fetches a user."));

        let add = rec.callables.iter().find(|c| c.name == "add").unwrap();
        assert!(add.modifiers.contains(&"arrow".to_string()));
        assert_eq!(add.params[1].name, "b");
        assert_eq!(add.params[1].default.as_deref(), Some("1"));

        let svc = rec.types.iter().find(|t| t.name == "Service").unwrap();
        assert_eq!(svc.kind, TypeKind::Class);
        assert_eq!(svc.extends, vec!["Base"]);
        assert_eq!(svc.methods[0].kind, CallableKind::Constructor);
        assert_eq!(svc.methods[1].name, "find");
        assert!(svc.methods[1].is_async);
        assert_eq!(svc.methods[1].owner.as_deref(), Some("Service"));
    }

    #[test]
    fn components_and_exports() {
        let rec = JavaScriptExtractor.scan("app.jsx", APP);
        assert_eq!(extras(&rec, "components"), vec!["App"]);
        assert!(rec.callables.iter().any(|c| c.name == "App"));
        let exports = extras(&rec, "exports");
        assert!(exports.contains(&"default:App".to_string()));
        assert!(exports.contains(&"add".to_string()));
    }

    #[test]
    fn express_routes() {
        let rec = JavaScriptExtractor.scan("app.js", APP);
        assert_eq!(rec.endpoints.len(), 2);
        let e = &rec.endpoints[0];
        assert_eq!(e.method, "GET");
        assert_eq!(e.path, "/users/:id");
        assert_eq!(e.handler.as_deref(), Some("getUser"));
        assert_eq!(e.framework.as_deref(), Some("express"));
        assert_eq!(rec.endpoints[1].method, "POST");
        assert_eq!(rec.endpoints[1].handler, None);
    }

    #[test]
    fn broken_input_still_yields_a_record() {
        for code in ["", "function (", "class {{{", "const = => ;", "}}}) import from"] {
            let rec = JavaScriptExtractor.scan("x.js", code);
            assert_eq!(rec.status, RecordStatus::Success);
            assert_eq!(rec.language.as_str(), "javascript");
        }
    }
}
