use crate::{
    core::traits::StructuralExtractor,
    languages::ecmascript,
    model::{language::LanguageKind, record::StructuralRecord},
};

/// TypeScript on top of the shared ECMAScript scanner: interfaces, type
/// aliases, enums, decorators and NestJS controllers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypeScriptExtractor;

impl StructuralExtractor for TypeScriptExtractor {
    fn language(&self) -> LanguageKind {
        LanguageKind::TypeScript
    }

    fn scan(&self, path: &str, code: &str) -> StructuralRecord {
        ecmascript::scan(path, code, LanguageKind::TypeScript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::{CallableKind, RecordStatus, TypeKind};

    const NEST: &str = r#"
import type { Request } from 'express';
import { Controller, Get, Post, Body, Param } from '@nestjs/common';

export interface User extends Entity {
  id: number;
  name?: string;
  greet(msg: string): void;
}

export type UserId = string | number;

export enum Role { Admin = 'admin', Member }

@Controller('users')
export class UsersController {
  constructor(private readonly service: UsersService) {}

  @Get(':id')
  async findOne(@Param('id') id: string): Promise<User> {
    return this.service.find(id);
  }

  @Post()
  create(@Body() dto: CreateUserDto) {
    return this.service.create(dto);
  }
}

export const handler = async (event: Event): Promise<void> => {
  console.log(event);
};

export function identity<T>(value: T): T {
  return value;
}
"#;

    #[test]
    fn typed_imports() {
        let rec = TypeScriptExtractor.scan("users.controller.ts", NEST);
        assert_eq!(rec.imported_modules.len(), 2);
        assert_eq!(rec.imported_modules[0].kind.as_deref(), Some("type"));
        assert_eq!(rec.imported_modules[0].names[0].name, "Request");
        assert_eq!(rec.imported_modules[1].module, "@nestjs/common");
        assert_eq!(rec.imported_modules[1].names.len(), 5);
    }

    #[test]
    fn interfaces_aliases_and_enums() {
        let rec = TypeScriptExtractor.scan("users.ts", NEST);
        let user = rec.types.iter().find(|t| t.name == "User").unwrap();
        assert_eq!(user.kind, TypeKind::Interface);
        assert_eq!(user.extends, vec!["Entity"]);
        let fields: Vec<_> = user.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["id", "name"]);
        assert_eq!(user.fields[0].type_name.as_deref(), Some("number"));
        assert_eq!(user.methods[0].name, "greet");
        assert_eq!(user.methods[0].return_type.as_deref(), Some("void"));

        let role = rec.types.iter().find(|t| t.name == "Role").unwrap();
        assert_eq!(role.kind, TypeKind::Enum);
        assert_eq!(role.fields.len(), 2);
        assert_eq!(role.fields[0].default.as_deref(), Some("'admin'"));

        assert_eq!(rec.extras["typeAliases"], serde_json::json!(["UserId"]));
    }

    #[test]
    fn nest_controller_routes() {
        let rec = TypeScriptExtractor.scan("users.controller.ts", NEST);
        let ctl = rec.types.iter().find(|t| t.name == "UsersController").unwrap();
        assert_eq!(ctl.decorators[0].name, "Controller");

        let ctor = &ctl.methods[0];
        assert_eq!(ctor.kind, CallableKind::Constructor);
        assert_eq!(ctor.params[0].name, "service");
        assert_eq!(ctor.params[0].type_name.as_deref(), Some("UsersService"));

        let find = ctl.methods.iter().find(|m| m.name == "findOne").unwrap();
        assert!(find.is_async);
        assert_eq!(find.return_type.as_deref(), Some("Promise<User>"));
        assert_eq!(find.params[0].name, "id");

        let routes: Vec<_> = rec
            .endpoints
            .iter()
            .map(|e| (e.method.as_str(), e.path.as_str(), e.handler.as_deref()))
            .collect();
        assert_eq!(
            routes,
            vec![("GET", "/users/:id", Some("findOne")), ("POST", "/users", Some("create"))]
        );
        assert!(rec.endpoints.iter().all(|e| e.framework.as_deref() == Some("nestjs")));
    }

    #[test]
    fn typed_functions() {
        let rec = TypeScriptExtractor.scan("handler.ts", NEST);
        let h = rec.callables.iter().find(|c| c.name == "handler").unwrap();
        assert!(h.is_async);
        assert_eq!(h.params[0].type_name.as_deref(), Some("Event"));
        assert_eq!(h.return_type.as_deref(), Some("Promise<void>"));

        let id = rec.callables.iter().find(|c| c.name == "identity").unwrap();
        assert!(id.modifiers.contains(&"<T>".to_string()));
        assert_eq!(id.return_type.as_deref(), Some("T"));
    }

    #[test]
    fn malformed_typescript_is_total() {
        for code in ["interface {", "enum E { A = ", "@Controller(\nclass", "type = ;"] {
            let rec = TypeScriptExtractor.scan("x.ts", code);
            assert_eq!(rec.status, RecordStatus::Success);
        }
    }
}
