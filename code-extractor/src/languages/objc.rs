//! Objective-C extractor.
//!
//! `@interface`, `@implementation` and `@protocol` blocks are located on the
//! skeleton and closed by the next `@end`; the text between blocks is read
//! as C with the C-family function parser.

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    core::{
        lexer::Syntax,
        segments::Segment,
        text::{collapse_ws, find_matching, non_empty, parse_typed_name_param, split_default, split_top_level},
        traits::StructuralExtractor,
    },
    languages::{
        c_family::{function, preprocessor},
        common::{Source, leading_ident, type_list},
    },
    model::{
        language::LanguageKind,
        record::{
            Callable, CallableKind, Field, ImportRef, Param, ParamKind, StructuralRecord, TypeDecl, TypeKind,
        },
    },
};

const SYNTAX: Syntax = Syntax {
    doc_line: &["///"],
    ..Syntax::C_LIKE
};

const IVAR_QUALIFIERS: &[&str] = &["__weak", "__strong", "__unsafe_unretained", "__block", "const", "volatile"];

lazy_static! {
    static ref MODULE_IMPORT_RE: Regex = Regex::new(r"@import\s+([\w.]+)\s*;").unwrap();
    static ref FORWARD_RE: Regex = Regex::new(r"@(?:class|protocol)\s+[\w\s,]*;").unwrap();
    static ref NULLABILITY_RE: Regex = Regex::new(r"\bNS_ASSUME_NONNULL_(?:BEGIN|END)\b").unwrap();
    static ref BLOCK_RE: Regex = Regex::new(r"@(?:interface|implementation|protocol)\b").unwrap();
    static ref END_RE: Regex = Regex::new(r"@end\b").unwrap();
    static ref HEADER_RE: Regex = Regex::new(
        r"^@(interface|implementation|protocol)\s+([A-Za-z_]\w*)(?:\s*\(\s*(\w*)\s*\))?(?:\s*:\s*([A-Za-z_]\w*))?(?:\s*<([^>]*)>)?"
    )
    .unwrap();
    static ref DIRECTIVE_RE: Regex =
        Regex::new(r"^\s*@(optional|required|public|private|protected|package)\b\s*").unwrap();
    static ref PROPERTY_RE: Regex = Regex::new(r"^@property\s*(?:\(([^)]*)\))?\s*(.+?)\s*$").unwrap();
    static ref BLOCK_NAME_RE: Regex = Regex::new(r"\(\s*\^\s*([A-Za-z_]\w*)\s*\)").unwrap();
    static ref NS_ENUM_RE: Regex =
        Regex::new(r"^typedef\s+NS_(ENUM|OPTIONS)\s*\(\s*(\w+)\s*,\s*(\w+)\s*\)").unwrap();
}

/// Objective-C: `#import`/`@import`, interfaces with superclass, protocols
/// and categories, implementations, protocols, properties and selector
/// methods.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectiveCExtractor;

impl StructuralExtractor for ObjectiveCExtractor {
    fn language(&self) -> LanguageKind {
        LanguageKind::ObjectiveC
    }

    fn scan(&self, path: &str, code: &str) -> StructuralRecord {
        let mut s = Source::new(code, &SYNTAX, None);
        let mut rec = s.record(path, LanguageKind::ObjectiveC);
        let macros = preprocessor(&mut s, &mut rec);

        let mut spans = Vec::new();
        for c in MODULE_IMPORT_RE.captures_iter(&s.masked) {
            if let Some(m) = c.get(0) {
                spans.push((m.start(), m.end()));
            }
            rec.imported_modules.push(ImportRef::module(&c[1]).with_kind("module"));
        }
        spans.extend(FORWARD_RE.find_iter(&s.masked).map(|m| (m.start(), m.end())));
        spans.extend(NULLABILITY_RE.find_iter(&s.masked).map(|m| (m.start(), m.end())));
        for (a, b) in spans {
            s.blank(a, b);
        }

        let mut pos = 0;
        while let Some(m) = BLOCK_RE.find_at(&s.masked, pos) {
            c_items(&s, pos, m.start(), &mut rec);
            pos = block(&s, m.start(), m.end(), &mut rec);
        }
        c_items(&s, pos, s.len(), &mut rec);

        rec.set_extra_list("macros", &macros);
        rec
    }
}

/// Reads one `@interface`/`@implementation`/`@protocol` block and returns
/// the offset after its `@end`.
fn block(s: &Source, start: usize, kw_end: usize, rec: &mut StructuralRecord) -> usize {
    let masked = s.masked.as_str();
    let header_end = header_end(masked, kw_end);
    let (body_end, next) = END_RE
        .find_at(masked, header_end)
        .map_or((s.len(), s.len()), |e| (e.start(), e.end()));

    let header = collapse_ws(&masked[start..header_end]);
    let Some(c) = HEADER_RE.captures(&header) else {
        return next;
    };
    let kw = c.get(1).map_or("", |m| m.as_str());
    let class = c[2].to_string();
    let protocols = c.get(5).map(|m| type_list(m.as_str())).unwrap_or_default();
    let (kind, name) = match (kw, c.get(3).map(|m| m.as_str())) {
        ("protocol", _) => (TypeKind::Protocol, class.clone()),
        (_, Some("")) => (TypeKind::Extension, class.clone()),
        (_, Some(category)) => (TypeKind::Category, format!("{class}({category})")),
        _ => (TypeKind::Class, class.clone()),
    };

    let mut td = TypeDecl::new(&name, kind, s.line(start));
    td.doc = s.doc(start, false);
    if kind == TypeKind::Protocol {
        td.extends = protocols;
    } else {
        td.extends.extend(c.get(4).map(|m| m.as_str().to_string()));
        td.implements = protocols;
    }

    let mut from = header_end;
    let rest = &masked[header_end..body_end];
    if rest.trim_start().starts_with('{') {
        let open = header_end + rest.len() - rest.trim_start().len();
        if let Some(close) = find_matching(masked, open).filter(|c| *c < body_end) {
            td.fields.extend(ivars(s, open + 1, close));
            from = close + 1;
        }
    }
    members(s, from, body_end, &class, &mut td);

    if kw == "implementation" {
        merge_implementation(rec, td);
    } else {
        rec.types.push(td);
    }
    next
}

/// End of a block header: the first newline or `{` outside `<...>`/`(...)`.
fn header_end(masked: &str, from: usize) -> usize {
    let mut depth = 0i32;
    for (i, b) in masked.bytes().enumerate().skip(from) {
        match b {
            b'<' | b'(' => depth += 1,
            b'>' | b')' => depth = (depth - 1).max(0),
            b'\n' | b'{' if depth == 0 => return i,
            _ => {}
        }
    }
    masked.len()
}

/// Methods defined in an `@implementation` join the interface declared in
/// the same file; a standalone implementation becomes its own type.
fn merge_implementation(rec: &mut StructuralRecord, mut td: TypeDecl) {
    let found = rec.types.iter().position(|t| t.name == td.name && t.kind == td.kind);
    let Some(idx) = found else {
        td.modifiers.push("implementation".into());
        rec.types.push(td);
        return;
    };
    let existing = &mut rec.types[idx];
    let is_class = |c: &Callable| c.modifiers.iter().any(|m| m == "class");
    for m in td.methods {
        let declared = existing
            .methods
            .iter()
            .any(|e| e.name == m.name && is_class(e) == is_class(&m));
        if !declared {
            existing.methods.push(m);
        }
    }
    for f in td.fields {
        if !existing.fields.iter().any(|e| e.name == f.name) {
            existing.fields.push(f);
        }
    }
}

fn members(s: &Source, from: usize, to: usize, owner: &str, td: &mut TypeDecl) {
    let mut optional = false;
    for seg in s.segments(from, to, false) {
        let head = s.head(&seg);
        let mut off = 0;
        while let Some(c) = DIRECTIVE_RE.captures(&head[off..]) {
            match &c[1] {
                "optional" => optional = true,
                "required" => optional = false,
                _ => {}
            }
            off += c.get(0).map_or(0, |m| m.end());
        }
        let h = head[off..].trim_start();
        let off = head.len() - h.len();

        if h.starts_with("@property") {
            td.fields.extend(property(s, &seg, off));
        } else if h.starts_with(['-', '+']) {
            if let Some(mut m) = method(s, &seg, off, owner) {
                if optional {
                    m.modifiers.push("optional".into());
                }
                td.methods.push(m);
            }
        }
    }
}

/// `@property (nonatomic, copy) NSString *name;`
fn property(s: &Source, seg: &Segment, off: usize) -> Option<Field> {
    let text = collapse_ws(s.text_head(seg).get(off..)?);
    let c = PROPERTY_RE.captures(&text)?;
    let decl = c.get(2)?.as_str();
    let (name, type_name) = match BLOCK_NAME_RE.captures(decl) {
        Some(b) => (b[1].to_string(), Some(decl.to_string())),
        None => {
            let p = parse_typed_name_param(decl, &[])?;
            (p.name, p.type_name)
        }
    };
    if name.is_empty() {
        return None;
    }
    let mut f = Field::new(name, type_name);
    f.modifiers.push("property".into());
    if let Some(attrs) = c.get(1) {
        f.modifiers.extend(type_list(attrs.as_str()));
    }
    Some(f)
}

/// `- (RetType)label:(Type)arg label2:(Type)arg2` or `+ (id)name`.
fn method(s: &Source, seg: &Segment, off: usize, owner: &str) -> Option<Callable> {
    let at = seg.start + off;
    let text = collapse_ws(s.text_head(seg).get(off..)?);
    let class_method = text.starts_with('+');
    let rest = text.get(1..)?.trim_start();
    let (ret, rest) = if rest.starts_with('(') {
        let close = find_matching(rest, 0)?;
        (collapse_ws(&rest[1..close]), rest[close + 1..].trim_start())
    } else {
        ("id".to_string(), rest)
    };
    let (rest, variadic) = match rest.find(", ...") {
        Some(p) => (&rest[..p], true),
        None => (rest, false),
    };

    let mut selector = String::new();
    let mut params = Vec::new();
    let mut cur = rest;
    loop {
        let label = leading_ident(cur).unwrap_or("");
        let after = cur.trim_start()[label.len()..].trim_start();
        let Some(after) = after.strip_prefix(':') else {
            if params.is_empty() {
                selector = label.to_string();
            }
            break;
        };
        selector.push_str(label);
        selector.push(':');
        let after = after.trim_start();
        let (type_name, after) = if after.starts_with('(') {
            let close = find_matching(after, 0)?;
            (non_empty(&after[1..close]), after[close + 1..].trim_start())
        } else {
            (None, after)
        };
        let Some(name) = leading_ident(after) else {
            break;
        };
        let mut p = Param::typed(name, type_name);
        p.label = non_empty(label);
        params.push(p);
        cur = &after[name.len()..];
    }
    if selector.is_empty() {
        return None;
    }
    if variadic {
        params.push(Param {
            name: "...".into(),
            kind: ParamKind::Variadic,
            ..Default::default()
        });
    }

    let kind = if !class_method && selector.starts_with("init") {
        CallableKind::Constructor
    } else {
        CallableKind::Method
    };
    let mut f = Callable::new(&selector, kind, s.line(at));
    f.owner = Some(owner.to_string());
    if class_method {
        f.modifiers.push("class".into());
    }
    f.params = params;
    f.return_type = Some(ret);
    f.doc = s.doc(at, false);
    Some(f)
}

/// Instance variables between the header and the members.
fn ivars(s: &Source, from: usize, to: usize) -> Vec<Field> {
    let mut access = "protected".to_string();
    let mut out = Vec::new();
    for seg in s.segments(from, to, false) {
        let head = s.head(&seg);
        let mut off = 0;
        while let Some(c) = DIRECTIVE_RE.captures(&head[off..]) {
            access = c[1].to_string();
            off += c.get(0).map_or(0, |m| m.end());
        }
        let text = s.text_head(&seg).get(off..).unwrap_or("");
        let Some(p) = parse_typed_name_param(text.trim(), IVAR_QUALIFIERS) else {
            continue;
        };
        if p.type_name.is_none() {
            continue;
        }
        let mut f = Field::new(p.name, p.type_name);
        f.modifiers = vec![access.clone(), "ivar".into()];
        out.push(f);
    }
    out
}

/// Plain C between blocks: `NS_ENUM`/`NS_OPTIONS` typedefs and functions.
fn c_items(s: &Source, from: usize, to: usize, rec: &mut StructuralRecord) {
    for seg in s.segments(from, to, false) {
        let head = s.head(&seg).trim_start();
        if let Some(c) = NS_ENUM_RE.captures(head) {
            let mut td = TypeDecl::new(&c[3], TypeKind::Enum, s.line(seg.start));
            td.modifiers.push(c[2].to_string());
            if &c[1] == "OPTIONS" {
                td.modifiers.push("options".into());
            }
            td.doc = s.doc(seg.start, false);
            if let Some((a, b)) = seg.inner() {
                td.fields = enum_constants(s.text.get(a..b).unwrap_or(""));
            }
            rec.types.push(td);
            continue;
        }
        if let Some(f) = function(s, &seg, 0, None) {
            rec.callables.push(f);
        }
    }
}

fn enum_constants(body: &str) -> Vec<Field> {
    split_top_level(body, ',')
        .into_iter()
        .filter_map(|c| {
            let (lhs, default) = split_default(c);
            let name = leading_ident(lhs)?;
            let mut f = Field::new(name, None);
            f.default = default;
            Some(f)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::RecordStatus;

    const HEADER: &str = r#"#import <Foundation/Foundation.h>
#import "Animal.h"
@import UIKit;
#define MAX_LEGS 4

@class Owner;
@protocol Walking;

NS_ASSUME_NONNULL_BEGIN

typedef NS_ENUM(NSInteger, Mood) {
    MoodHappy,
    MoodGrumpy = 5
};

/// Something that can walk.
@protocol Walking <NSObject>
- (void)walkTo:(CGPoint)point;
@optional
- (BOOL)canRun;
@end

/** A dog. */
@interface Dog : Animal <Walking, NSCopying> {
    @private
    int _legs;
}
@property (nonatomic, copy) NSString *name;
@property (nonatomic, assign, readonly) NSInteger age;
@property (nonatomic, copy) void (^onBark)(void);
- (instancetype)initWithName:(NSString *)name age:(NSInteger)age;
+ (Dog *)dogNamed:(NSString *)name;
- (void)fetch:(id)item completion:(void (^)(BOOL ok))completion;
- (void)log:(NSString *)format, ...;
@end

@interface Dog (Tricks)
- (void)rollOver;
@end

NSString *DogDescription(Dog *dog);

NS_ASSUME_NONNULL_END
"#;

    const IMPL: &str = r#"#import "Dog.h"

@interface Dog ()
@property (nonatomic) BOOL sleepy;
@end

@implementation Dog

- (instancetype)initWithName:(NSString *)name age:(NSInteger)age {
    self = [super init];
    if (self) {
        _name = [name copy];
    }
    return self;
}

- (void)bark {
    NSLog(@"Woof {");
}

@end

int main(int argc, const char *argv[]) {
    @autoreleasepool {
        return 0;
    }
}
"#;

    #[test]
    fn imports_and_macros() {
        let rec = ObjectiveCExtractor.scan("Dog.h", HEADER);
        let imports: Vec<_> = rec
            .imported_modules
            .iter()
            .map(|i| (i.module.as_str(), i.kind.as_deref()))
            .collect();
        assert_eq!(
            imports,
            vec![
                ("Foundation/Foundation.h", Some("system")),
                ("Animal.h", Some("local")),
                ("UIKit", Some("module")),
            ]
        );
        assert_eq!(rec.extras["macros"], serde_json::json!(["MAX_LEGS"]));
    }

    #[test]
    fn interface_with_properties_and_selectors() {
        let rec = ObjectiveCExtractor.scan("Dog.h", HEADER);
        let dog = rec.types.iter().find(|t| t.name == "Dog").unwrap();
        assert_eq!(dog.kind, TypeKind::Class);
        assert_eq!(dog.extends, vec!["Animal"]);
        assert_eq!(dog.implements, vec!["Walking", "NSCopying"]);
        assert_eq!(dog.doc.as_deref(), Some("A dog."));

        let fields: Vec<_> = dog.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["_legs", "name", "age", "onBark"]);
        assert_eq!(dog.fields[0].modifiers, vec!["private", "ivar"]);
        assert_eq!(dog.fields[1].type_name.as_deref(), Some("NSString*"));
        assert_eq!(dog.fields[1].modifiers, vec!["property", "nonatomic", "copy"]);
        assert!(dog.fields[2].modifiers.contains(&"readonly".to_string()));

        let names: Vec<_> = dog.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["initWithName:age:", "dogNamed:", "fetch:completion:", "log:"]);
        let init = &dog.methods[0];
        assert_eq!(init.kind, CallableKind::Constructor);
        assert_eq!(init.params[0].name, "name");
        assert_eq!(init.params[0].label.as_deref(), Some("initWithName"));
        assert_eq!(init.params[0].type_name.as_deref(), Some("NSString *"));
        assert_eq!(init.return_type.as_deref(), Some("instancetype"));

        let factory = &dog.methods[1];
        assert_eq!(factory.modifiers, vec!["class"]);
        assert_eq!(factory.return_type.as_deref(), Some("Dog *"));
        assert_eq!(dog.methods[2].params[1].type_name.as_deref(), Some("void (^)(BOOL ok)"));
        assert_eq!(dog.methods[3].params[1].kind, ParamKind::Variadic);
    }

    #[test]
    fn protocols_categories_and_c_items() {
        let rec = ObjectiveCExtractor.scan("Dog.h", HEADER);
        let walking = rec.types.iter().find(|t| t.name == "Walking").unwrap();
        assert_eq!(walking.kind, TypeKind::Protocol);
        assert_eq!(walking.extends, vec!["NSObject"]);
        assert_eq!(walking.doc.as_deref(), Some("Something that can walk."));
        assert!(walking.methods[0].modifiers.is_empty());
        assert_eq!(walking.methods[1].modifiers, vec!["optional"]);

        let tricks = rec.types.iter().find(|t| t.kind == TypeKind::Category).unwrap();
        assert_eq!(tricks.name, "Dog(Tricks)");
        assert_eq!(tricks.methods[0].owner.as_deref(), Some("Dog"));

        let mood = rec.types.iter().find(|t| t.name == "Mood").unwrap();
        assert_eq!(mood.kind, TypeKind::Enum);
        assert_eq!(mood.modifiers, vec!["NSInteger"]);
        assert_eq!(mood.fields[1].default.as_deref(), Some("5"));

        assert_eq!(rec.callables.len(), 1);
        assert_eq!(rec.callables[0].name, "DogDescription");
        assert_eq!(rec.callables[0].return_type.as_deref(), Some("NSString*"));
    }

    #[test]
    fn implementation_and_class_extension() {
        let rec = ObjectiveCExtractor.scan("Dog.m", IMPL);
        let ext = rec.types.iter().find(|t| t.kind == TypeKind::Extension).unwrap();
        assert_eq!(ext.name, "Dog");
        assert_eq!(ext.fields[0].name, "sleepy");

        let imp = rec.types.iter().find(|t| t.kind == TypeKind::Class).unwrap();
        assert!(imp.modifiers.contains(&"implementation".to_string()));
        let names: Vec<_> = imp.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["initWithName:age:", "bark"]);

        let main = rec.callables.iter().find(|c| c.name == "main").unwrap();
        assert_eq!(main.params.len(), 2);
        assert_eq!(main.return_type.as_deref(), Some("int"));
    }

    #[test]
    fn implementation_joins_interface_in_same_file() {
        let code = "@interface Cat : NSObject\n- (void)meow;\n@end\n\n@implementation Cat\n- (void)meow {}\n- (void)purr {}\n@end\n";
        let rec = ObjectiveCExtractor.scan("Cat.m", code);
        assert_eq!(rec.types.len(), 1);
        let names: Vec<_> = rec.types[0].methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["meow", "purr"]);
    }

    #[test]
    fn malformed_objc_is_total() {
        for code in ["@interface", "@interface Foo : ", "- (void", "@implementation X\n- (", "@end @end"] {
            let rec = ObjectiveCExtractor.scan("x.m", code);
            assert_eq!(rec.status, RecordStatus::Success);
        }
    }
}
