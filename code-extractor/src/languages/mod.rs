//! Per-language extractors and the default registry.

use std::sync::Arc;

use crate::core::traits::StructuralExtractor;

pub mod c_family;
pub mod common;
pub mod csharp;
pub mod ecmascript;
pub mod go;
pub mod java;
pub mod javascript;
pub mod kotlin;
pub mod objc;
pub mod php;
pub mod python;
pub mod ruby;
pub mod rust;
pub mod sql;
pub mod swift;
pub mod typescript;

pub use c_family::{CExtractor, CppExtractor};
pub use csharp::CSharpExtractor;
pub use go::GoExtractor;
pub use java::JavaExtractor;
pub use javascript::JavaScriptExtractor;
pub use kotlin::KotlinExtractor;
pub use objc::ObjectiveCExtractor;
pub use php::PhpExtractor;
pub use python::PythonExtractor;
pub use ruby::RubyExtractor;
pub use rust::RustExtractor;
pub use sql::SqlExtractor;
pub use swift::SwiftExtractor;
pub use typescript::TypeScriptExtractor;

/// One extractor per supported language.
pub fn default_extractors() -> Vec<Arc<dyn StructuralExtractor>> {
    vec![
        Arc::new(PythonExtractor),
        Arc::new(JavaExtractor),
        Arc::new(JavaScriptExtractor),
        Arc::new(TypeScriptExtractor),
        Arc::new(GoExtractor),
        Arc::new(RubyExtractor),
        Arc::new(KotlinExtractor),
        Arc::new(RustExtractor),
        Arc::new(CppExtractor),
        Arc::new(CExtractor),
        Arc::new(CSharpExtractor),
        Arc::new(PhpExtractor),
        Arc::new(SwiftExtractor),
        Arc::new(ObjectiveCExtractor),
        Arc::new(SqlExtractor),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::model::{language::LanguageKind, record::RecordStatus};

    const UNICODE_SOURCES: &[&str] = &[
        "public class Foo extends Bär implements Runnable {}",
        "class Foo extends Bär {}",
        "class Foo : Bär()",
        "public class Foo : Bär {}",
        "@interface Café : NSObject <Dé>\n- (void)naïve:(int)x;\n@end",
        "class Ünï extends 日本 implements 🚀 { function é($x = \"日\") {} }",
        "fn 日本() -> Bär { let s = \"🚀\"; }",
        "func (r *Rés) Hé(a, b 日) error { return nil }",
        "CREATE TABLE café (id INT PRIMARY KEY, nom TEXT DEFAULT 'é');",
        "struct Ünï : Bär<日> { Ünï(int é = 1); }; // 🚀",
        "def é(x=\"日\"):\n    return x  # 🚀\n",
    ];

    #[test]
    fn non_ascii_source_never_panics() {
        for ex in default_extractors() {
            for src in UNICODE_SOURCES {
                let mut cuts: Vec<usize> = src.char_indices().map(|(i, _)| i).collect();
                cuts.push(src.len());
                for cut in cuts {
                    let rec = ex.scan("x", &src[..cut]);
                    if ex.language() != LanguageKind::Python {
                        assert_ne!(
                            rec.status,
                            RecordStatus::Error,
                            "{:?} on {:?}",
                            ex.language(),
                            &src[..cut]
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn non_ascii_base_types_are_kept() {
        let java = JavaExtractor.scan("x", "public class Foo extends Bär implements Runnable {}");
        assert_eq!(java.types[0].name, "Foo");
        assert_eq!(java.types[0].extends, vec!["Bär".to_string()]);
        assert_eq!(java.types[0].implements, vec!["Runnable".to_string()]);

        let js = JavaScriptExtractor.scan("x", "class Foo extends Bär {}");
        assert_eq!(js.types[0].name, "Foo");

        let kt = KotlinExtractor.scan("x", "class Foo : Bär()");
        assert_eq!(kt.types[0].name, "Foo");

        let cs = CSharpExtractor.scan("x", "public class Foo : Bär {}");
        assert_eq!(cs.types[0].name, "Foo");
    }

    #[test]
    fn every_language_has_one_extractor() {
        let langs: HashSet<LanguageKind> = default_extractors().iter().map(|e| e.language()).collect();
        assert_eq!(langs.len(), default_extractors().len());
        for lang in LanguageKind::ALL {
            assert!(langs.contains(&lang), "missing extractor for {lang:?}");
        }
    }
}
