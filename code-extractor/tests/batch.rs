use std::{
    fs,
    future::Future,
    path::Path,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use ai_llm_service::AiLlmError;
use code_extractor::{
    BatchStatus, CancelToken, CompletionProvider, ExtractConfig, ExtractionDispatcher,
    FallbackExtractor, FileInput, LanguageKind, RecordStatus, UnknownLanguagePolicy,
    extract_files, extract_repository,
};

/// Answers every prompt with the same text after an optional delay.
struct FixedProvider {
    answer: String,
    delay: Duration,
    calls: AtomicUsize,
}

impl FixedProvider {
    fn new(answer: &str, delay: Duration) -> Self {
        Self {
            answer: answer.to_string(),
            delay,
            calls: AtomicUsize::new(0),
        }
    }
}

impl CompletionProvider for FixedProvider {
    fn complete<'a>(
        &'a self,
        _prompt: &'a str,
        _system: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<String, AiLlmError>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(self.answer.clone())
        })
    }
}

fn write(root: &Path, rel: &str, body: &str) {
    let p = root.join(rel);
    if let Some(dir) = p.parent() {
        fs::create_dir_all(dir).unwrap();
    }
    fs::write(p, body).unwrap();
}

fn heuristic_dispatcher(cfg: ExtractConfig) -> ExtractionDispatcher {
    let fb = FallbackExtractor::heuristic_only(&cfg);
    ExtractionDispatcher::with_defaults(cfg, fb)
}

fn sample_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "src/app.py", "import os\n\nclass App:\n    def run(self):\n        pass\n");
    write(root, "web/server.js", "const express = require('express');\napp.get(\"/users/:id\", getUser);\n");
    write(root, "api/Users.java", "package a;\npublic class Users {\n  public void list() {}\n}\n");
    write(root, "lib/cart.ex", "defmodule Cart do\n  def add(c, i) do\n  end\nend\n");
    write(root, "db/schema.sql", "CREATE TABLE users (id INT PRIMARY KEY);\n");
    write(root, "node_modules/x/index.js", "module.exports = 1;\n");
    dir
}

#[tokio::test]
async fn repository_batch_routes_every_language() {
    let repo = sample_repo();
    let d = heuristic_dispatcher(ExtractConfig::default());
    let batch = extract_repository(&d, repo.path(), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(batch.status, BatchStatus::Success);
    let paths: Vec<_> = batch.records.iter().map(|r| r.file_path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["api/Users.java", "db/schema.sql", "lib/cart.ex", "src/app.py", "web/server.js"]
    );
    assert_eq!(batch.total_files, 5);

    let by_path = |p: &str| batch.records.iter().find(|r| r.file_path == p).unwrap();
    assert_eq!(by_path("src/app.py").status, RecordStatus::Success);
    assert_eq!(by_path("src/app.py").language.as_str(), "python");
    assert_eq!(by_path("lib/cart.ex").status, RecordStatus::Heuristic);
    assert_eq!(by_path("lib/cart.ex").language.as_str(), "ex");
    assert_eq!(by_path("db/schema.sql").types[0].name, "users");

    let js = by_path("web/server.js");
    assert_eq!(js.endpoints[0].method, "GET");
    assert_eq!(js.endpoints[0].path, "/users/:id");
    assert_eq!(js.endpoints[0].handler.as_deref(), Some("getUser"));
}

#[tokio::test]
async fn skip_policy_counts_unclassified_files() {
    let repo = sample_repo();
    let cfg = ExtractConfig {
        unknown_language: UnknownLanguagePolicy::Skip,
        ..ExtractConfig::default()
    };
    let d = heuristic_dispatcher(cfg);
    let batch = extract_repository(&d, repo.path(), &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(batch.total_files, 4);
    assert!(batch.records.iter().all(|r| r.file_path != "lib/cart.ex"));
    assert!(batch.skipped_files >= 1);
}

#[cfg(unix)]
#[tokio::test]
async fn one_unreadable_file_does_not_fail_the_batch() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "a.py", "x = 1\n");
    write(root, "b.go", "package main\n");
    write(root, "c.rb", "class C\nend\n");
    let locked = root.join("b.go");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    // Privileged users read through mode bits; nothing to check then.
    if fs::read(&locked).is_ok() {
        return;
    }

    let d = heuristic_dispatcher(ExtractConfig::default());
    let files = ["a.py", "b.go", "c.rb"]
        .iter()
        .map(|f| FileInput::relative_to(root, root.join(f)))
        .collect();
    let batch = extract_files(&d, files, &CancelToken::new()).await;

    assert_eq!(batch.status, BatchStatus::Success);
    assert_eq!(batch.records.len(), 3);
    let bad = &batch.records[1];
    assert_eq!(bad.file_path, "b.go");
    assert_eq!(bad.status, RecordStatus::Error);
    assert!(bad.error.is_some());
    assert_eq!(bad.language.as_str(), "go");
    assert_eq!(batch.degraded().count(), 1);
}

#[tokio::test]
async fn cancellation_stops_dispatching_new_files() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for i in 0..6 {
        write(root, &format!("f{i}.ex"), "def x do end\n");
    }

    let cfg = ExtractConfig {
        concurrency: 1,
        llm_concurrency: 1,
        ..ExtractConfig::default()
    };
    let provider = Arc::new(FixedProvider::new("{\"functions\": [\"x\"]}", Duration::from_millis(200)));
    let dyn_provider: Arc<dyn CompletionProvider> = provider.clone();
    let fb = FallbackExtractor::new(Some(dyn_provider), &cfg);
    let d = ExtractionDispatcher::with_defaults(cfg, fb);

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let files = (0..6)
        .map(|i| FileInput::relative_to(root, root.join(format!("f{i}.ex"))))
        .collect();
    let batch = extract_files(&d, files, &cancel).await;

    assert_eq!(batch.status, BatchStatus::Cancelled);
    assert!(!batch.records.is_empty());
    assert!(batch.records.len() < 6);
    assert_eq!(provider.calls.load(Ordering::SeqCst), batch.records.len());
    assert!(batch.records.iter().all(|r| r.status == RecordStatus::Llm));
}

#[tokio::test]
async fn records_are_sorted_regardless_of_completion_order() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let names = ["z.py", "m.ts", "a.go", "k.kt", "b.rs", "c.c"];
    for n in names {
        write(root, n, "\n");
    }
    let cfg = ExtractConfig {
        concurrency: 4,
        ..ExtractConfig::default()
    };
    let d = heuristic_dispatcher(cfg);
    let files = names
        .iter()
        .map(|n| FileInput::relative_to(root, root.join(n)))
        .collect();
    let batch = extract_files(&d, files, &CancelToken::new()).await;
    let paths: Vec<_> = batch.records.iter().map(|r| r.file_path.as_str()).collect();
    assert_eq!(paths, vec!["a.go", "b.rs", "c.c", "k.kt", "m.ts", "z.py"]);
}

#[tokio::test]
async fn every_registered_language_survives_malformed_input() {
    let d = heuristic_dispatcher(ExtractConfig::default());
    let inputs = [
        "}{ ))(( <<<< \"unterminated '' /* open\n\0\u{feff} class fn def",
        "class Ünï extends Bär implements 日本 {",
        "public class Foo : Bär, 🚀 { void é(int 日 = 1",
        "interface Café<T> extends Dé<T> { fun naïve(x: 日): Bär",
    ];
    for lang in LanguageKind::ALL {
        let ext = match lang {
            LanguageKind::ObjectiveC => "m",
            LanguageKind::CSharp => "cs",
            LanguageKind::Cpp => "cpp",
            LanguageKind::JavaScript => "js",
            LanguageKind::TypeScript => "ts",
            LanguageKind::Python => "py",
            LanguageKind::Ruby => "rb",
            LanguageKind::Kotlin => "kt",
            LanguageKind::Rust => "rs",
            other => other.as_str(),
        };
        let path = format!("x.{ext}");
        for junk in inputs {
            let rec = d.process_text(&path, junk.to_string()).await.unwrap();
            assert_eq!(rec.file_path, path);
            assert_eq!(rec.language.as_str(), lang.as_str(), "{path}");
            // Only the grammar-backed extractor may reject input.
            if lang != LanguageKind::Python {
                assert_ne!(rec.status, RecordStatus::Error, "{path}: {:?}", rec.error);
            }
        }
    }
}
