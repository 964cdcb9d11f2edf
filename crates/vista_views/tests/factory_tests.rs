//! Rendering through the factory: composers, creators, layouts, includes, loops.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::json;
use tempfile::TempDir;
use vista_core::{Dispatcher, Filesystem, LocalFilesystem, ViewError, ViewResult};
use vista_views::{BladeCompiler, EngineKind, EngineResolver, Factory, FileViewFinder};

struct Fixture {
    dir: TempDir,
    factory: Arc<Factory>,
}

impl Fixture {
    fn new(views: &[(&str, &str)]) -> Self {
        Self::with_files(views, Arc::new(LocalFilesystem::new()))
    }

    fn with_files(views: &[(&str, &str)], files: Arc<dyn Filesystem>) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("views");
        for (name, contents) in views {
            let path = root.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        let compiler = Arc::new(BladeCompiler::new(files.clone(), dir.path().join("cache")));
        let engines = Arc::new(EngineResolver::new(files.clone(), compiler));
        let finder = Arc::new(FileViewFinder::new(files, vec![root]));
        let factory = Arc::new(Factory::new(engines, finder, Arc::new(Dispatcher::new())));

        Self { dir, factory }
    }

    fn render(&self, name: &str, data: serde_json::Value) -> Result<String, ViewError> {
        self.factory.make(name, data, ())?.render()
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// Local files whose modification times only have whole-second resolution.
struct CoarseFilesystem(LocalFilesystem);

impl Filesystem for CoarseFilesystem {
    fn exists(&self, path: &Path) -> bool {
        self.0.exists(path)
    }

    fn is_directory(&self, path: &Path) -> bool {
        self.0.is_directory(path)
    }

    fn get(&self, path: &Path) -> ViewResult<String> {
        self.0.get(path)
    }

    fn put(&self, path: &Path, contents: &str) -> ViewResult<()> {
        self.0.put(path, contents)
    }

    fn last_modified(&self, path: &Path) -> ViewResult<SystemTime> {
        let precise = self.0.last_modified(path)?;
        let secs = precise
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok(UNIX_EPOCH + Duration::from_secs(secs))
    }

    fn delete(&self, path: &Path) -> ViewResult<()> {
        self.0.delete(path)
    }

    fn ensure_directory(&self, path: &Path) -> ViewResult<()> {
        self.0.ensure_directory(path)
    }

    fn files(&self, dir: &Path) -> ViewResult<Vec<PathBuf>> {
        self.0.files(dir)
    }
}

#[test]
fn test_data_overrides_merge_data() {
    let fx = Fixture::new(&[("hi.blade.html", "{{ a }}{{ b }}")]);
    let view = fx
        .factory
        .make("hi", json!({ "a": 1 }), json!({ "a": 0, "b": 2 }))
        .unwrap();

    assert_eq!(view.get("a"), Some(&json!(1)));
    assert_eq!(fx.render("hi", json!({ "a": "x", "b": "y" })).unwrap(), "xy");
}

#[test]
fn test_escaping() {
    let fx = Fixture::new(&[("e.blade.html", "{{ v }}|{!! v !!}|@{{ v }}")]);
    assert_eq!(
        fx.render("e", json!({ "v": "<b>\"Tom\" & 'Jerry'</b>" })).unwrap(),
        "&lt;b&gt;&quot;Tom&quot; &amp; &#039;Jerry&#039;&lt;/b&gt;|<b>\"Tom\" & 'Jerry'</b>|{{ v }}"
    );
}

#[test]
fn test_composers_run_on_each_render() {
    let fx = Fixture::new(&[("count.blade.html", "{{ n }}")]);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    fx.factory.composer("count", move |view| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        view.insert("n", json!(n));
    });

    assert_eq!(fx.render("count", json!({})).unwrap(), "1");
    assert_eq!(fx.render("count", json!({})).unwrap(), "2");
}

#[test]
fn test_creators_run_on_make() {
    let fx = Fixture::new(&[("c.blade.html", "{{ made }}")]);
    fx.factory.creator("c", |view| {
        view.insert("made", json!("yes"));
    });

    let view = fx.factory.make("c", (), ()).unwrap();
    assert!(view.has("made"));
    assert_eq!(fx.render("c", json!({})).unwrap(), "yes");
}

#[test]
fn test_wildcard_composer() {
    let fx = Fixture::new(&[
        ("admin/users.blade.html", "{{ area }}"),
        ("admin/posts.blade.html", "{{ area }}"),
        ("home.blade.html", "{{ area ?? 'public' }}"),
    ]);
    fx.factory.composer("admin.*", |view| {
        view.insert("area", json!("admin"));
    });

    assert_eq!(fx.render("admin.users", json!({})).unwrap(), "admin");
    assert_eq!(fx.render("admin/posts", json!({})).unwrap(), "admin");
    assert_eq!(fx.render("home", json!({})).unwrap(), "public");
}

#[test]
fn test_layout_sections_and_parent() {
    let fx = Fixture::new(&[
        (
            "layouts/app.blade.html",
            "<title>@yield('title', 'Site')</title>@section('nav')<a>home</a>@show<main>@yield('content')</main>",
        ),
        (
            "page.blade.html",
            "@extends('layouts.app') @section('nav') @parent <a>page</a> @endsection @section('content')<p>{{ body }}</p>@endsection",
        ),
    ]);

    assert_eq!(
        fx.render("page", json!({ "body": "hi" })).unwrap(),
        "<title>Site</title> <a>home</a> <a>page</a> <main><p>hi</p></main>"
    );
}

#[test]
fn test_inline_section_overrides_default() {
    let fx = Fixture::new(&[
        ("base.blade.html", "<title>@yield('title', 'Site')</title>"),
        ("child.blade.html", "@extends('base') @section('title', name)"),
    ]);

    assert_eq!(
        fx.render("child", json!({ "name": "Docs" })).unwrap(),
        "<title>Docs</title>"
    );
}

#[test]
fn test_includes_share_scope() {
    let fx = Fixture::new(&[
        ("list.blade.html", "@foreach(items as item)@include('row', ['n' => loop.iteration]) @endforeach"),
        ("row.blade.html", "{{ n }}:{{ item }}"),
    ]);

    assert_eq!(
        fx.render("list", json!({ "items": ["a", "b"] })).unwrap(),
        "1:a 2:b "
    );
}

#[test]
fn test_include_if_skips_missing() {
    let fx = Fixture::new(&[("main.blade.html", "[@includeIf('nothing')]")]);
    assert_eq!(fx.render("main", json!({})).unwrap(), "[]");

    let fx = Fixture::new(&[("main.blade.html", "[@include('nothing')]")]);
    assert!(fx.render("main", json!({})).unwrap_err().is_not_found());
}

#[test]
fn test_forelse_and_loop() {
    let fx = Fixture::new(&[(
        "loop.blade.html",
        "@forelse(xs as x){{ x }}@if(loop.last).@else,@endif @empty none @endforelse",
    )]);

    assert_eq!(fx.render("loop", json!({ "xs": [1, 2, 3] })).unwrap(), "1, 2, 3. ");
    assert_eq!(fx.render("loop", json!({ "xs": [] })).unwrap(), " none ");
}

#[test]
fn test_foreach_over_mapping() {
    let fx = Fixture::new(&[(
        "map.blade.html",
        "@foreach(m as k => v){{ k }}={{ v }};@endforeach",
    )]);

    assert_eq!(
        fx.render("map", json!({ "m": { "a": 1, "b": true } })).unwrap(),
        "a=1;b=true;"
    );
}

#[test]
fn test_undefined_variable() {
    let fx = Fixture::new(&[("u.blade.html", "{{ missing }}")]);
    match fx.render("u", json!({})) {
        Err(ViewError::Render { view, message }) => {
            assert_eq!(view, "u");
            assert!(message.contains("missing"));
        }
        other => panic!("expected render error, got {:?}", other),
    }
}

#[test]
fn test_expressions() {
    let fx = Fixture::new(&[
        (
            "math.blade.html",
            "{{ a + b * 2 }} {{ 7 / 2 }} {{ 'a' + 'b' }} @if(a < b && !flag)yes @endif {{ items[1] }}",
        ),
        ("div.blade.html", "{{ a / 0 }}"),
    ]);

    let data = json!({ "a": 1, "b": 3, "flag": false, "items": ["x", "y"] });
    assert_eq!(fx.render("math", data).unwrap(), "7 3.5 ab yes  y");
    assert!(matches!(
        fx.render("div", json!({ "a": 1 })),
        Err(ViewError::Render { .. })
    ));
}

#[test]
fn test_integer_overflow_falls_back_to_float() {
    let fx = Fixture::new(&[
        ("rem.blade.html", "{{ a % b }}"),
        ("div.blade.html", "{{ a / b }}"),
        ("neg.blade.html", "{{ -a }}"),
        ("mul.blade.html", "{{ a * b }}"),
    ]);
    let data = json!({ "a": i64::MIN, "b": -1 });

    assert_eq!(fx.render("rem", data.clone()).unwrap(), "0");
    for name in ["div", "neg", "mul"] {
        let out = fx.render(name, data.clone()).unwrap();
        assert_eq!(out.parse::<f64>().unwrap(), 9.223372036854775808e18, "{}", name);
    }
}

#[test]
fn test_recursive_include_is_stopped() {
    let fx = Fixture::new(&[("loop.blade.html", "x @include('loop')")]);
    assert!(matches!(
        fx.render("loop", json!({})),
        Err(ViewError::Render { .. })
    ));
}

#[test]
fn test_recompiles_when_source_changes() {
    let fx = Fixture::new(&[("v.blade.html", "one")]);
    assert_eq!(fx.render("v", json!({})).unwrap(), "one");

    let source = fx.root().join("views").join("v.blade.html");
    fs::write(&source, "two").unwrap();
    let later = SystemTime::now() + Duration::from_secs(5);
    fs::File::options()
        .write(true)
        .open(&source)
        .unwrap()
        .set_modified(later)
        .unwrap();

    assert_eq!(fx.render("v", json!({})).unwrap(), "two");
}

#[test]
fn test_recompiles_within_one_timestamp_tick() {
    let fx = Fixture::with_files(
        &[("v.blade.html", "one")],
        Arc::new(CoarseFilesystem(LocalFilesystem::new())),
    );
    assert_eq!(fx.render("v", json!({})).unwrap(), "one");

    fs::write(fx.root().join("views").join("v.blade.html"), "two").unwrap();
    assert_eq!(fx.render("v", json!({})).unwrap(), "two");
}

#[test]
fn test_extensions() {
    let fx = Fixture::new(&[("notes.txt", "{{ raw }}"), ("mail.md", "Hi {{ who }}")]);

    assert!(matches!(
        fx.factory.make("notes", (), ()),
        Err(ViewError::NotFound(_))
    ));

    fx.factory.add_extension("txt", EngineKind::File);
    fx.factory.add_extension("md", EngineKind::Blade);
    assert_eq!(fx.render("notes", json!({})).unwrap(), "{{ raw }}");
    assert_eq!(fx.render("mail", json!({ "who": "Bo" })).unwrap(), "Hi Bo");
}

#[test]
fn test_first_and_file() {
    let fx = Fixture::new(&[("b.blade.html", "B")]);

    let view = fx.factory.first(&["a", "b"], (), ()).unwrap();
    assert_eq!(view.name(), "b");
    assert!(fx.factory.first(&["a", "c"], (), ()).unwrap_err().is_not_found());

    let outside = fx.root().join("outside.blade.html");
    fs::write(&outside, "{{ x }}").unwrap();
    let mut view = fx.factory.file(&outside, json!({ "x": 7 }), ()).unwrap();
    assert_eq!(view.engine(), EngineKind::Blade);
    assert_eq!(view.render().unwrap(), "7");
}

#[test]
fn test_namespaced_views() {
    let fx = Fixture::new(&[]);
    let mail = fx.root().join("mail");
    fs::create_dir_all(&mail).unwrap();
    fs::write(mail.join("welcome.blade.html"), "Welcome {{ name }}").unwrap();
    fx.factory.add_namespace("mail", vec![mail]);

    assert!(fx.factory.exists("mail::welcome"));
    assert_eq!(
        fx.render("mail::welcome", json!({ "name": "Ann" })).unwrap(),
        "Welcome Ann"
    );
}
