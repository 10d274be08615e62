use std::path::Path;

use ujinja::value::Map;
use ujinja::{Environment, Error, FileSystemLoader, MemoryLoader, Value};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fixtures() -> Environment {
    Environment::new(FileSystemLoader::new(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/templates"),
    ))
}

fn page_data() -> Value {
    let mut data = Map::new();
    data.insert("page".into(), Value::from("Home"));
    data.insert("title".into(), Value::from("Hi"));
    data.insert(
        "items".into(),
        Value::from_seq(vec![Value::from(1), Value::from(2)]),
    );
    Value::from_map(data)
}

#[test]
fn test_parent_and_child_blocks() {
    init();
    let loader = MemoryLoader::new();
    loader
        .add("parent.tpl", "<{% block greeting %}Hi{% endblock %}>")
        .add(
            "child.tpl",
            "{% extends \"parent.tpl\" %}ignored{% block greeting %}Hello{% endblock %}",
        );
    let env = Environment::new(loader);
    assert_eq!(env.render("child.tpl", &()).unwrap(), "<Hello>");
    assert_eq!(env.render("parent.tpl", &()).unwrap(), "<Hi>");
}

#[test]
fn test_super_through_three_generations() {
    init();
    let env = fixtures();
    assert_eq!(
        env.render("pages/child.html", &page_data()).unwrap(),
        "<title>Home - Pages | Site</title>\n<main><ul><li>1</li><li>2</li></ul></main>"
    );
    assert_eq!(
        env.render("pages/layout.html", &page_data()).unwrap(),
        "<title>Pages | Site</title>\n<main></main>"
    );
}

#[test]
fn test_child_top_level_set_reaches_parent() {
    init();
    let loader = MemoryLoader::new();
    loader
        .add("base", "{{ title }}:{% block body %}{% endblock %}")
        .add(
            "page",
            "{% extends 'base' %}{% set title = 'Page' %}{% block body %}{{ title }}{% endblock %}",
        );
    let env = Environment::new(loader);
    assert_eq!(env.render("page", &()).unwrap(), "Page:Page");
}

#[test]
fn test_cyclic_extends() {
    init();
    let loader = MemoryLoader::new();
    loader
        .add("a.tpl", "{% extends 'b.tpl' %}")
        .add("b.tpl", "{% extends 'a.tpl' %}");
    let env = Environment::new(loader);
    match env.render("a.tpl", &()) {
        Err(Error::Parse { message, .. }) => assert!(message.contains("cyclic extends")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_super_outside_of_block() {
    init();
    let env = Environment::default();
    assert!(env.render_str("{{ super() }}", &()).is_err());
    assert!(env.render_str("{% block a %}{{ super() }}{% endblock %}", &()).is_err());
}

#[test]
fn test_include() {
    init();
    let env = fixtures();
    let data = page_data();
    assert_eq!(
        env.render_str("{% include \"missing.tpl\" ignore missing %}", &data)
            .unwrap(),
        ""
    );
    assert!(matches!(
        env.render_str("{% include \"missing.tpl\" %}", &data),
        Err(Error::TemplateNotFound(_))
    ));
    assert_eq!(
        env.render_str(
            "{% include ['missing.tpl', 'partials/items.html'] %}",
            &data
        )
        .unwrap(),
        "<li>1</li><li>2</li>"
    );
    assert_eq!(
        env.render_str(
            "[{% include 'partials/items.html' without context %}]",
            &data
        )
        .unwrap(),
        "[]"
    );
}

#[test]
fn test_broken_include_is_not_ignored() {
    init();
    let loader = MemoryLoader::new();
    loader.add("broken.tpl", "{% if %}");
    let env = Environment::new(loader);
    assert!(matches!(
        env.render_str("{% include 'broken.tpl' ignore missing %}", &()),
        Err(Error::Parse { .. })
    ));
}

#[test]
fn test_import_and_from_import() {
    init();
    let env = fixtures();
    assert_eq!(
        env.render("pages/links.html", &page_data()).unwrap(),
        "<a href=\"/home\">link</a>|<a href=\"/about\">About</a>|<b>Hi</b>"
    );
    match env.render_str("{% from 'macros.html' import nothing %}", &()) {
        Err(e) => assert!(e.to_string().contains("does not export")),
        Ok(out) => panic!("unexpected output {:?}", out),
    }
}

#[test]
fn test_import_scoping() {
    init();
    let loader = MemoryLoader::new();
    loader.add(
        "helpers.tpl",
        "{% macro who() %}[{{ user }}]{% endmacro %}",
    );
    let env = Environment::new(loader);
    let mut data = Map::new();
    data.insert("user".into(), Value::from("ana"));
    let data = Value::from_map(data);

    assert_eq!(
        env.render_str("{% import 'helpers.tpl' as h %}{{ h.who() }}", &data)
            .unwrap(),
        "[]"
    );
    assert_eq!(
        env.render_str(
            "{% import 'helpers.tpl' as h with context %}{{ h.who() }}",
            &data
        )
        .unwrap(),
        "[ana]"
    );
    // Names bound by the import stay local to the importing template.
    assert_eq!(
        env.render_str(
            "{% from 'helpers.tpl' import who as w %}{{ w() }}{{ who is defined }}",
            &data
        )
        .unwrap(),
        "[]False"
    );
}

#[test]
fn test_recursion_limit_on_self_include() {
    init();
    let loader = MemoryLoader::new();
    loader.add("loop.tpl", "x{% include 'loop.tpl' %}");
    let env = Environment::new(loader);
    match env.render("loop.tpl", &()) {
        Err(Error::Eval { message, .. }) => assert!(message.contains("recursion")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_extending_template_inside_capture_prints_only_blocks() {
    init();
    let loader = MemoryLoader::new();
    loader
        .add("base.html", "<{% block b %}base{% endblock %}>")
        .add(
            "child.html",
            "{% extends 'base.html' %}JUNK{% block b %}child{% endblock %}",
        )
        .add(
            "kept.html",
            "{% extends 'base.html' %}{% set x %}kept{% endset %}JUNK{% block b %}{{ x }}{% endblock %}",
        );
    let env = Environment::new(loader);
    for src in [
        "{% include 'child.html' %}",
        "{% macro m() %}{% include 'child.html' %}{% endmacro %}{{ m() }}",
        "{% set x %}{% include 'child.html' %}{% endset %}{{ x }}",
        "{% macro m() %}{% set x %}{% include 'child.html' %}{% endset %}[{{ x }}]{% endmacro %}{{ m() }}",
    ] {
        let out = env.render_str(src, &()).unwrap();
        assert_eq!(out.replace(['[', ']'], ""), "<child>", "{}", src);
    }
    // A set block on the discarded top level still captures its body.
    assert_eq!(env.render("kept.html", &()).unwrap(), "<kept>");
    assert_eq!(
        env.render_str("{% macro m() %}{% include 'kept.html' %}{% endmacro %}{{ m() }}", &())
            .unwrap(),
        "<kept>"
    );
}
