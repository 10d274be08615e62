use ujinja::value::Map;
use ujinja::{AutoEscape, Config, Context, Environment, Error, MemoryLoader, Syntax, Value};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn data(pairs: &[(&str, Value)]) -> Value {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert(k.to_string(), v.clone());
    }
    Value::from_map(map)
}

fn render(src: &str, ctx: &Value) -> ujinja::Result<String> {
    Environment::default().render_str(src, ctx)
}

#[test]
fn test_plain_text_is_identity() {
    init();
    for text in ["", "hello", "line one\n  line two\n", "{ not a tag }", "100% } done %"] {
        assert_eq!(render(text, &Value::NONE).unwrap(), text);
    }
}

#[test]
fn test_truthiness_table() {
    init();
    let inputs = [
        Value::from(0),
        Value::from(1),
        Value::from(""),
        Value::from("x"),
        Value::from_seq(vec![]),
        Value::from_seq(vec![Value::from(1)]),
        Value::NONE,
    ];
    let got: Vec<String> = inputs
        .iter()
        .map(|v| render("{% if v %}T{% else %}F{% endif %}", &data(&[("v", v.clone())])).unwrap())
        .collect();
    assert_eq!(got, ["F", "T", "F", "T", "F", "T", "F"]);
}

#[test]
fn test_raw_under_any_delimiters() {
    init();
    assert_eq!(
        render("{% raw %}{{ not evaluated }}{% endraw %}", &Value::NONE).unwrap(),
        "{{ not evaluated }}"
    );

    let syntax = Syntax {
        block_start: "<%".into(),
        block_end: "%>".into(),
        variable_start: "${".into(),
        variable_end: "}".into(),
        comment_start: "<#".into(),
        comment_end: "#>".into(),
    };
    let env = Environment::default().with_config(Config::default().with_syntax(syntax));
    let ctx = data(&[("x", Value::from(5))]);
    assert_eq!(
        env.render_str("<% raw %>{{ not evaluated }} ${ x }<% endraw %>", &ctx)
            .unwrap(),
        "{{ not evaluated }} ${ x }"
    );
    assert_eq!(
        env.render_str("<# note #><% if x %>${ x * 2 }<% endif %>{{ x }}", &ctx)
            .unwrap(),
        "10{{ x }}"
    );
}

#[test]
fn test_syntax_from_config_file() {
    init();
    let xml = "<syntax><variable_start>[[</variable_start><variable_end>]]</variable_end></syntax>";
    let syntax: Syntax = quick_xml::de::from_str(xml).unwrap();
    // Missing fields keep their defaults.
    assert_eq!(syntax.block_start, "{%");
    assert_eq!(syntax.variable_start, "[[");

    let env = Environment::default().with_config(Config::default().with_syntax(syntax));
    assert_eq!(
        env.render_str("[[ 1 + 1 ]]{% if true %}!{% endif %}", &Value::NONE).unwrap(),
        "2!"
    );
}

#[test]
fn test_whitespace_control() {
    init();
    let ctx = data(&[(
        "items",
        Value::from_seq(vec![Value::from(1), Value::from(2)]),
    )]);
    assert_eq!(
        render("<ul>\n  {%- for i in items %}\n  <li>{{ i }}</li>\n  {%- endfor %}\n</ul>", &ctx)
            .unwrap(),
        "<ul>\n  <li>1</li>\n  <li>2</li>\n</ul>"
    );
    assert_eq!(render("a   {{- 'b' -}}   c", &Value::NONE).unwrap(), "abc");

    let env = Environment::default().with_config(
        Config::default()
            .with_trim_blocks(true)
            .with_lstrip_blocks(true),
    );
    assert_eq!(
        env.render_str("<p>\n    {% if true %}\n    yes\n    {% endif %}\n</p>", &Value::NONE)
            .unwrap(),
        "<p>\n    yes\n</p>"
    );
}

#[test]
fn test_loop_metadata() {
    init();
    let ctx = data(&[(
        "xs",
        Value::from_seq(vec![Value::from("a"), Value::from("b"), Value::from("c")]),
    )]);
    assert_eq!(
        render(
            "{% for x in xs %}{{ loop.index }}{{ x }}{% if not loop.last %},{% endif %}{% endfor %}",
            &ctx
        )
        .unwrap(),
        "1a,2b,3c"
    );
    assert_eq!(
        render(
            "{% for x in xs %}{{ loop.revindex0 }}{{ loop.previtem }}{{ loop.first }}|{% endfor %}",
            &ctx
        )
        .unwrap(),
        "2True|1aFalse|0bFalse|"
    );
    assert_eq!(
        render("{% for x in xs if x != 'b' %}{{ loop.index }}/{{ loop.length }} {% endfor %}", &ctx)
            .unwrap(),
        "1/2 2/2 "
    );
    assert_eq!(
        render("{% for x in [] %}x{% else %}empty{% endfor %}", &ctx).unwrap(),
        "empty"
    );
    assert_eq!(
        render(
            "{% for k, v in {'b': 2, 'a': 1}.items() %}{{ k }}={{ v }};{% endfor %}",
            &ctx
        )
        .unwrap(),
        "a=1;b=2;"
    );
    assert_eq!(render("{% for x in xs %}{% endfor %}{{ x }}", &ctx).unwrap(), "");
}

#[test]
fn test_set_and_with_scoping() {
    init();
    let ctx = Value::NONE;
    assert_eq!(
        render("{% set a, b = 1, 2 %}{{ a + b }}", &ctx).unwrap(),
        "3"
    );
    assert_eq!(
        render("{% set greeting %}Hi {{ 'there' }}{% endset %}[{{ greeting }}]", &ctx).unwrap(),
        "[Hi there]"
    );
    assert_eq!(
        render("{% set x = 1 %}{% with x = x + 1 %}{{ x }}{% endwith %}{{ x }}", &ctx).unwrap(),
        "21"
    );
    assert_eq!(
        render("{% set d = {'a': {'b': 1}} %}{% set d.a.b = 5 %}{{ d.a.b }}", &ctx).unwrap(),
        "5"
    );
}

#[test]
fn test_method_mutation_is_visible_later() {
    init();
    let ctx = data(&[("cart", data(&[("items", Value::from_seq(vec![]))]))]);
    assert_eq!(
        render(
            "{{ cart.items.append('apple') }}{{ cart.items.append('pear') }}{{ cart.items | join(', ') }}",
            &ctx
        )
        .unwrap(),
        "apple, pear"
    );
    assert_eq!(
        render(
            "{% set m = {'a': 1} %}{{ m.update({'b': 2}) }}{{ m.keys() | list }} {{ m.get('z', 0) }}",
            &ctx
        )
        .unwrap(),
        "['a', 'b'] 0"
    );
    assert_eq!(
        render("{{ '{} and {name}'.format('x', name='y') }}", &ctx).unwrap(),
        "x and y"
    );
}

#[test]
fn test_macros_defaults_and_strict_mode() {
    init();
    let src = "{% macro m(a, b=1) %}{{a}}-{{b}}{% endmacro %}";
    assert_eq!(render(&format!("{}{{{{ m(2) }}}}", src), &Value::NONE).unwrap(), "2-1");
    assert_eq!(render(&format!("{}{{{{ m(2,3) }}}}", src), &Value::NONE).unwrap(), "2-3");
    assert_eq!(render(&format!("{}{{{{ m(b=4, a=0) }}}}", src), &Value::NONE).unwrap(), "0-4");
    assert_eq!(render(&format!("{}{{{{ m() }}}}", src), &Value::NONE).unwrap(), "-1");

    let strict = Environment::default().with_config(Config::default().with_strict(true));
    match strict.render_str(&format!("{}{{{{ m() }}}}", src), &Value::NONE) {
        Err(Error::Eval { message, .. }) => assert!(message.contains("'a'")),
        other => panic!("unexpected {:?}", other),
    }

    assert!(matches!(
        render(&format!("{}{{{{ m(1, 2, 3) }}}}", src), &Value::NONE),
        Err(Error::InvalidCall { .. })
    ));
    assert!(matches!(
        render(&format!("{}{{{{ m(1, c=2) }}}}", src), &Value::NONE),
        Err(Error::InvalidCall { .. })
    ));
}

#[test]
fn test_macros_close_over_their_scope() {
    init();
    assert_eq!(
        render(
            "{% set who = 'outer' %}{% macro hi() %}{{ who }}{% endmacro %}{% set who = 'later' %}{{ hi() }}",
            &Value::NONE
        )
        .unwrap(),
        "outer"
    );
    assert_eq!(
        render(
            "{% macro fact(n) %}{% if n <= 1 %}1{% else %}{{ n * (fact(n - 1) | int) }}{% endif %}{% endmacro %}{{ fact(5) }}",
            &Value::NONE
        )
        .unwrap(),
        "120"
    );
    let deep = Environment::default().with_config(Config::default().with_max_depth(8));
    assert!(
        deep.render_str("{% macro f() %}{{ f() }}{% endmacro %}{{ f() }}", &Value::NONE)
            .is_err()
    );
}

#[test]
fn test_autoescape() {
    init();
    let ctx = data(&[("html", Value::from("<b>&</b>"))]);
    let loader = MemoryLoader::new();
    loader
        .add("page.html", "{{ html }}|{{ html | safe }}")
        .add("page.txt", "{{ html }}");
    let env = Environment::new(loader)
        .with_config(Config::default().with_autoescape(AutoEscape::html_extensions()));
    assert_eq!(
        env.render("page.html", &ctx).unwrap(),
        "&lt;b&gt;&amp;&lt;/b&gt;|<b>&</b>"
    );
    assert_eq!(env.render("page.txt", &ctx).unwrap(), "<b>&</b>");
    assert_eq!(render("{{ html | e }}", &ctx).unwrap(), "&lt;b&gt;&amp;&lt;/b&gt;");
}

#[test]
fn test_filters_and_tests_compose() {
    init();
    let ctx = data(&[(
        "words",
        Value::from_seq(vec![Value::from("pear"), Value::from("Apple"), Value::from("fig")]),
    )]);
    match render("{{ words | shout }}", &ctx) {
        Err(Error::Eval { message, .. }) => assert!(message.contains("shout")),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(
        render("{{ words | sort | join(',') | upper }}", &ctx).unwrap(),
        "APPLE,FIG,PEAR"
    );
    assert_eq!(
        render("{{ words | length }} {{ 4 is even }} {{ 9 is divisibleby(3) }} {{ 'fig' in words }}", &ctx)
            .unwrap(),
        "3 True True True"
    );
    assert_eq!(render("{{ 3.14159 | round(2) }} {{ '42' | int + 1 }}", &ctx).unwrap(), "3.14 43");
}

#[test]
fn test_render_into_context() {
    init();
    let env = Environment::default();
    let template = env.compile("greet", "{{ greeting }}, {{ name }}!").unwrap();
    let mut ctx = Context::new();
    ctx.insert("greeting", "Hello").insert("name", "ujinja");
    assert_eq!(env.render_template(&template, ctx).unwrap(), "Hello, ujinja!");
}

#[test]
fn test_raw_with_whitespace_control() {
    init();
    let trim = Environment::default().with_config(Config::default().with_trim_blocks(true));
    assert_eq!(
        trim.render_str("{% raw %}\nX\n{% endraw %}\nY", &Value::NONE).unwrap(),
        "X\nY"
    );
    assert_eq!(
        render("{% raw -%}  x  {%- endraw %}", &Value::NONE).unwrap(),
        "x"
    );
    assert_eq!(
        render("{% raw %}  {{ x }}  {% endraw %}", &Value::NONE).unwrap(),
        "  {{ x }}  "
    );

    let lstrip = Environment::default().with_config(Config::default().with_lstrip_blocks(true));
    assert_eq!(
        lstrip.render_str("  {% raw %}a\n  {% endraw %}b", &Value::NONE).unwrap(),
        "a\nb"
    );
    let both = Environment::default().with_config(
        Config::default()
            .with_trim_blocks(true)
            .with_lstrip_blocks(true),
    );
    assert_eq!(
        both.render_str("<div>\n  {% raw %}\n  {{ x }}\n  {% endraw %}\n</div>", &Value::NONE)
            .unwrap(),
        "<div>\n  {{ x }}\n</div>"
    );
}

#[test]
fn test_nesting_limit() {
    init();
    let parens = format!("{{{{ {}1{} }}}}", "(".repeat(5000), ")".repeat(5000));
    assert!(matches!(render(&parens, &Value::NONE), Err(Error::Parse { .. })));
    let brackets = format!("{{{{ {}1{} }}}}", "[".repeat(5000), "]".repeat(5000));
    assert!(matches!(render(&brackets, &Value::NONE), Err(Error::Parse { .. })));
    let nots = format!("{{{{ {}true }}}}", "not ".repeat(5000));
    assert!(matches!(render(&nots, &Value::NONE), Err(Error::Parse { .. })));
    let sums = format!("{{{{ 1{} }}}}", " + 1".repeat(5000));
    assert!(matches!(render(&sums, &Value::NONE), Err(Error::Parse { .. })));
    let filters = format!("{{{{ 'a'{} }}}}", " | upper".repeat(5000));
    assert!(matches!(render(&filters, &Value::NONE), Err(Error::Parse { .. })));
    let ifs = format!(
        "{}x{}",
        "{% if true %}".repeat(5000),
        "{% endif %}".repeat(5000)
    );
    assert!(matches!(render(&ifs, &Value::NONE), Err(Error::Parse { .. })));

    // Ordinary depths are unaffected.
    let parens = format!("{{{{ {}1{} }}}}", "(".repeat(30), ")".repeat(30));
    assert_eq!(render(&parens, &Value::NONE).unwrap(), "1");
    let sums = format!("{{{{ 1{} }}}}", " + 1".repeat(30));
    assert_eq!(render(&sums, &Value::NONE).unwrap(), "31");
    let ifs = format!("{}x{}", "{% if true %}".repeat(30), "{% endif %}".repeat(30));
    assert_eq!(render(&ifs, &Value::NONE).unwrap(), "x");
}

#[test]
fn test_repetition_overflow_is_an_error() {
    init();
    for src in [
        "{{ [1, 2] * 9223372036854775807 }}",
        "{{ 'ab' * 9223372036854775807 }}",
        "{{ 9223372036854775807 * [1] }}",
    ] {
        match render(src, &Value::NONE) {
            Err(Error::Eval { message, .. }) => assert!(message.contains("overflow"), "{}", message),
            other => panic!("unexpected {:?} for {}", other, src),
        }
    }
    assert_eq!(render("{{ [1, 2] * 2 }}", &Value::NONE).unwrap(), "[1, 2, 1, 2]");
}
