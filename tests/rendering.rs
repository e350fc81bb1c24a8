//! Integration tests for component templates, slots and context

use pretty_assertions::assert_eq;
use trellis::{
    tokenize, tokenize_baseline, BoxError, Component, ContextBehavior, DepsStrategy, Engine, Map,
    RenderArgs, RenderError, RenderInput, Settings, SimpleComponent, SlotContent, SlotError,
    TemplateSource, Value,
};

fn engine_with(components: &[(&str, &str)]) -> Engine {
    let engine = Engine::new(Settings::default().with_deps_strategy(DepsStrategy::Ignore));
    for (name, template) in components {
        engine
            .register_component(*name, SimpleComponent::new(*name, *template))
            .expect("register");
    }
    engine
}

fn page(engine: &Engine, src: &str) -> Result<String, RenderError> {
    engine.render_str(src, Map::new())
}

#[test]
fn test_component_with_fills() {
    let engine = engine_with(&[(
        "card",
        r#"<div class="card"><h2>{% slot "title" %}Untitled{% endslot %}</h2>{% slot "body" default %}{% endslot %}</div>"#,
    )]);

    let out = page(
        &engine,
        r#"{% component "card" %}{% fill "title" %}News{% endfill %}{% fill "body" %}<p>text</p>{% endfill %}{% endcomponent %}"#,
    )
    .unwrap();
    insta::assert_snapshot!(out, @r#"<div class="card"><h2>News</h2><p>text</p></div>"#);
}

#[test]
fn test_implicit_body_fills_default_slot() {
    let engine = engine_with(&[(
        "card",
        r#"<div>{% slot "title" %}Untitled{% endslot %}|{% slot "body" default %}empty{% endslot %}</div>"#,
    )]);

    let filled = page(&engine, r#"{% component "card" %}Hello{% endcomponent %}"#).unwrap();
    assert_eq!(filled, "<div>Untitled|Hello</div>");

    let blank = page(&engine, "{% component \"card\" %}\n  \n{% endcomponent %}").unwrap();
    assert_eq!(blank, "<div>Untitled|empty</div>");
}

#[test]
fn test_fill_sees_outer_context_and_slot_data() {
    let engine = engine_with(&[(
        "list",
        r#"<ul>{% for item in items %}<li>{% slot "row" item=item %}{{ item }}{% endslot %}</li>{% endfor %}</ul>"#,
    )]);

    let mut context = Map::new();
    context.insert("prefix".to_string(), "#".into());
    context.insert("things".to_string(), Value::from(vec!["a", "b"]));
    let out = engine
        .render_str(
            r#"{% component "list" items=things %}{% fill "row" data="row" %}{{ prefix }}{{ row.item }}{% endfill %}{% endcomponent %}"#,
            context,
        )
        .unwrap();
    assert_eq!(out, "<ul><li>#a</li><li>#b</li></ul>");
}

#[test]
fn test_label_synthesized_for_filled_field() {
    let engine = engine_with(&[(
        "form",
        r#"<label>{% slot "label:first_name" %}{% endslot %}</label>{% slot "field:first_name" %}{% endslot %}"#,
    )]);

    let out = page(
        &engine,
        r#"{% component "form" %}{% fill "field:first_name" %}<input name="first_name">{% endfill %}{% endcomponent %}"#,
    )
    .unwrap();
    assert_eq!(out, r#"<label>First Name</label><input name="first_name">"#);
}

#[test]
fn test_explicit_label_fill_wins() {
    let engine = engine_with(&[(
        "form",
        r#"<label>{% slot "label:email" %}{% endslot %}</label>{% slot "field:email" %}{% endslot %}"#,
    )]);

    let out = page(
        &engine,
        r#"{% component "form" %}{% fill "label:email" %}E-mail address{% endfill %}{% fill "field:email" %}<input>{% endfill %}{% endcomponent %}"#,
    )
    .unwrap();
    assert_eq!(out, "<label>E-mail address</label><input>");
}

#[test]
fn test_label_without_field_slot_is_error() {
    let engine = engine_with(&[("form", r#"{% slot "field:x" %}{% endslot %}"#)]);

    let err = page(
        &engine,
        r#"{% component "form" %}{% fill "field:x" %}x{% endfill %}{% fill "label:y" %}Y{% endfill %}{% endcomponent %}"#,
    )
    .unwrap_err();
    match err {
        RenderError::Slot(SlotError::UnusedLabels { component, labels }) => {
            assert_eq!(component, "form");
            assert_eq!(labels, vec!["label:y".to_string()]);
        }
        other => panic!("Expected unused label error, got {:?}", other),
    }
}

#[test]
fn test_required_slot_without_fill_is_error() {
    let engine = engine_with(&[("panel", r#"{% slot "header" required %}{% endslot %}"#)]);
    let err = page(&engine, r#"{% component "panel" / %}"#).unwrap_err();
    assert!(matches!(
        err,
        RenderError::Slot(SlotError::MissingRequired { ref slot, .. }) if slot == "header"
    ));
}

#[test]
fn test_slot_content_from_rust() {
    let engine = engine_with(&[(
        "row",
        r#"[{% slot "plain" %}{% endslot %}][{% slot "markup" %}{% endslot %}][{% slot "computed" n=3 %}{% endslot %}]"#,
    )]);

    let args = RenderArgs::new()
        .with_slot("plain", "<b>")
        .with_slot("markup", SlotContent::Html("<b>".to_string()))
        .with_slot(
            "computed",
            SlotContent::func(|kwargs: &Map| -> Result<String, BoxError> {
                let n = kwargs.get("n").and_then(Value::as_int).unwrap_or(0);
                Ok("*".repeat(n as usize))
            }),
        );
    let out = engine.render("row", args).unwrap();
    assert_eq!(out, "[&lt;b&gt;][<b>][***]");
}

#[test]
fn test_html_attrs_merge_in_component() {
    let engine = engine_with(&[(
        "button",
        r#"<button {% html_attrs attrs type="button" class="btn" %}>{{ label }}</button>"#,
    )]);

    let mut context = Map::new();
    let mut attrs = Map::new();
    attrs.insert("class".to_string(), "primary".into());
    attrs.insert("disabled".to_string(), Value::Bool(true));
    context.insert("extra".to_string(), Value::Map(attrs));
    let out = engine
        .render_str(
            r#"{% component "button" label="Save" attrs=extra / %}"#,
            context,
        )
        .unwrap();
    assert_eq!(
        out,
        r#"<button class="primary btn" disabled type="button">Save</button>"#
    );
}

#[test]
fn test_context_behaviors() {
    let page_src = r#"{% with who="Ann" %}{% component "hello" / %}|{% component "hello" only / %}{% endwith %}"#;

    let django = engine_with(&[("hello", "Hi {{ who }}")]);
    assert_eq!(page(&django, page_src).unwrap(), "Hi Ann|Hi ");

    let isolated = Engine::new(
        Settings::default()
            .with_deps_strategy(DepsStrategy::Ignore)
            .with_context_behavior(ContextBehavior::Isolated),
    );
    isolated
        .register_component("hello", SimpleComponent::new("hello", "Hi {{ who }}"))
        .unwrap();
    assert_eq!(page(&isolated, page_src).unwrap(), "Hi |Hi ");
}

#[test]
fn test_component_data_does_not_leak_to_page() {
    let engine = engine_with(&[("tag", "[{{ label }}]")]);
    let out = page(
        &engine,
        r#"{% component "tag" label="x" / %}{{ label }}{% component "tag" / %}"#,
    )
    .unwrap();
    assert_eq!(out, "[x][]");
}

struct Themed;

impl Component for Themed {
    fn template(&self) -> TemplateSource {
        TemplateSource::inline("<p class=\"{{ theme }}\">{% slot \"content\" default %}{% endslot %}</p>")
    }

    fn class_name(&self) -> Option<&str> {
        Some("themed")
    }

    fn get_template_data(&self, input: &RenderInput) -> Result<Map, BoxError> {
        let theme = input
            .inject("theme")
            .and_then(|values| values.get("color"))
            .cloned()
            .unwrap_or_else(|| Value::from("light"));
        let mut data = Map::new();
        data.insert("theme".to_string(), theme);
        Ok(data)
    }
}

#[test]
fn test_provide_reaches_nested_components() {
    let engine = engine_with(&[("wrapper", "<section>{% slot \"inner\" default %}{% endslot %}</section>")]);
    engine.register_component("themed", Themed).unwrap();

    let out = page(
        &engine,
        r#"{% provide "theme" color="dark" %}{% component "wrapper" %}{% component "themed" %}hi{% endcomponent %}{% endcomponent %}{% endprovide %}{% component "themed" %}bye{% endcomponent %}"#,
    )
    .unwrap();
    assert_eq!(
        out,
        r#"<section><p class="dark">hi</p></section><p class="light">bye</p>"#
    );
}

#[test]
fn test_template_string_arguments_render_before_passing() {
    let engine = engine_with(&[("heading", "<h1>{{ title }}</h1>"), ("mark", "<mark>{{ text }}</mark>")]);
    let out = page(
        &engine,
        r#"{% component "heading" title="{% lorem 3 w %}" / %}{% component "heading" title="{% component 'mark' text='hot' / %} news" / %}"#,
    )
    .unwrap();
    assert_eq!(out, "<h1>lorem ipsum dolor</h1><h1><mark>hot</mark> news</h1>");
}

#[test]
fn test_is_filled_exposed_to_templates() {
    let engine = engine_with(&[(
        "box",
        r#"{% if component_vars.is_filled.footer %}<footer>{% slot "footer" %}{% endslot %}</footer>{% endif %}"#,
    )]);
    assert_eq!(page(&engine, r#"{% component "box" / %}"#).unwrap(), "");
    assert_eq!(
        page(
            &engine,
            r#"{% component "box" %}{% fill "footer" %}f{% endfill %}{% endcomponent %}"#
        )
        .unwrap(),
        "<footer>f</footer>"
    );
}

#[test]
fn test_dynamic_component_name() {
    let engine = engine_with(&[("a", "A"), ("b", "B")]);
    let mut context = Map::new();
    context.insert("names".to_string(), Value::from(vec!["b", "a"]));
    let out = engine
        .render_str(
            "{% for n in names %}{% component n / %}{% endfor %}",
            context,
        )
        .unwrap();
    assert_eq!(out, "BA");

    let mut context = Map::new();
    context.insert("n".to_string(), Value::Int(3));
    let err = engine
        .render_str("{% component n / %}", context)
        .unwrap_err();
    assert!(matches!(err, RenderError::InvalidName { .. }));
}

#[test]
fn test_tokenizers_agree_without_nesting() {
    let src = "<p>{{ user.name|title }}</p>{% if a %}{% component \"card\" title='x y' / %}{% endif %}{# note #}";
    assert_eq!(tokenize(src, true).unwrap(), tokenize_baseline(src, true));
}

#[test]
fn test_tokenizer_keeps_nested_tags_in_one_argument() {
    let src = r#"{% component "heading" title="{% component 'mark' text='hot' / %} news" / %}"#;
    let args: Vec<String> = tokenize(src, true)
        .unwrap()
        .into_iter()
        .filter_map(|token| match token.node {
            trellis::parser::Token::TagArg(arg) => Some(arg),
            _ => None,
        })
        .collect();
    assert_eq!(
        args,
        vec![
            "\"heading\"".to_string(),
            r#"title="{% component 'mark' text='hot' / %} news""#.to_string(),
            "/".to_string(),
        ]
    );
}
