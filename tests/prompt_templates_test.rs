//! Checks against the shipped `prompts/prompt.yaml`.

use std::path::PathBuf;

use gptube::diagnose::sample_parameters;
use gptube::{Error, ParameterSet, PromptKey, TemplateStore, resolve};

fn shipped_store() -> TemplateStore {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("prompts/prompt.yaml");
    TemplateStore::load(path).expect("shipped prompt file loads")
}

#[test]
fn test_should_ship_every_known_prompt() {
    let store = shipped_store();
    for key in PromptKey::ALL {
        let template = store.get_known(key).unwrap();
        assert!(!template.is_empty(), "{key} is empty");
    }
}

#[test]
fn test_should_declare_exactly_title_and_time_for_short_prompt() {
    let store = shipped_store();
    let template = store.get_known(PromptKey::Short).unwrap();
    let names: Vec<&str> = template.placeholders().iter().map(String::as_str).collect();
    assert_eq!(names, ["time", "title"]);
    assert!(template.source().contains("{title}"));
    assert!(template.source().contains("{time}"));
}

#[test]
fn test_should_resolve_short_prompt_for_several_topics() {
    let store = shipped_store();
    let template = store.get_known(PromptKey::Short).unwrap();
    for (title, time) in [
        ("cooking secrets", "40"),
        ("travel tips", "30"),
        ("science facts", "60"),
        ("history lessons", "45"),
    ] {
        let params = ParameterSet::new().with("title", title).with("time", time);
        let prompt = resolve(template, &params).unwrap();
        assert!(!prompt.as_str().contains("{title}"));
        assert!(!prompt.as_str().contains("{time}"));
        assert!(prompt.as_str().contains(title));
        assert!(prompt.as_str().contains(time));
        assert!(prompt.anomalies().is_empty());
    }
}

#[test]
fn test_should_return_equal_templates_on_repeated_lookup() {
    let store = shipped_store();
    let first = store.get("short_prompt").unwrap().clone();
    for _ in 0..3 {
        assert_eq!(store.get("short_prompt").unwrap(), &first);
    }
}

#[test]
fn test_should_preserve_special_characters_verbatim() {
    let store = shipped_store();
    let template = store.get_known(PromptKey::Short).unwrap();
    for title in [
        "cooking's best secrets",
        "10 tips & tricks",
        "quotes \"and\" apostrophes",
        "numbers 123 and symbols @#$",
    ] {
        let params = ParameterSet::new().with("title", title).with("time", "30");
        let prompt = resolve(template, &params).unwrap();
        assert!(prompt.as_str().contains(title), "lost {title:?}");
    }
}

#[test]
fn test_should_keep_script_and_youtube_terms() {
    let store = shipped_store();
    let template = store.get_known(PromptKey::Short).unwrap();
    let params = ParameterSet::new()
        .with("title", "cooking secrets")
        .with("time", "40");
    let lowered = resolve(template, &params).unwrap().as_str().to_lowercase();
    assert!(lowered.contains("script"));
    assert!(lowered.contains("youtube"));
}

#[test]
fn test_should_name_missing_placeholder_and_ignore_extras() {
    let store = shipped_store();
    let template = store.get_known(PromptKey::Short).unwrap();

    let params = ParameterSet::new()
        .with("title", "cooking")
        .with("language", "English")
        .with("speakers", "two hosts");
    match resolve(template, &params).unwrap_err() {
        Error::MissingParameter { key, name } => {
            assert_eq!(key, "short_prompt");
            assert_eq!(name, "time");
        }
        other => panic!("unexpected error: {other}"),
    }

    let with_extras = params.with("time", "40");
    assert!(resolve(template, &with_extras).is_ok());
}

#[test]
fn test_should_resolve_every_known_prompt_with_sample_parameters() {
    let store = shipped_store();
    let params = sample_parameters();
    for key in PromptKey::ALL {
        let prompt = resolve(store.get_known(key).unwrap(), &params).unwrap();
        assert!(prompt.anomalies().is_empty(), "{key}: {:?}", prompt.anomalies());
    }
}
