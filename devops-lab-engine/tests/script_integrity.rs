use devops_lab_engine::{
    BuiltinContent, Captures, ContentLoader, LabConfig, StepKind, match_input,
};

#[test]
fn every_next_pointer_resolves_or_exits() {
    let catalog = BuiltinContent.load_catalog().unwrap();
    for module in catalog.modules() {
        let script = module.script();
        let exits = script
            .steps()
            .iter()
            .filter(|step| script.is_exit(step.next))
            .count();
        assert_eq!(exits, 1, "{} should have exactly one exit", module.id());
        for step in script.steps() {
            if let Some(next) = step.next {
                assert!(script.step(next).is_some(), "{} step {}", module.id(), step.id);
            }
        }
    }
}

#[test]
fn expected_patterns_match_themselves_and_escape_words_do_not() {
    let catalog = BuiltinContent.load_catalog().unwrap();
    let captures = Captures::new();
    for module in catalog.modules() {
        let script = module.script();
        for step in script.steps() {
            let regex = script.capture_regex(step.id);
            for pattern in &step.expected {
                assert!(
                    match_input(pattern, step, regex, &captures).is_match(),
                    "{} step {} pattern {pattern:?}",
                    module.id(),
                    step.id
                );
            }
            for word in ["help", "hint"] {
                assert!(!match_input(word, step, regex, &captures).is_match());
            }
        }
    }
}

#[test]
fn reference_solutions_pass_and_seed_files_fail() {
    let catalog = BuiltinContent.load_catalog().unwrap();
    let config = LabConfig::default();
    for module in catalog.modules() {
        let files = &module.definition().files;
        let solution = |file: Option<&str>| match file {
            Some(name) => files[name].solution.clone(),
            None => files
                .values()
                .map(|file| file.solution.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        };
        let initial = |file: Option<&str>| match file {
            Some(name) => files[name].initial.clone(),
            None => files
                .values()
                .map(|file| file.initial.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        };

        let mut seeds_fail = false;
        for step in module.script().steps() {
            let Some(validation) = &step.validation else {
                continue;
            };
            assert_eq!(validation.profile.editor(), module.definition().editor);
            let passed = validation
                .profile
                .analyze(&solution(validation.file.as_deref()), 1, &config);
            assert!(
                passed.success,
                "{} step {} solution fails: {:?}",
                module.id(),
                step.id,
                passed.findings
            );
            seeds_fail |= !validation
                .profile
                .analyze(&initial(validation.file.as_deref()), 1, &config)
                .success;
        }
        assert!(seeds_fail, "{} starts out already solved", module.id());
    }
}

#[test]
fn editor_entry_matches_the_module_layout() {
    let catalog = BuiltinContent.load_catalog().unwrap();
    let entries: Vec<(&str, u32)> = catalog
        .modules()
        .iter()
        .map(|module| (module.id(), module.script().editor_entry_step_id()))
        .collect();
    assert_eq!(
        entries,
        vec![("module-1", 3), ("module-2", 3), ("module-3", 4)]
    );
    for module in catalog.modules() {
        let entry = module.script().editor_entry_step_id();
        for step in module.script().steps() {
            if step.id < entry {
                assert!(
                    !matches!(
                        step.kind,
                        StepKind::EditorValidation | StepKind::Pipeline { .. }
                    ),
                    "{} validates before the editor opens",
                    module.id()
                );
            }
        }
    }
}

#[test]
fn every_module_has_prelab_and_reflection_prompts() {
    let catalog = BuiltinContent.load_catalog().unwrap();
    for module in catalog.modules() {
        assert!(!module.definition().prelab.is_empty(), "{}", module.id());
        assert!(
            !module.definition().reflection_prompts.is_empty(),
            "{}",
            module.id()
        );
    }
}
