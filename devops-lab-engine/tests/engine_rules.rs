use devops_lab_engine::{
    BuiltinContent, Catalog, CommandOutcome, ContentError, ContentLoader, EditorKind, EventName,
    KeyValueStore, LabEngine, ManualClock, MemorySink, MemoryStore, ModuleProgress, ModuleRun,
    ProgressRepository, Rejection, Stage, StartMode, StatusBoard, TransitionTarget,
};
use serde_json::{Value, json};

type Run = ModuleRun<MemoryStore, MemorySink, ManualClock>;

fn setup() -> (LabEngine<BuiltinContent, MemoryStore>, MemorySink, ManualClock) {
    let engine = LabEngine::new(BuiltinContent, MemoryStore::new()).unwrap();
    (engine, MemorySink::default(), ManualClock::starting_at(10_000))
}

fn open(
    engine: &LabEngine<BuiltinContent, MemoryStore>,
    sink: &MemorySink,
    clock: &ManualClock,
    mode: StartMode,
) -> Run {
    engine
        .open_module("module-1", mode, sink.clone(), clock.clone())
        .unwrap()
}

fn to_terminal(run: &mut Run) {
    while run.stage() == Stage::Prelab {
        run.advance_prelab();
    }
}

/// Module 1 at step 3, where the editor opens.
fn to_editor(run: &mut Run) {
    to_terminal(run);
    run.submit_command("git checkout -b fix/bug");
    run.settle();
    run.submit_command("open dockerfile");
    run.settle();
    assert_eq!(run.stage(), Stage::Editor);
}

fn fail_commit(run: &mut Run) {
    run.submit_command("git add .");
    let outcome = run.submit_command("git commit -m \"wip\"");
    assert!(matches!(
        outcome,
        CommandOutcome::Validated { success: false, .. }
    ));
}

#[test]
fn blank_input_is_ignored_and_prelab_rejects_commands() {
    let (engine, sink, clock) = setup();
    let mut run = open(&engine, &sink, &clock, StartMode::Restart);
    assert_eq!(
        run.submit_command("ls"),
        CommandOutcome::Rejected(Rejection::WrongStage)
    );
    to_terminal(&mut run);
    let before = run.log().len();
    assert_eq!(run.submit_command("   "), CommandOutcome::Ignored);
    assert_eq!(run.log().len(), before);
    assert_eq!(
        run.submit_command("ls -la"),
        CommandOutcome::Rejected(Rejection::Unrecognized)
    );
    assert!(
        run.log()
            .last()
            .unwrap()
            .message()
            .contains("Unknown command")
    );
}

#[test]
fn transitions_wait_for_the_display_delay() {
    let (engine, sink, clock) = setup();
    let mut run = open(&engine, &sink, &clock, StartMode::Restart);
    to_terminal(&mut run);

    let outcome = run.submit_command("git checkout -b fix/bug");
    assert!(matches!(outcome, CommandOutcome::Advanced { .. }));
    let pending = run.pending_transition().unwrap();
    assert_eq!(pending.target, TransitionTarget::Step(2));
    assert_eq!(pending.due_ms, 10_800);

    clock.advance(799);
    assert!(!run.tick());
    assert_eq!(run.progress().scenario_step, 1);
    clock.advance(1);
    assert!(run.tick());
    assert_eq!(run.progress().scenario_step, 2);
    assert!(run.pending_transition().is_none());
}

#[test]
fn stale_tickets_are_ignored() {
    let (engine, sink, clock) = setup();
    let mut run = open(&engine, &sink, &clock, StartMode::Restart);
    to_terminal(&mut run);

    let CommandOutcome::Advanced { ticket: first } = run.submit_command("git checkout -b one")
    else {
        panic!("expected a transition");
    };
    let CommandOutcome::Advanced { ticket: second } = run.submit_command("git checkout -b two")
    else {
        panic!("expected a transition");
    };
    assert_ne!(first, second);
    assert!(!run.resolve(first));
    assert_eq!(run.progress().scenario_step, 1);
    assert!(run.resolve(second));
    assert_eq!(run.progress().scenario_step, 2);
    assert_eq!(run.captures()["branch"], "two");
    assert!(!run.resolve(second));
}

#[test]
fn help_reports_where_it_was_asked() {
    let (engine, sink, clock) = setup();
    let mut run = open(&engine, &sink, &clock, StartMode::Restart);
    to_terminal(&mut run);
    assert_eq!(run.submit_command("help"), CommandOutcome::HintShown);
    to_editor(&mut run);
    assert_eq!(run.submit_command("hint"), CommandOutcome::HintShown);

    let sources: Vec<String> = sink
        .events()
        .iter()
        .filter(|event| event.is(EventName::HelpRequest))
        .filter_map(|event| event.str_field("source").map(str::to_string))
        .collect();
    assert_eq!(sources, vec!["git_terminal", "gitops_editor_terminal"]);
    assert!(
        run.log()
            .iter()
            .any(|item| item.message().contains("git push origin fix/bug"))
    );
}

#[test]
fn solution_unlocks_after_repeated_failures() {
    let (engine, sink, clock) = setup();
    let mut run = open(&engine, &sink, &clock, StartMode::Restart);
    to_editor(&mut run);

    assert!(!run.reveal_solution());
    for expected in 1..=3 {
        fail_commit(&mut run);
        assert_eq!(run.editor().attempt_count(), expected);
    }
    assert!(run.solution_available());
    assert!(
        run.log()
            .iter()
            .any(|item| item.message().contains("Compare with this working Dockerfile"))
    );

    assert!(run.reveal_solution());
    assert!(run.editor().content("Dockerfile").unwrap().contains("CMD"));
    assert_eq!(run.progress().scenario_step, 3);
    assert_eq!(sink.count(EventName::ShowSolution), 1);
    assert_eq!(run.cumulative_attempts(), 3);

    run.submit_command("git add .");
    assert_eq!(
        run.submit_command("git commit -m \"fix\""),
        CommandOutcome::Progressed
    );
    assert_eq!(run.editor().attempt_count(), 0);
}

#[test]
fn drafts_survive_resume_and_vanish_on_restart() {
    let (engine, sink, clock) = setup();
    let store = engine.store().clone();
    let mut run = open(&engine, &sink, &clock, StartMode::Restart);
    to_editor(&mut run);

    run.edit("Dockerfile", "FROM alpine\n");
    clock.advance(100);
    run.edit("Dockerfile", "FROM alpine\nCMD [\"sh\"]\n");
    assert_eq!(sink.count(EventName::EditorChange), 1);
    assert!(store.get(&EditorKind::BuildFile.draft_key("Dockerfile")).unwrap().is_none());
    clock.advance(500);
    run.tick();
    assert_eq!(
        store
            .get(&EditorKind::BuildFile.draft_key("Dockerfile"))
            .unwrap()
            .as_deref(),
        Some("FROM alpine\nCMD [\"sh\"]\n")
    );
    drop(run);

    let resumed = open(&engine, &sink, &clock, StartMode::Resume);
    assert_eq!(resumed.stage(), Stage::Editor);
    assert_eq!(resumed.progress().scenario_step, 3);
    assert_eq!(resumed.captures()["branch"], "fix/bug");
    assert_eq!(
        resumed.editor().content("Dockerfile"),
        Some("FROM alpine\nCMD [\"sh\"]\n")
    );
    assert_eq!(resumed.editor().active_file(), Some("Dockerfile"));
    drop(resumed);

    let restarted = open(&engine, &sink, &clock, StartMode::Restart);
    assert_eq!(restarted.progress(), ModuleProgress::fresh());
    assert!(restarted.captures().is_empty());
    assert!(store.get(&EditorKind::BuildFile.draft_key("Dockerfile")).unwrap().is_none());
    let restart_events = sink
        .events()
        .iter()
        .filter(|event| event.is(EventName::ModuleStart) && event.bool_field("restart") == Some(true))
        .count();
    assert_eq!(restart_events, 2);
}

#[test]
fn restart_leaves_other_modules_alone() {
    let (engine, sink, clock) = setup();
    let repo = ProgressRepository::new(engine.store().clone());
    let other = ModuleProgress {
        stage: Stage::Editor,
        prelab_step: 0,
        scenario_step: 4,
    };
    repo.save("module-2", &other);

    let mut run = open(&engine, &sink, &clock, StartMode::Restart);
    to_editor(&mut run);
    run.restart();
    assert_eq!(run.stage(), Stage::Prelab);

    let bounds = engine.catalog().module("module-2").unwrap().bounds();
    assert_eq!(repo.load("module-2", bounds), Some(other));
}

#[test]
fn stage_never_moves_backwards() {
    let (engine, sink, clock) = setup();
    let mut run = open(&engine, &sink, &clock, StartMode::Restart);
    to_editor(&mut run);
    assert!(!run.advance_prelab());
    assert_eq!(run.stage(), Stage::Editor);

    let changes: Vec<(String, String)> = sink
        .events()
        .iter()
        .filter(|event| event.is(EventName::ModuleStageChange))
        .map(|event| {
            (
                event.str_field("from").unwrap().to_string(),
                event.str_field("to").unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        changes,
        vec![
            ("prelab".to_string(), "terminal".to_string()),
            ("terminal".to_string(), "editor".to_string()),
        ]
    );
}

#[test]
fn corrupted_progress_is_clamped_on_resume() {
    let (engine, sink, clock) = setup();
    engine
        .store()
        .set(
            "moduleProgress:module-1",
            r#"{"stage":"bogus","prelabStep":-3,"scenarioStep":9999}"#,
        )
        .unwrap();
    let run = open(&engine, &sink, &clock, StartMode::Resume);
    assert_eq!(run.stage(), Stage::Prelab);
    assert_eq!(run.progress().prelab_step, 0);
    assert_eq!(run.progress().scenario_step, 9);

    engine
        .store()
        .set("moduleProgress:module-1", "not json at all")
        .unwrap();
    let run = open(&engine, &sink, &clock, StartMode::Resume);
    assert_eq!(run.progress(), ModuleProgress::fresh());
}

#[test]
fn reflection_requires_a_finished_scenario() {
    let (engine, sink, clock) = setup();
    let mut run = open(&engine, &sink, &clock, StartMode::Restart);
    let entries = run.complete_reflection(&[("Q".to_string(), "A".to_string())]);
    assert!(entries.is_empty());
    assert_eq!(sink.count(EventName::ReflectionSubmit), 0);
    assert!(engine.reflections().entries().is_empty());
}

#[test]
fn validation_is_idle_once_the_scenario_is_complete() {
    let (engine, sink, clock) = setup();
    ProgressRepository::new(engine.store().clone()).save(
        "module-1",
        &ModuleProgress {
            stage: Stage::Complete,
            prelab_step: 0,
            scenario_step: 9,
        },
    );
    let mut run = open(&engine, &sink, &clock, StartMode::Resume);
    assert_eq!(run.stage(), Stage::Complete);
    run.edit("Dockerfile", "garbage");

    let before = sink.events().len();
    assert!(run.validate().is_none());
    assert_eq!(run.editor().attempt_count(), 0);
    assert_eq!(run.cumulative_attempts(), 0);
    assert_eq!(sink.events().len(), before);
    assert!(run.pending_transition().is_none());
}

/// Built-in content with a capture declared on module 3's policy validation step.
struct CapturingValidation;

impl ContentLoader for CapturingValidation {
    type Error = ContentError;

    fn load_catalog(&self) -> Result<Catalog, Self::Error> {
        let mut content: Value =
            serde_json::from_str(include_str!("../assets/modules.json")).unwrap();
        let step = &mut content["modules"][2]["script"][3];
        assert_eq!(step["kind"]["type"], "editor_validation");
        step["capture"] = json!({
            "slot": "workspace",
            "pattern": r"terraform\s+validate\s+-chdir=(\S+)",
        });
        step["success"] = json!("Validated {workspace}.");
        Catalog::from_json(&content.to_string())
    }

    fn load_config<T>(&self, config_name: &str) -> Result<T, Self::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        BuiltinContent.load_config(config_name)
    }
}

#[test]
fn captures_on_validation_steps_are_kept() {
    let engine = LabEngine::new(CapturingValidation, MemoryStore::new()).unwrap();
    let board = StatusBoard::new(engine.store().clone());
    board.complete(engine.catalog(), "module-1");
    board.complete(engine.catalog(), "module-2");
    let mut run = engine
        .open_module(
            "module-3",
            StartMode::Restart,
            MemorySink::default(),
            ManualClock::starting_at(0),
        )
        .unwrap();
    to_terminal(&mut run);
    for input in ["terraform init", "terraform plan", "open main.tf"] {
        run.submit_command(input);
        assert!(run.settle(), "{input:?} did not advance");
    }
    assert_eq!(run.stage(), Stage::Editor);

    let outcome = run.submit_command("terraform validate -chdir=infra");
    assert!(matches!(
        outcome,
        CommandOutcome::Validated { success: false, .. }
    ));
    assert_eq!(run.captures()["workspace"], "infra");

    let solution = engine.catalog().module("module-3").unwrap().definition().files["main.tf"]
        .solution
        .clone();
    run.edit("main.tf", &solution);
    run.submit_command("terraform validate -chdir=infra");
    assert!(
        run.log()
            .iter()
            .any(|item| item.message().contains("Validated infra."))
    );
}
