use devops_lab_engine::{
    BuiltinContent, CommandOutcome, EngineError, EventName, LabEngine, ManualClock, MemorySink,
    MemoryStore, ModuleRun, ModuleStatus, Rejection, Stage, StartMode, StatusBoard,
};

type Run = ModuleRun<MemoryStore, MemorySink, ManualClock>;

struct Lab {
    engine: LabEngine<BuiltinContent, MemoryStore>,
    sink: MemorySink,
    clock: ManualClock,
}

impl Lab {
    fn new() -> Self {
        Self {
            engine: LabEngine::new(BuiltinContent, MemoryStore::new()).unwrap(),
            sink: MemorySink::default(),
            clock: ManualClock::starting_at(1_000),
        }
    }

    fn unlock_through(&self, completed: &[&str]) {
        let board = StatusBoard::new(self.engine.store().clone());
        for id in completed {
            board.complete(self.engine.catalog(), id);
        }
    }

    fn open(&self, id: &str) -> Run {
        self.engine
            .open_module(id, StartMode::Restart, self.sink.clone(), self.clock.clone())
            .unwrap()
    }

    fn solution(&self, module: &str, file: &str) -> String {
        self.engine.catalog().module(module).unwrap().definition().files[file]
            .solution
            .clone()
    }
}

fn skip_prelab(run: &mut Run) {
    while run.stage() == Stage::Prelab {
        assert!(run.advance_prelab());
    }
    assert_eq!(run.stage(), Stage::Terminal);
}

/// Submit a command that must complete the current step, then apply the move.
fn step_through(run: &mut Run, input: &str) {
    let outcome = run.submit_command(input);
    assert!(
        matches!(
            outcome,
            CommandOutcome::Advanced { .. }
                | CommandOutcome::Validated {
                    success: true,
                    ..
                }
        ),
        "{input:?} did not advance: {outcome:?}"
    );
    assert!(run.settle(), "{input:?} scheduled no transition");
}

fn logged(run: &Run, needle: &str) -> bool {
    run.log().iter().any(|item| item.message().contains(needle))
}

#[test]
fn git_and_dockerfile_module_end_to_end() {
    let lab = Lab::new();
    let mut run = lab.open("module-1");
    assert_eq!(run.stage(), Stage::Prelab);

    run.advance_prelab();
    run.advance_prelab();
    assert_eq!(run.answer_quiz(0), Some(false));
    assert_eq!(run.answer_quiz(1), Some(true));
    skip_prelab(&mut run);

    step_through(&mut run, "git checkout -b fix/bug");
    assert_eq!(run.captures()["branch"], "fix/bug");
    assert!(logged(&run, "Switched to a new branch 'fix/bug'"));
    assert_eq!(run.progress().scenario_step, 2);

    step_through(&mut run, "open dockerfile");
    assert_eq!(run.stage(), Stage::Editor);
    assert_eq!(run.editor().active_file(), Some("Dockerfile"));

    assert_eq!(
        run.submit_command("git commit -m \"fix\""),
        CommandOutcome::Rejected(Rejection::NotStaged)
    );
    assert_eq!(
        run.submit_command("git push origin fix/bug"),
        CommandOutcome::Rejected(Rejection::NotCommitted)
    );
    assert_eq!(run.editor().attempt_count(), 0);

    assert_eq!(run.submit_command("git add ."), CommandOutcome::Progressed);
    assert_eq!(
        run.submit_command("git commit -m \"fix\""),
        CommandOutcome::Validated {
            success: false,
            ticket: None
        }
    );
    assert_eq!(run.editor().attempt_count(), 1);
    assert!(logged(&run, "Missing CMD instruction"));

    let fixed = lab.solution("module-1", "Dockerfile");
    assert!(run.edit("Dockerfile", &fixed));
    assert!(!run.editor().is_staged());
    run.submit_command("git add .");
    assert_eq!(run.submit_command("git commit -m \"fix\""), CommandOutcome::Progressed);
    assert_eq!(run.editor().attempt_count(), 0);
    step_through(&mut run, "git push origin fix/bug");
    assert!(logged(&run, "Pushed 'fix/bug'"));

    step_through(&mut run, "ok");

    run.submit_command("git add .");
    run.submit_command("git commit -m \"expose 3000\"");
    step_through(&mut run, "git push origin fix/bug");

    step_through(&mut run, "git fetch origin");
    step_through(&mut run, "git merge main");
    assert!(run.editor().in_conflict());
    assert!(run.editor().contains_conflict_markers());

    run.submit_command("git add .");
    assert_eq!(
        run.submit_command("git commit -m \"merge\""),
        CommandOutcome::Rejected(Rejection::ConflictMarkersPresent)
    );
    run.edit("Dockerfile", &fixed);
    run.submit_command("git add .");
    assert_eq!(run.submit_command("git commit -m \"merge\""), CommandOutcome::Progressed);
    assert!(!run.editor().in_conflict());
    step_through(&mut run, "git push origin main");

    step_through(&mut run, "run pipeline");
    assert_eq!(run.stage(), Stage::Complete);
    assert_eq!(run.progress().scenario_step, 9);

    let answers = vec![(
        "Why do we work on a feature branch instead of committing to main?".to_string(),
        "Main stays deployable.".to_string(),
    )];
    let unlocked = lab.engine.finish_module(&mut run, &answers).unwrap();
    assert_eq!(unlocked, vec!["module-2".to_string()]);

    let statuses = lab.engine.statuses();
    assert_eq!(statuses["module-1"], ModuleStatus::Completed);
    assert_eq!(statuses["module-2"], ModuleStatus::Unlocked);
    assert_eq!(statuses["module-3"], ModuleStatus::Locked);

    assert_eq!(lab.sink.count(EventName::ModuleLaunch), 1);
    assert_eq!(lab.sink.count(EventName::PrelabQuizAnswer), 2);
    assert_eq!(lab.sink.count(EventName::PipelineRun), 1);
    assert_eq!(lab.sink.count(EventName::ReflectionSubmit), 1);
    assert_eq!(lab.sink.count(EventName::ModuleComplete), 1);
    assert_eq!(lab.engine.pipeline_history().runs().len(), 1);
    assert_eq!(lab.engine.reflections().entries().len(), 1);
}

#[test]
fn kubernetes_module_routes_pipeline_failures_to_remediation() {
    let lab = Lab::new();
    lab.unlock_through(&["module-1"]);
    let mut run = lab.open("module-2");
    skip_prelab(&mut run);

    step_through(&mut run, "git switch -c fix/selector");
    assert_eq!(run.captures()["branch"], "fix/selector");
    step_through(&mut run, "open deployment.yaml");
    assert_eq!(run.stage(), Stage::Editor);

    for _ in 0..2 {
        assert_eq!(
            run.submit_command("kubectl apply"),
            CommandOutcome::Validated {
                success: false,
                ticket: None
            }
        );
    }
    assert!(logged(
        &run,
        "Selector 'app: web-app' does not match Pod label 'app: web'."
    ));

    let card = run.current_step().unwrap().clone();
    assert!(card.narrative.starts_with("Let's slow down"));
    assert_eq!(
        run.submit_command("kubectl apply"),
        CommandOutcome::Rejected(Rejection::Unrecognized)
    );
    assert_eq!(run.submit_command("ok"), CommandOutcome::Progressed);
    assert_eq!(run.current_step().unwrap().id, 3);
    assert!(run.current_step().unwrap().narrative.starts_with("Make the Deployment"));

    let original = run.editor().content("deployment.yaml").unwrap().to_string();
    let selector_fixed = original.replace("      app: web-app", "      app: web");
    run.edit("deployment.yaml", &selector_fixed);
    step_through(&mut run, "kubectl apply");
    assert_eq!(run.progress().scenario_step, 4);

    let outcome = run.submit_command("kubectl apply -f deployment.yaml");
    assert!(matches!(
        outcome,
        CommandOutcome::Validated {
            success: false,
            ticket: Some(_)
        }
    ));
    assert!(logged(&run, "Service targetPort 8080 does not match"));
    assert!(run.settle());
    assert_eq!(run.progress().scenario_step, 5);
    assert_eq!(run.stage(), Stage::Editor);

    run.edit(
        "deployment.yaml",
        &selector_fixed.replace("targetPort: 8080", "targetPort: 3000"),
    );
    step_through(&mut run, "kubectl apply");
    assert_eq!(run.progress().scenario_step, 4);
    step_through(&mut run, "kubectl apply -f deployment.yaml");
    step_through(&mut run, "kubectl get pods");
    step_through(&mut run, "continue");
    assert_eq!(run.stage(), Stage::Complete);

    assert_eq!(lab.sink.count(EventName::KubeLintingAttempt), 6);
    assert_eq!(lab.sink.count(EventName::ValidationResult), 0);
    assert_eq!(lab.sink.count(EventName::PipelineRun), 2);
    assert_eq!(lab.engine.pipeline_history().success_rate(), Some(0.5));
    assert_eq!(run.cumulative_attempts(), 6);
}

#[test]
fn terraform_module_moves_the_metrics() {
    let lab = Lab::new();
    lab.unlock_through(&["module-1", "module-2"]);
    let mut run = lab.open("module-3");
    skip_prelab(&mut run);

    step_through(&mut run, "terraform init");
    step_through(&mut run, "terraform plan");
    assert_eq!(run.stage(), Stage::Terminal);
    step_through(&mut run, "open main.tf");
    assert_eq!(run.stage(), Stage::Editor);

    let outcome = run.submit_command("terraform validate");
    assert_eq!(
        outcome,
        CommandOutcome::Validated {
            success: false,
            ticket: None
        }
    );
    assert!(logged(&run, "Region 'us-east-1' is not approved"));
    assert!(logged(&run, "Instance type 'm5.large' breaks the cost policy"));

    run.edit("main.tf", &lab.solution("module-3", "main.tf"));
    step_through(&mut run, "terraform validate");
    step_through(&mut run, "terraform apply");
    assert!(logged(&run, "Estimated monthly cost: $75"));
    assert!(logged(&run, "Average latency: 110 ms"));
    assert!(logged(&run, "Availability: 99.2%"));

    step_through(&mut run, "check metrics");
    step_through(&mut run, "open autoscaling.tf");
    assert_eq!(run.editor().active_file(), Some("autoscaling.tf"));

    let failed = run.validate().unwrap();
    assert!(!failed.success);
    assert_eq!(failed.errors(), 4);
    run.edit("autoscaling.tf", &lab.solution("module-3", "autoscaling.tf"));
    assert!(run.validate().unwrap().success);
    assert!(run.settle());

    run.take_log();
    step_through(&mut run, "terraform apply");
    assert!(logged(&run, "Availability: 99.9%"));
    step_through(&mut run, "terraform destroy");
    step_through(&mut run, "continue");
    assert_eq!(run.stage(), Stage::Complete);

    let unlocked = lab.engine.finish_module(&mut run, &[]).unwrap();
    assert!(unlocked.is_empty());
    assert_eq!(lab.engine.statuses()["module-3"], ModuleStatus::Completed);
    assert_eq!(lab.sink.count(EventName::ValidationResult), 4);
}

#[test]
fn validate_button_routes_like_typed_commands() {
    let lab = Lab::new();
    lab.unlock_through(&["module-1"]);
    let mut run = lab.open("module-2");
    skip_prelab(&mut run);
    step_through(&mut run, "git switch -c fix/selector");
    step_through(&mut run, "open deployment.yaml");

    for _ in 0..2 {
        assert!(!run.validate().unwrap().success);
    }
    assert!(run.validate().is_none());
    assert_eq!(run.submit_command("ok"), CommandOutcome::Progressed);

    let original = run.editor().content("deployment.yaml").unwrap().to_string();
    let selector_fixed = original.replace("      app: web-app", "      app: web");
    run.edit("deployment.yaml", &selector_fixed);
    assert!(run.validate().unwrap().success);
    assert!(run.settle());
    assert_eq!(run.progress().scenario_step, 4);

    assert!(!run.validate().unwrap().success);
    assert_eq!(lab.engine.pipeline_history().runs().len(), 1);
    assert_eq!(lab.sink.count(EventName::PipelineRun), 1);
    assert!(run.settle());
    assert_eq!(run.progress().scenario_step, 5);

    run.edit(
        "deployment.yaml",
        &selector_fixed.replace("targetPort: 8080", "targetPort: 3000"),
    );
    assert!(run.validate().unwrap().success);
    assert!(run.settle());
    assert_eq!(run.progress().scenario_step, 4);
    assert!(run.validate().unwrap().success);
    assert!(run.settle());
    assert_eq!(run.progress().scenario_step, 6);
    assert_eq!(lab.engine.pipeline_history().success_rate(), Some(0.5));
}

#[test]
fn finishing_twice_counts_one_completion() {
    let lab = Lab::new();
    lab.unlock_through(&["module-1", "module-2"]);
    let mut run = lab.open("module-3");
    skip_prelab(&mut run);
    for input in ["terraform init", "terraform plan", "open main.tf"] {
        step_through(&mut run, input);
    }
    run.edit("main.tf", &lab.solution("module-3", "main.tf"));
    step_through(&mut run, "terraform validate");
    for input in ["terraform apply", "check metrics", "open autoscaling.tf"] {
        step_through(&mut run, input);
    }
    run.edit("autoscaling.tf", &lab.solution("module-3", "autoscaling.tf"));
    for input in ["terraform validate", "terraform apply", "terraform destroy", "continue"] {
        step_through(&mut run, input);
    }
    assert_eq!(run.stage(), Stage::Complete);

    let answers = vec![("What did autoscaling change?".to_string(), "Availability.".to_string())];
    assert!(lab.engine.finish_module(&mut run, &answers).is_ok());
    let err = lab.engine.finish_module(&mut run, &answers).unwrap_err();
    assert!(matches!(err, EngineError::AlreadyCompleted(_)));
    assert_eq!(lab.sink.count(EventName::ModuleComplete), 1);
    assert_eq!(lab.sink.count(EventName::ReflectionSubmit), 1);
    assert_eq!(lab.engine.reflections().entries().len(), 1);
}
