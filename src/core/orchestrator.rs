//! Main orchestrator for poster generation.
//!
//! Drives the stage machine
//! `Planning -> BrandGrounding -> AssetGeneration -> Composition -> Validation -> {Revise | Done | Failed}`
//! over a single-writer `PosterSpec`, with event logging, bounded revision
//! loops and concurrency-capped service calls.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::ServiceRegistry;
use crate::agents::generation::needs_initial_refinement;
use crate::agents::{
    BrandGroundingAgent, Compositor, ElementRevision, GenerationJob, GenerationOutput,
    GenerationParams, PlanningAgent, ValidationAgent, ValidationSettings,
};
use crate::domain::{
    hard_failures, BrandInput, CheckKind, Composition, ElementId, ElementKind, Event, EventType,
    PipelineRun, PosterSpec, RunSummary, Severity, Stage, Termination, ValidationResult,
};
use crate::error::{CompositionError, PipelineError, ServiceError};

use super::event_store::EventStore;
use super::limits::{InputPolicy, PipelineLimits, RunBudget};
use super::output::{write_iteration, write_outputs, OutputPaths};
use super::retry::{Invoker, RetryPolicy};

/// Tunables for a run, one field per config section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default)]
    pub pipeline: PipelineLimits,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub validation: ValidationSettings,

    #[serde(default)]
    pub input: InputPolicy,
}

/// One poster-generation request
#[derive(Debug, Clone, Default)]
pub struct PosterRequest {
    pub keywords: Vec<String>,
    pub brand: BrandInput,
    /// Overrides `pipeline.max_revisions` for this run
    pub max_revisions: Option<u32>,
    /// Also write `wireframe.svg`
    pub wireframe: bool,
}

impl PosterRequest {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_brand(mut self, brand: BrandInput) -> Self {
        self.brand = brand;
        self
    }

    pub fn with_max_revisions(mut self, max_revisions: u32) -> Self {
        self.max_revisions = Some(max_revisions);
        self
    }

    pub fn with_wireframe(mut self, wireframe: bool) -> Self {
        self.wireframe = wireframe;
        self
    }
}

/// What a finished run hands back
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_id: Uuid,
    /// `Done` or `Failed`
    pub stage: Stage,
    pub termination: Termination,
    /// Returned candidate; absent only when no candidate was ever composed
    pub poster: Option<Composition>,
    /// Final poster state, including the full validation history
    pub spec: PosterSpec,
    pub iterations: u32,
    pub revisions_used: u32,
    pub outputs: Option<OutputPaths>,
    pub run_dir: PathBuf,
}

impl PipelineOutcome {
    /// False when the poster is a best-effort candidate
    pub fn quality_guaranteed(&self) -> bool {
        self.termination.quality_guaranteed()
    }
}

/// A validated candidate and its ranking
#[derive(Debug, Clone)]
struct Candidate {
    composition: Composition,
    spec: PosterSpec,
    score: f64,
    aesthetic: Option<f64>,
}

impl Candidate {
    fn rank(composition: Composition, spec: &PosterSpec, results: &[ValidationResult]) -> Self {
        let hard: Vec<&ValidationResult> = results
            .iter()
            .filter(|r| r.severity() == Severity::Hard)
            .collect();
        let score = if hard.is_empty() {
            1.0
        } else {
            hard.iter().filter(|r| r.passed()).count() as f64 / hard.len() as f64
        };
        let aesthetic = results
            .iter()
            .find(|r| r.check() == CheckKind::AestheticQuality)
            .and_then(|r| r.score());

        Self {
            composition,
            spec: spec.clone(),
            score,
            aesthetic,
        }
    }

    /// Strictly better; ties keep the earlier candidate
    fn beats(&self, other: &Candidate) -> bool {
        self.score > other.score || (self.score == other.score && self.aesthetic > other.aesthetic)
    }
}

/// Work queued for the next generation stage
type Work = BTreeMap<ElementId, ElementRevision>;

/// Main poster orchestrator
pub struct Orchestrator {
    registry: ServiceRegistry,
    settings: PipelineSettings,
    runs_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(registry: ServiceRegistry, settings: PipelineSettings, runs_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            settings,
            runs_dir: runs_dir.into(),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    /// Generate one poster.
    ///
    /// Input problems fail before any service call or run directory is created.
    /// Running out of revisions or time is not an error: the best candidate so
    /// far comes back with `quality_guaranteed() == false`.
    #[instrument(skip(self, request), fields(keywords = ?request.keywords))]
    pub async fn run(&self, request: PosterRequest) -> Result<PipelineOutcome, PipelineError> {
        let keywords = self
            .settings
            .pipeline
            .validate_keywords(&request.keywords)
            .map_err(|v| PipelineError::InvalidInput(v.to_string()))?;
        self.settings
            .input
            .validate_brand(&request.brand)
            .map_err(|v| PipelineError::InvalidInput(v.to_string()))?;

        let mut limits = self.settings.pipeline.clone();
        if let Some(max_revisions) = request.max_revisions {
            limits.max_revisions = max_revisions;
        }

        let run_id = Uuid::new_v4();
        info!(%run_id, "Starting poster run");

        let store = EventStore::create(&self.runs_dir, run_id).await?;
        let invoker = Invoker::new(
            self.registry.clone(),
            limits.max_in_flight,
            self.settings.retry.clone(),
            limits.call_timeout(),
        );
        let mut run = PipelineRun::new(run_id, PosterSpec::new(keywords.clone(), request.brand.clone()));
        let mut budget = RunBudget::new(limits.run_timeout());

        let started = Event::new(run_id, Stage::Planning, run.iteration, EventType::RunStarted, keywords.join(", "));
        store.append(&started).await?;

        let session = Session {
            store: &store,
            invoker: &invoker,
            limits: &limits,
            planner: PlanningAgent::new(limits.canvas, limits.margin_px),
            brand: BrandGroundingAgent::new(),
            compositor: Compositor::new(limits.canvas),
            validator: ValidationAgent::new(self.settings.validation.clone(), limits.margin_px),
            wireframe: request.wireframe,
        };

        match session.drive(&mut run, &mut budget).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let message = err.to_string();
                error!(%run_id, error = %message, "Run failed");

                let event = Event::new(
                    run_id,
                    run.stage,
                    run.iteration,
                    EventType::RunFailed,
                    format!("Run failed: {}", message),
                )
                .with_error(message.clone());
                if let Err(append_err) = store.append(&event).await {
                    error!(%run_id, error = %append_err, "Failed to record run failure");
                }
                run.terminate(Termination::Error { message });

                Err(err)
            }
        }
    }

    /// Get status of a run by ID
    pub async fn get_run_status(&self, run_id: Uuid) -> anyhow::Result<RunSummary> {
        let store = EventStore::open(&self.runs_dir, run_id).await?;
        store
            .summary()
            .await
            .with_context(|| format!("Failed to reconstruct run {}", run_id))
    }

    /// List recent runs
    pub async fn list_runs(&self, limit: usize) -> anyhow::Result<Vec<RunSummary>> {
        let run_ids = EventStore::list_runs(&self.runs_dir).await?;
        let mut runs = Vec::new();

        for run_id in run_ids {
            match self.get_run_status(run_id).await {
                Ok(summary) => runs.push(summary),
                Err(e) => debug!(%run_id, error = %e, "Skipping unreadable run"),
            }
        }

        // Sort by start time (most recent first)
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);

        Ok(runs)
    }
}

/// Per-run wiring of agents, store and invoker
struct Session<'a> {
    store: &'a EventStore,
    invoker: &'a Invoker,
    limits: &'a PipelineLimits,
    planner: PlanningAgent,
    brand: BrandGroundingAgent,
    compositor: Compositor,
    validator: ValidationAgent,
    wireframe: bool,
}

impl Session<'_> {
    async fn drive(&self, run: &mut PipelineRun, budget: &mut RunBudget) -> Result<PipelineOutcome, PipelineError> {
        let mut stage = Stage::Planning;
        let mut work = Work::new();
        let mut current: Option<Composition> = None;
        let mut best: Option<Candidate> = None;
        let mut last_results: Vec<ValidationResult> = Vec::new();

        while !stage.is_terminal() {
            if let Err(violation) = budget.check_deadline() {
                return self
                    .finish(run, Termination::BudgetExhausted { detail: violation.to_string() }, best)
                    .await;
            }
            self.enter(run, stage).await?;

            stage = match stage {
                Stage::Planning => {
                    let elements = self.planner.plan(run.spec.keywords(), run.spec.brand())?;
                    run.spec.set_layout(elements)?;
                    work = initial_work(&run.spec);

                    if run.spec.brand().is_empty() {
                        let style = self.brand.default_style(run.spec.keywords());
                        run.spec.commit_style(style)?;
                        Stage::AssetGeneration
                    } else {
                        Stage::BrandGrounding
                    }
                }

                Stage::BrandGrounding => {
                    let style = self
                        .brand
                        .ground(self.invoker, run.spec.keywords(), run.spec.brand())
                        .await?;
                    run.spec.commit_style(style)?;
                    Stage::AssetGeneration
                }

                Stage::AssetGeneration => {
                    let completed = self.generate(run, budget, &work).await?;
                    if !completed {
                        let detail = format!(
                            "run deadline of {}s passed during asset generation",
                            self.limits.run_timeout_seconds
                        );
                        return self
                            .finish(run, Termination::BudgetExhausted { detail }, best)
                            .await;
                    }
                    work.clear();
                    Stage::Composition
                }

                Stage::Composition => {
                    let result = match &current {
                        Some(previous) => {
                            self.compositor
                                .recompose(self.invoker, &run.spec, previous, run.iteration)
                                .await
                        }
                        None => self.compositor.compose(self.invoker, &run.spec, run.iteration).await,
                    };

                    match result {
                        Ok(composition) => {
                            write_iteration(self.store, &run.spec, &composition).await?;
                            let event = Event::new(
                                run.id,
                                Stage::Composition,
                                run.iteration,
                                EventType::CompositionBuilt,
                                format!(
                                    "{} layers, {} reused",
                                    composition.layers.len(),
                                    composition.reused.len()
                                ),
                            );
                            self.store.append(&event).await?;
                            current = Some(composition);
                            Stage::Validation
                        }
                        Err(CompositionError::IncompleteAssets { missing }) => {
                            warn!(missing = ?missing, "Composition is missing assets");
                            if let Err(violation) = self.limits.check(budget) {
                                return self
                                    .finish(run, Termination::BudgetExhausted { detail: violation.to_string() }, best)
                                    .await;
                            }
                            work = missing
                                .into_iter()
                                .map(|id| {
                                    let revision = ElementRevision {
                                        regenerate_content: true,
                                        ..Default::default()
                                    };
                                    (id, revision)
                                })
                                .collect();
                            self.loop_back(run, budget);
                            Stage::AssetGeneration
                        }
                        Err(CompositionError::Service { source, .. })
                            if !source.is_transient() && best.is_some() =>
                        {
                            warn!(error = %source, "Candidate edit rejected, keeping best candidate");
                            let detail = format!("revised candidate could not be composed: {}", source);
                            return self
                                .finish(run, Termination::BudgetExhausted { detail }, best)
                                .await;
                        }
                        Err(other) => return Err(other.into()),
                    }
                }

                Stage::Validation => {
                    let Some(composition) = current.clone() else {
                        return Err(PipelineError::Composition(CompositionError::IncompleteAssets {
                            missing: run.spec.missing_assets(),
                        }));
                    };
                    let results = self
                        .validator
                        .validate(self.invoker, &run.spec, &composition, run.iteration)
                        .await?;

                    for result in &results {
                        self.record_check(run, result).await?;
                    }
                    run.spec.record_results(results.clone());

                    let candidate = Candidate::rank(composition, &run.spec, &results);
                    if hard_failures(results.iter()).is_empty() {
                        best = Some(candidate);
                        Stage::Done
                    } else {
                        if best.as_ref().map_or(true, |b| candidate.beats(b)) {
                            debug!(score = candidate.score, iteration = run.iteration, "New best candidate");
                            best = Some(candidate);
                        }
                        last_results = results;
                        Stage::Revise
                    }
                }

                Stage::Revise => {
                    if let Err(violation) = self.limits.check(budget) {
                        return self
                            .finish(run, Termination::BudgetExhausted { detail: violation.to_string() }, best)
                            .await;
                    }

                    let failures = hard_failures(last_results.iter());
                    let plan = self.planner.revise(&run.spec, &failures);

                    for (id, revision) in &plan.elements {
                        if let Some(role) = revision.restyle {
                            if let Some(mut element) = run.spec.element(id).cloned() {
                                if let Some(style) = element.text_style.as_mut() {
                                    style.color = role;
                                }
                                run.spec.update_element(element)?;
                            }
                        }

                        let event = Event::new(
                            run.id,
                            Stage::Revise,
                            run.iteration,
                            EventType::RevisionPlanned,
                            describe_revision(revision),
                        )
                        .for_element(id.clone());
                        self.store.append(&event).await?;
                    }
                    info!(elements = ?plan.element_ids(), "Planned targeted revision");

                    work = plan
                        .elements
                        .into_iter()
                        .filter(|(_, revision)| revision.needs_generation())
                        .collect();
                    self.loop_back(run, budget);

                    if work.is_empty() {
                        Stage::Composition
                    } else {
                        Stage::AssetGeneration
                    }
                }

                Stage::Done | Stage::Failed => break,
            };
        }

        self.finish(run, Termination::AllChecksPassed, best).await
    }

    async fn enter(&self, run: &mut PipelineRun, stage: Stage) -> Result<(), PipelineError> {
        info!(%stage, iteration = run.iteration, "Entering stage");
        run.stage = stage;
        let event = Event::new(run.id, stage, run.iteration, EventType::StageEntered, stage.to_string());
        self.store.append(&event).await?;
        Ok(())
    }

    /// Count one loop back to asset generation
    fn loop_back(&self, run: &mut PipelineRun, budget: &mut RunBudget) {
        budget.record_revision();
        run.revisions_used = budget.revisions_used;
        run.iteration += 1;
    }

    /// Fan out one job per queued element and wait for all of them.
    ///
    /// Returns `false` when the run deadline passed while jobs were in flight; their
    /// results are then discarded.
    async fn generate(
        &self,
        run: &mut PipelineRun,
        budget: &RunBudget,
        work: &Work,
    ) -> Result<bool, PipelineError> {
        let style = run
            .spec
            .style()
            .cloned()
            .ok_or(PipelineError::Composition(CompositionError::MissingStyle))?;
        let stage_start = Instant::now();
        let mut tasks = JoinSet::new();

        for (id, revision) in work {
            let Some(element) = run.spec.element(id).cloned() else {
                warn!(element = %id, "Skipping revision of unknown element");
                continue;
            };
            let occupied = run
                .spec
                .layout()
                .iter()
                .filter(|e| e.kind == ElementKind::Text && e.id != element.id)
                .map(|e| e.bbox)
                .collect();
            let logo = match element.kind {
                ElementKind::Logo => run.spec.brand().logo.clone(),
                _ => None,
            };

            let job = GenerationJob {
                element,
                keywords: run.spec.keywords().to_vec(),
                style: style.clone(),
                canvas: self.limits.canvas,
                margin_px: self.limits.margin_px,
                occupied,
                logo,
                regenerate_content: revision.regenerate_content,
                refine_geometry: revision.refine_geometry,
                params: GenerationParams {
                    quality_diversity: self.limits.quality_diversity.clamp(0.0, 1.0),
                    guidance: (!revision.guidance.is_empty()).then(|| revision.guidance.clone()),
                    iteration: run.iteration,
                },
            };
            tasks.spawn(job.run(self.invoker.clone()));
        }

        // Join barrier: every dispatched job completes or fails before the stage ends
        let mut outputs: Vec<GenerationOutput> = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            outputs.push(joined?);
        }
        outputs.sort_by(|a, b| a.element_id.cmp(&b.element_id));
        let duration_ms = stage_start.elapsed().as_millis() as u64;

        if budget.is_past_deadline() {
            warn!(discarded = outputs.len(), "Run deadline passed, discarding generation results");
            return Ok(false);
        }

        let mut fatal: Option<PipelineError> = None;
        for output in outputs {
            if output.iteration != run.iteration {
                debug!(element = %output.element_id, "Discarding stale generation result");
                continue;
            }
            self.commit_output(run, output, duration_ms, &mut fatal).await?;
        }

        match fatal {
            Some(err) => Err(err),
            None => Ok(true),
        }
    }

    /// Commit one job's results; a fatal service failure is kept for after the barrier
    async fn commit_output(
        &self,
        run: &mut PipelineRun,
        output: GenerationOutput,
        duration_ms: u64,
        fatal: &mut Option<PipelineError>,
    ) -> Result<(), PipelineError> {
        let id = output.element_id.clone();

        if output.retries > 0 {
            let event = Event::new(
                run.id,
                Stage::AssetGeneration,
                run.iteration,
                EventType::CallRetrying,
                format!("{} retried {} time(s)", id, output.retries),
            )
            .for_element(id.clone());
            self.store.append(&event).await?;
        }

        if let Some(bbox) = output.geometry {
            if let Some(mut element) = run.spec.element(&id).cloned() {
                element.bbox = bbox;
                run.spec.update_element(element)?;
            }
        }

        if let Some(asset) = output.asset {
            let summary = format!("{} via {} (confidence {:.2})", id, asset.produced_by, asset.confidence);
            run.spec.commit_asset(asset)?;
            let event = Event::new(
                run.id,
                Stage::AssetGeneration,
                run.iteration,
                EventType::ElementGenerated,
                summary,
            )
            .for_element(id.clone())
            .with_duration(duration_ms);
            self.store.append(&event).await?;
        } else if output.geometry.is_some() {
            debug!(element = %id, "Geometry refined");
        }

        if let Some(failure) = output.failure {
            warn!(element = %id, error = %failure.error, attempts = failure.attempts, "Element generation failed");
            let event = Event::new(
                run.id,
                Stage::AssetGeneration,
                run.iteration,
                EventType::ElementGenerationFailed,
                format!("{} failed after {} attempt(s)", id, failure.attempts),
            )
            .for_element(id)
            .with_error(failure.error.to_string());
            self.store.append(&event).await?;

            // Rejections leave the element missing for the next pass; exhausted
            // retries and missing bindings end the run
            let propagate = failure.error.is_transient() || matches!(failure.error, ServiceError::Unbound(_));
            if propagate && fatal.is_none() {
                *fatal = Some(failure.into());
            }
        }

        Ok(())
    }

    async fn record_check(&self, run: &PipelineRun, result: &ValidationResult) -> Result<(), PipelineError> {
        let mut event = Event::new(
            run.id,
            Stage::Validation,
            run.iteration,
            EventType::CheckRecorded,
            format!("{} {}", result.check(), if result.passed() { "passed" } else { "failed" }),
        );
        if let [target] = result.targets() {
            event = event.for_element(target.clone());
        }
        if !result.passed() {
            if result.is_hard_failure() {
                warn!(check = %result.check(), feedback = result.feedback(), "Hard check failed");
            } else {
                info!(check = %result.check(), feedback = result.feedback(), "Advisory check failed");
            }
            event = event.with_error(result.feedback().to_string());
        }
        self.store.append(&event).await?;
        Ok(())
    }

    /// Log the termination, persist the returned candidate and build the outcome
    async fn finish(
        &self,
        run: &mut PipelineRun,
        termination: Termination,
        candidate: Option<Candidate>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let outputs = match &candidate {
            Some(c) => Some(write_outputs(self.store, &c.spec, &c.composition, self.wireframe).await?),
            None => None,
        };

        let (event_type, summary) = match &termination {
            Termination::AllChecksPassed => {
                info!(run_id = %run.id, iteration = run.iteration, "All hard checks passed");
                (EventType::RunCompleted, "All hard checks passed".to_string())
            }
            Termination::BudgetExhausted { detail } => {
                warn!(run_id = %run.id, %detail, "Budget exhausted, returning best candidate");
                (
                    EventType::RunBudgetExhausted,
                    match &candidate {
                        Some(c) => format!("Best candidate from iteration {} (quality not guaranteed)", c.composition.iteration),
                        None => "No candidate was composed".to_string(),
                    },
                )
            }
            Termination::Error { message } => (EventType::RunFailed, message.clone()),
        };

        let mut event = Event::new(run.id, run.stage, run.iteration, event_type, summary);
        if let Termination::BudgetExhausted { detail } = &termination {
            event = event.with_error(detail.clone());
        }
        self.store.append(&event).await?;
        run.terminate(termination.clone());

        Ok(PipelineOutcome {
            run_id: run.id,
            stage: run.stage,
            termination,
            poster: candidate.map(|c| c.composition),
            spec: run.spec.clone(),
            iterations: run.iteration,
            revisions_used: run.revisions_used,
            outputs,
            run_dir: self.store.run_dir().to_path_buf(),
        })
    }
}

/// Every element, content plus geometry refinement where it applies
fn initial_work(spec: &PosterSpec) -> Work {
    spec.layout()
        .iter()
        .map(|element| {
            let revision = ElementRevision {
                regenerate_content: true,
                refine_geometry: needs_initial_refinement(element),
                restyle: None,
                guidance: String::new(),
            };
            (element.id.clone(), revision)
        })
        .collect()
}

fn describe_revision(revision: &ElementRevision) -> String {
    let mut actions = Vec::new();
    if revision.refine_geometry {
        actions.push("refine geometry".to_string());
    }
    if revision.regenerate_content {
        actions.push("regenerate content".to_string());
    }
    if let Some(role) = revision.restyle {
        actions.push(format!("restyle to {:?}", role).to_lowercase());
    }
    format!("{}: {}", actions.join(" + "), revision.guidance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Canvas, ImageArtifact};

    fn composition(iteration: u32) -> Composition {
        Composition {
            canvas: Canvas::default(),
            layers: vec![],
            image: ImageArtifact::new("image/svg+xml", 720, 1280, b"<svg/>".to_vec()),
            reused: vec![],
            iteration,
        }
    }

    #[test]
    fn test_candidate_ranking() {
        let spec = PosterSpec::new(vec!["a".into(), "b".into()], BrandInput::default());
        let pass = |check| ValidationResult::pass(check, Severity::Hard, 1);
        let fail = |check| ValidationResult::fail(check, Severity::Hard, 1, "x", vec![]);

        let half = Candidate::rank(
            composition(1),
            &spec,
            &[pass(CheckKind::Contrast), fail(CheckKind::MarginTextPresence)],
        );
        let full = Candidate::rank(composition(2), &spec, &[pass(CheckKind::Contrast)]);
        let tie = Candidate::rank(
            composition(3),
            &spec,
            &[fail(CheckKind::Contrast), pass(CheckKind::MarginTextPresence)],
        );

        assert_eq!(half.score, 0.5);
        assert!(full.beats(&half));
        assert!(!tie.beats(&half));
        assert!(!half.beats(&tie));
    }

    #[test]
    fn test_candidate_tie_breaks_on_aesthetic() {
        let spec = PosterSpec::new(vec!["a".into(), "b".into()], BrandInput::default());
        let scored = |score| {
            ValidationResult::pass(CheckKind::AestheticQuality, Severity::Hard, 1).with_score(score)
        };

        let low = Candidate::rank(composition(1), &spec, &[scored(0.7)]);
        let high = Candidate::rank(composition(2), &spec, &[scored(0.9)]);
        assert!(high.beats(&low));
        assert!(!low.beats(&high));
    }

    #[test]
    fn test_settings_yaml_defaults() {
        let settings: PipelineSettings = serde_yaml::from_str("pipeline:\n  max_revisions: 5\n").unwrap();
        assert_eq!(settings.pipeline.max_revisions, 5);
        assert_eq!(settings.pipeline.max_keywords, 5);
        assert_eq!(settings.retry, RetryPolicy::default());
    }

    #[test]
    fn test_request_builder() {
        let request = PosterRequest::new(["Italian", "Restaurant"])
            .with_max_revisions(1)
            .with_wireframe(true);
        assert_eq!(request.keywords, vec!["Italian".to_string(), "Restaurant".to_string()]);
        assert_eq!(request.max_revisions, Some(1));
        assert!(request.brand.is_empty());
    }
}
