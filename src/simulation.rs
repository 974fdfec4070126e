//! Drives the simulation one tick at a time on the `Context` plan queue.
//!
//! A tick moves every mobile agent, matches infectious and susceptible agents that are
//! close enough, resolves one duel per match and finally applies the resulting role
//! conversions. Ticks run at times 1.0, 2.0, ... until `max_steps` ticks have run, no
//! infectious agents remain, or a tick fails.
use log::{error, info};
use serde::Serialize;

use crate::agents::{AgentId, Role};
use crate::context::Context;
use crate::duel::{resolve_duels, DuelResults};
use crate::error::GeospreadError;
use crate::execution_stats::{log_execution_statistics, ExecutionProfilingCollector, ExecutionStatistics};
use crate::movement::{move_population, MovementSummary};
use crate::parameters::{ContextParametersExt, Parameters};
use crate::population::{ContextPopulationExt, Population};
use crate::proximity::find_proximity_events;
use crate::random::ContextRandomExt;
use crate::report::ContextReportExt;
use crate::transition::{apply_transitions, TransitionSummary};
use crate::{define_data_plugin, define_report, define_rng};

define_rng!(MovementRng);
define_rng!(DuelRng);
define_rng!(SeedingRng);

/// Population counts after each tick. Step 0 holds the initial population.
#[derive(Serialize)]
pub struct StepReport {
    step: usize,
    susceptible: usize,
    infectious: usize,
    removed: usize,
    events: usize,
    new_infectious: usize,
    new_removed: usize,
}

define_report!(StepReport);

/// One row per applied role conversion.
#[derive(Serialize)]
pub struct TransitionReport {
    step: usize,
    agent_id: AgentId,
    from: Role,
    to: Role,
    latitude: f64,
    longitude: f64,
}

define_report!(TransitionReport);

/// What happened during one tick.
#[derive(Clone, Debug)]
pub struct StepSummary {
    pub step: usize,
    pub movement: MovementSummary,
    pub events: usize,
    pub duels: DuelResults,
    pub transitions: TransitionSummary,
}

#[derive(Default)]
struct SimulationState {
    steps_completed: usize,
    failure: Option<GeospreadError>,
}

define_data_plugin!(SimulationPlugin, SimulationState, SimulationState::default());

fn parameters(context: &Context) -> Result<Parameters, GeospreadError> {
    context.get_parameters().cloned().ok_or_else(|| {
        GeospreadError::ConfigurationError("parameters must be set before the simulation runs".into())
    })
}

/// Runs the stages of one tick against `population`, which is detached from the context
/// for the duration of the tick.
fn advance(
    context: &Context,
    population: &mut Population,
    parameters: &Parameters,
) -> Result<(MovementSummary, usize, DuelResults, TransitionSummary), GeospreadError> {
    let movement = context.sample(MovementRng, |rng| {
        move_population(
            population,
            parameters.bounding_box.as_ref(),
            &parameters.movement,
            rng,
        )
    })?;
    let events = find_proximity_events(
        population,
        parameters.tile_level,
        parameters.threshold_distance,
    )?;
    let duels = context.sample(DuelRng, |rng| resolve_duels(&events, &parameters.duel, rng))?;
    let transitions = apply_transitions(
        population,
        &duels.defeated_susceptibles,
        &duels.defeated_infectious,
        parameters.infectious_speed_ratio,
        parameters.transition_priority,
    )?;
    Ok((movement, events.len(), duels, transitions))
}

fn send_step_report(
    context: &Context,
    step: usize,
    events: usize,
    transitions: Option<&TransitionSummary>,
) -> Result<(), GeospreadError> {
    if !context.has_report::<StepReport>() {
        return Ok(());
    }
    context.send_report(StepReport {
        step,
        susceptible: context.get_role_count(Role::Susceptible),
        infectious: context.get_role_count(Role::Infectious),
        removed: context.get_role_count(Role::Removed),
        events,
        new_infectious: transitions.map_or(0, |t| t.count(Role::Infectious)),
        new_removed: transitions.map_or(0, |t| t.count(Role::Removed)),
    })
}

fn send_transition_reports(
    context: &Context,
    step: usize,
    transitions: &TransitionSummary,
) -> Result<(), GeospreadError> {
    if !context.has_report::<TransitionReport>() {
        return Ok(());
    }
    for transition in &transitions.transitions {
        let position = transition.agent_after.position();
        context.send_report(TransitionReport {
            step,
            agent_id: transition.agent,
            from: transition.from,
            to: transition.to,
            latitude: position.latitude,
            longitude: position.longitude,
        })?;
    }
    Ok(())
}

/// Runs one tick immediately, outside of the plan queue.
///
/// # Errors
///
/// Returns `ConfigurationError` if no parameters are set, and otherwise the first error of
/// a stage or of a report. The population keeps every change made before the error.
///
/// # Panics
///
/// Panics if `init_random` was not called.
pub fn step(context: &mut Context) -> Result<StepSummary, GeospreadError> {
    let parameters = parameters(context)?;
    let step = context.get_data_mut::<SimulationPlugin>().steps_completed + 1;

    let mut population = std::mem::take(context.population_mut());
    let result = advance(context, &mut population, &parameters);
    *context.population_mut() = population;
    let (movement, events, duels, transitions) = result?;

    context.get_data_mut::<SimulationPlugin>().steps_completed = step;
    send_step_report(context, step, events, Some(&transitions))?;
    send_transition_reports(context, step, &transitions)?;
    info!(
        "step {step}: {} susceptible, {} infectious, {} removed ({} events)",
        context.get_role_count(Role::Susceptible),
        context.get_role_count(Role::Infectious),
        context.get_role_count(Role::Removed),
        events
    );

    Ok(StepSummary {
        step,
        movement,
        events,
        duels,
        transitions,
    })
}

#[allow(clippy::cast_precision_loss)]
fn schedule_tick(context: &mut Context, step: usize) {
    context.add_plan(step as f64, move |context| match self::step(context) {
        Ok(summary) => {
            let max_steps = context.get_parameters().map_or(0, |p| p.max_steps);
            if context.get_role_count(Role::Infectious) == 0 {
                info!("no infectious agents remain after step {}", summary.step);
            } else if summary.step < max_steps {
                schedule_tick(context, summary.step + 1);
            }
        }
        Err(err) => {
            error!("step {step} failed: {err}");
            context.get_data_mut::<SimulationPlugin>().failure = Some(err);
            context.shutdown();
        }
    });
}

/// Opens the step and transition reports using the context's report options.
///
/// # Errors
///
/// See `ContextReportExt::add_report`.
pub fn add_reports(context: &mut Context) -> Result<(), GeospreadError> {
    context.add_report::<StepReport>("steps")?;
    context.add_report::<TransitionReport>("transitions")?;
    Ok(())
}

/// Writes the step 0 report row and schedules the first tick.
///
/// # Errors
///
/// Returns `ConfigurationError` if no parameters are set, or a report error.
pub fn init(context: &mut Context) -> Result<(), GeospreadError> {
    let parameters = parameters(context)?;
    send_step_report(context, 0, 0, None)?;
    if parameters.max_steps == 0 {
        info!("max_steps is 0, nothing to run");
    } else if context.get_role_count(Role::Infectious) == 0 {
        info!("no infectious agents, nothing to run");
    } else {
        schedule_tick(context, 1);
    }
    Ok(())
}

/// The number of ticks completed so far.
#[must_use]
pub fn steps_completed(context: &Context) -> usize {
    context
        .get_data::<SimulationPlugin>()
        .map_or(0, |state| state.steps_completed)
}

/// Calls `init`, executes the context and returns the statistics of the run.
///
/// # Errors
///
/// Returns the error of `init` or of the tick that stopped the run.
pub fn run(context: &mut Context) -> Result<ExecutionStatistics, GeospreadError> {
    let collector = ExecutionProfilingCollector::new();
    init(context)?;
    context.execute();
    if let Some(err) = context.get_data_mut::<SimulationPlugin>().failure.take() {
        return Err(err);
    }
    let statistics =
        collector.compute_final_statistics(steps_completed(context), context.get_population_size());
    log_execution_statistics(&statistics);
    Ok(statistics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Agent, Infectious, Position, Sex};
    use crate::duel::DuelProbabilities;
    use crate::movement::BoundingBox;
    use crate::population::AgentSeed;
    use tempfile::tempdir;

    fn seed(role: Role, latitude: f64, longitude: f64, speed: f64) -> AgentSeed {
        AgentSeed {
            role,
            position: Position::new(latitude, longitude),
            age: 50,
            sex: Sex::Female,
            speed,
        }
    }

    fn context_with(parameters: Parameters, seeds: Vec<AgentSeed>) -> Context {
        let mut context = Context::new();
        context.init_random(42);
        context.set_parameters(parameters).unwrap();
        context.seed_population(seeds).unwrap();
        context
    }

    fn always_infect() -> Parameters {
        Parameters {
            duel: DuelProbabilities::new(0.0, 0.0, 1.0).unwrap(),
            threshold_distance: 0.01,
            ..Parameters::default()
        }
    }

    #[test]
    fn stationary_pair_converts_on_the_first_step() {
        let mut context = context_with(
            always_infect(),
            vec![
                seed(Role::Infectious, 0.0, 0.0, 0.0),
                seed(Role::Susceptible, 0.0, 0.0, 0.0),
            ],
        );
        let summary = step(&mut context).unwrap();
        assert_eq!(summary.step, 1);
        assert_eq!(summary.events, 1);
        assert_eq!(summary.transitions.count(Role::Infectious), 1);
        assert_eq!(context.get_role_count(Role::Infectious), 2);
        assert_eq!(
            context.get_agent(AgentId(1)).map(Agent::speed),
            Some(Some(0.0))
        );
    }

    #[test]
    fn step_requires_parameters() {
        let mut context = Context::new();
        context.init_random(1);
        assert!(matches!(
            step(&mut context),
            Err(GeospreadError::ConfigurationError(_))
        ));
    }

    #[test]
    fn run_stops_when_no_infectious_remain() {
        let parameters = Parameters {
            duel: DuelProbabilities::new(0.0, 1.0, 0.0).unwrap(),
            threshold_distance: 0.01,
            max_steps: 50,
            ..Parameters::default()
        };
        let mut context = context_with(
            parameters,
            vec![
                seed(Role::Infectious, 10.0, 10.0, 0.0),
                seed(Role::Susceptible, 10.0, 10.0, 0.0),
            ],
        );
        let statistics = run(&mut context).unwrap();
        assert_eq!(statistics.steps, 1);
        assert_eq!(context.get_role_count(Role::Removed), 1);
        assert_eq!(context.get_current_time(), 1.0);
    }

    #[test]
    fn run_honors_max_steps() {
        let parameters = Parameters {
            max_steps: 7,
            threshold_distance: 0.0,
            ..Parameters::default()
        };
        let mut context = context_with(
            parameters,
            vec![
                seed(Role::Infectious, 0.0, 0.0, 1.0),
                seed(Role::Susceptible, 40.0, 40.0, 1.0),
            ],
        );
        let statistics = run(&mut context).unwrap();
        assert_eq!(statistics.steps, 7);
        assert_eq!(steps_completed(&context), 7);
        assert_eq!(context.get_current_time(), 7.0);
    }

    #[test]
    fn nothing_runs_without_infectious_agents() {
        let mut context = context_with(
            Parameters::default(),
            vec![seed(Role::Susceptible, 0.0, 0.0, 1.0)],
        );
        let statistics = run(&mut context).unwrap();
        assert_eq!(statistics.steps, 0);
    }

    #[test]
    fn agents_stay_inside_the_bounding_box() {
        let parameters = Parameters {
            max_steps: 20,
            threshold_distance: 0.0,
            bounding_box: Some(BoundingBox::new(51.0, 52.0, -1.0, 0.0).unwrap()),
            ..Parameters::default()
        };
        let seeds = (0..20)
            .map(|i| {
                let role = if i == 0 { Role::Infectious } else { Role::Susceptible };
                seed(role, 51.5, -0.5, 10.0)
            })
            .collect();
        let mut context = context_with(parameters, seeds);
        run(&mut context).unwrap();
        let bbox = BoundingBox::new(51.0, 52.0, -1.0, 0.0).unwrap();
        for id in 0..20 {
            let position = context.get_agent(AgentId(id)).unwrap().position();
            assert!(bbox.contains(&position));
        }
    }

    #[test]
    fn same_seed_same_outcome() {
        let build = || {
            let seeds = (0..200)
                .map(|i| {
                    let role = if i % 10 == 0 { Role::Infectious } else { Role::Susceptible };
                    let offset = f64::from(i) * 0.0001;
                    seed(role, 51.5 + offset, -0.1 - offset, 0.5)
                })
                .collect();
            let parameters = Parameters {
                max_steps: 10,
                threshold_distance: 0.005,
                ..Parameters::default()
            };
            context_with(parameters, seeds)
        };
        let mut first = build();
        let mut second = build();
        run(&mut first).unwrap();
        run(&mut second).unwrap();
        for role in [Role::Susceptible, Role::Infectious, Role::Removed] {
            assert_eq!(first.get_role_count(role), second.get_role_count(role));
        }
        for id in 0..200 {
            assert_eq!(first.get_agent(AgentId(id)), second.get_agent(AgentId(id)));
        }
    }

    #[test]
    fn failed_step_stops_the_run() {
        let mut context = context_with(Parameters::default(), vec![]);
        // Population inserts check positions but not speeds.
        context
            .population_mut()
            .add(Agent::Infectious(Infectious {
                speed: f64::NAN,
                position: Position::new(0.0, 0.0),
                path: Vec::new(),
                age: 30,
                prior_path: Vec::new(),
            }))
            .unwrap();
        assert!(matches!(
            run(&mut context),
            Err(GeospreadError::InvalidSpeed(_))
        ));
        assert_eq!(steps_completed(&context), 0);
        assert_eq!(context.get_population_size(), 1);
    }

    #[test]
    fn reports_record_steps_and_transitions() {
        let temp_dir = tempdir().unwrap();
        let mut context = context_with(
            Parameters {
                max_steps: 3,
                ..always_infect()
            },
            vec![
                seed(Role::Infectious, 0.0, 0.0, 0.0),
                seed(Role::Susceptible, 0.0, 0.0, 0.0),
                seed(Role::Susceptible, 0.0, 0.0, 0.0),
            ],
        );
        context.report_options().directory(temp_dir.path());
        add_reports(&mut context).unwrap();
        run(&mut context).unwrap();

        let steps = std::fs::read_to_string(temp_dir.path().join("steps.csv")).unwrap();
        let lines: Vec<&str> = steps.lines().collect();
        assert_eq!(
            lines[0],
            "step,susceptible,infectious,removed,events,new_infectious,new_removed"
        );
        assert_eq!(lines[1], "0,2,1,0,0,0,0");
        assert_eq!(lines[2], "1,0,3,0,2,2,0");
        // Nobody is left to infect but the run goes on until max_steps.
        assert_eq!(lines.len(), 5);

        let transitions =
            std::fs::read_to_string(temp_dir.path().join("transitions.csv")).unwrap();
        let lines: Vec<&str> = transitions.lines().collect();
        assert_eq!(lines[0], "step,agent_id,from,to,latitude,longitude");
        assert_eq!(lines[1], "1,1,susceptible,infectious,0.0,0.0");
        assert_eq!(lines[2], "1,2,susceptible,infectious,0.0,0.0");
    }
}
