//! The `Context` owns a simulation run: a clock, the queue of plans that moves the clock
//! forward, and the state of every module as type-keyed data plugins (the population,
//! the parameters, random number generators, report writers).
//!
//! Modules expose their API as extension traits implemented on `Context`, for example
//! `ContextPopulationExt` or `ContextRandomExt`.
use std::any::{Any, TypeId};

use log::trace;

use crate::hashing::HashMap;
use crate::plan::{PlanId, PlanQueue};

/// Key type for one piece of module state stored on the `Context`.
pub trait DataPlugin: Any {
    type DataContainer: 'static;

    fn create_data_container() -> Self::DataContainer;
}

/// Declares a private `DataPlugin` key `$plugin` holding a `$data_container`, created with
/// `$default` the first time it is requested mutably.
#[macro_export]
macro_rules! define_data_plugin {
    ($plugin:ident, $data_container:ty, $default:expr) => {
        struct $plugin;

        impl $crate::context::DataPlugin for $plugin {
            type DataContainer = $data_container;

            fn create_data_container() -> Self::DataContainer {
                $default
            }
        }
    };
}
pub use define_data_plugin;

type Plan = Box<dyn FnOnce(&mut Context)>;

pub struct Context {
    plans: PlanQueue<Plan>,
    plugins: HashMap<TypeId, Box<dyn Any>>,
    time: f64,
    stop_requested: bool,
}

impl Context {
    #[must_use]
    pub fn new() -> Context {
        Context {
            plans: PlanQueue::new(),
            plugins: HashMap::default(),
            time: 0.0,
            stop_requested: false,
        }
    }

    /// Schedules `plan` to run when the clock reaches `time`.
    ///
    /// # Panics
    ///
    /// Panics if `time` is not finite or lies before the current time.
    pub fn add_plan(&mut self, time: f64, plan: impl FnOnce(&mut Context) + 'static) -> PlanId {
        assert!(
            time.is_finite() && time >= self.time,
            "plan time {time} is invalid at time {}",
            self.time
        );
        trace!("plan scheduled for {time}");
        self.plans.push(time, Box::new(plan))
    }

    /// Returns `false` if the plan already ran or was cancelled.
    pub fn cancel_plan(&mut self, id: PlanId) -> bool {
        self.plans.cancel(id)
    }

    #[must_use]
    pub fn pending_plans(&self) -> usize {
        self.plans.len()
    }

    /// Returns the data container of `T`, creating it on first use.
    #[allow(clippy::missing_panics_doc)]
    pub fn get_data_mut<T: DataPlugin>(&mut self) -> &mut T::DataContainer {
        self.plugins
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::create_data_container()))
            .downcast_mut::<T::DataContainer>()
            // Keyed by `TypeId::of::<T>()`.
            .unwrap()
    }

    /// Returns the data container of `T`, or `None` if nothing has created it yet.
    #[must_use]
    pub fn get_data<T: DataPlugin>(&self) -> Option<&T::DataContainer> {
        self.plugins
            .get(&TypeId::of::<T>())
            .and_then(|data| data.downcast_ref::<T::DataContainer>())
    }

    #[must_use]
    pub fn get_current_time(&self) -> f64 {
        self.time
    }

    /// Makes `execute` return once the running plan finishes. Pending plans are dropped.
    pub fn shutdown(&mut self) {
        trace!("shutdown at {}", self.time);
        self.stop_requested = true;
    }

    /// Runs plans in time order until none are left or `shutdown` is called.
    pub fn execute(&mut self) {
        while let Some((time, plan)) = self.plans.pop() {
            self.time = time;
            plan(self);
            if self.stop_requested {
                self.stop_requested = false;
                self.plans.clear();
                break;
            }
        }
        trace!("execution finished at {}", self.time);
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    define_data_plugin!(Visits, Vec<u32>, Vec::new());

    fn visit_at(context: &mut Context, time: f64, value: u32) -> PlanId {
        context.add_plan(time, move |context| {
            context.get_data_mut::<Visits>().push(value);
        })
    }

    #[test]
    #[should_panic(expected = "plan time -1 is invalid")]
    fn rejects_past_times() {
        let mut context = Context::new();
        visit_at(&mut context, -1.0, 0);
    }

    #[test]
    #[should_panic(expected = "plan time NaN is invalid")]
    fn rejects_nan_times() {
        let mut context = Context::new();
        visit_at(&mut context, f64::NAN, 0);
    }

    #[test]
    fn nothing_to_do() {
        let mut context = Context::new();
        context.execute();
        assert_eq!(context.get_current_time(), 0.0);
        assert!(context.get_data::<Visits>().is_none());
    }

    #[test]
    fn plans_advance_the_clock() {
        let mut context = Context::new();
        visit_at(&mut context, 2.0, 2);
        visit_at(&mut context, 1.0, 1);
        context.add_plan(1.0, |context| {
            let now = context.get_current_time();
            context.add_plan(now + 2.0, |context| {
                context.get_data_mut::<Visits>().push(3);
            });
        });
        assert_eq!(context.pending_plans(), 3);

        context.execute();
        assert_eq!(context.get_current_time(), 3.0);
        assert_eq!(context.get_data::<Visits>(), Some(&vec![1, 2, 3]));
        assert_eq!(context.pending_plans(), 0);
    }

    #[test]
    fn cancelled_plans_do_not_run() {
        let mut context = Context::new();
        let cancelled = visit_at(&mut context, 2.0, 1);
        context.add_plan(1.0, move |context| {
            assert!(context.cancel_plan(cancelled));
        });
        context.execute();
        assert_eq!(context.get_current_time(), 1.0);
        assert!(context.get_data::<Visits>().is_none());
    }

    #[test]
    fn shutdown_drops_pending_plans() {
        let mut context = Context::new();
        visit_at(&mut context, 1.0, 1);
        context.add_plan(2.0, Context::shutdown);
        visit_at(&mut context, 3.0, 3);
        context.execute();
        assert_eq!(context.get_current_time(), 2.0);
        assert_eq!(context.get_data::<Visits>(), Some(&vec![1]));
        assert_eq!(context.pending_plans(), 0);

        // A stopped context can be driven again.
        visit_at(&mut context, 4.0, 4);
        context.execute();
        assert_eq!(context.get_data::<Visits>(), Some(&vec![1, 4]));
    }
}
